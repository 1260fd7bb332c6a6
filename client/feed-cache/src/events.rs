//! Client event stream
//!
//! Mutations settle in the background after their optimistic prediction
//! has already landed, so failures surface as events rather than return
//! values the UI is still awaiting. Subscribers (toast surfaces, retry
//! affordances) consume these over a broadcast channel; publishing with
//! no subscribers is fine and simply drops the event.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use api_types::{ActingIdentity, ApiError};

/// Events emitted by the cache layer for the embedding application
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// An optimistic mutation failed and its prediction was rolled back
    MutationFailed {
        operation: &'static str,
        error_kind: &'static str,
        message: String,
        retryable: bool,
        at: DateTime<Utc>,
    },
    /// The active organization identity was silently reverted to the
    /// personal identity because administration rights were revoked
    IdentityDemoted {
        org_id: Uuid,
        org_name: String,
        personal: ActingIdentity,
        at: DateTime<Utc>,
    },
}

impl ClientEvent {
    pub fn mutation_failed(operation: &'static str, error: &ApiError) -> Self {
        ClientEvent::MutationFailed {
            operation,
            error_kind: error.kind(),
            message: error.to_string(),
            retryable: error.is_retryable(),
            at: Utc::now(),
        }
    }
}

/// Broadcast fan-out of [`ClientEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; a missing audience is not an error
    pub fn publish(&self, event: ClientEvent) {
        if self.tx.send(event).is_err() {
            debug!("client event dropped, no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(8);
        bus.publish(ClientEvent::mutation_failed(
            "post_like",
            &ApiError::Transport("connection reset".to_string()),
        ));
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(ClientEvent::mutation_failed(
            "comment_create",
            &ApiError::Internal("boom".to_string()),
        ));

        match rx.recv().await {
            Ok(ClientEvent::MutationFailed {
                operation,
                retryable,
                ..
            }) => {
                assert_eq!(operation, "comment_create");
                assert!(!retryable);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
