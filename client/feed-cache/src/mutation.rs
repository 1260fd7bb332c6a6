//! Optimistic mutation executor
//!
//! Every mutation follows the same protocol: snapshot the cached target,
//! cancel racing fetches for the affected keys, apply the predicted
//! outcome to every cached copy, dispatch the request, then settle.
//! Success keeps the prediction (corrected if the server disagrees);
//! failure restores the snapshot everywhere the prediction landed.
//!
//! Like toggles are idempotent per entity. A second toggle while the
//! first is in flight supersedes it: the newest invocation owns the
//! settle step, earlier ones report [`MutationOutcome::Superseded`] and
//! touch nothing on return. The pre-first-toggle snapshot is kept for
//! the whole chain so a rollback lands on true server state, never on an
//! intermediate prediction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use api_client::SocialApi;
use api_types::{
    ApiError, ApiResult, AuthorRef, Comment, FeedScope, LikeTarget, NewComment, NewPost, Post,
    MAX_COMMENT_LENGTH, MAX_REPLY_DEPTH,
};

use crate::events::{ClientEvent, EventBus};
use crate::identity::{IdentityContext, Revalidation};
use crate::metrics::CacheMetrics;
use crate::store::{KeyPrefix, QueryCache, ViewerKey};
use crate::sync::CacheSynchronizer;

/// How an optimistic mutation settled
#[derive(Debug, Clone)]
pub enum MutationOutcome<T> {
    /// Server confirmed; the cache reflects the settled state
    Committed(T),
    /// A newer mutation on the same entity took over the settle step;
    /// this invocation changed nothing on return
    Superseded,
    /// The target no longer exists server-side; it was removed from the
    /// cache and the operation counts as complete
    TargetGone,
    /// The request failed and the prediction was reverted everywhere
    RolledBack(ApiError),
}

impl<T> MutationOutcome<T> {
    pub fn is_committed(&self) -> bool {
        matches!(self, MutationOutcome::Committed(_))
    }
}

/// In-flight like toggle bookkeeping. `snapshot` is the cached state
/// before the first toggle of the chain; `ticket` identifies the
/// invocation currently entitled to settle.
struct InFlight<T> {
    ticket: u64,
    snapshot: T,
}

pub struct MutationExecutor {
    api: Arc<dyn SocialApi>,
    cache: Arc<QueryCache>,
    sync: CacheSynchronizer,
    identity: Arc<IdentityContext>,
    events: EventBus,
    metrics: CacheMetrics,
    ticket_seq: AtomicU64,
    post_likes: DashMap<Uuid, InFlight<Post>>,
    comment_likes: DashMap<Uuid, InFlight<Comment>>,
}

impl MutationExecutor {
    pub fn new(
        api: Arc<dyn SocialApi>,
        cache: Arc<QueryCache>,
        identity: Arc<IdentityContext>,
        events: EventBus,
    ) -> Self {
        Self {
            api,
            sync: CacheSynchronizer::new(Arc::clone(&cache)),
            cache,
            identity,
            events,
            metrics: CacheMetrics::new(),
            ticket_seq: AtomicU64::new(0),
            post_likes: DashMap::new(),
            comment_likes: DashMap::new(),
        }
    }

    pub fn synchronizer(&self) -> &CacheSynchronizer {
        &self.sync
    }

    fn next_ticket(&self) -> u64 {
        self.ticket_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Rollback bookkeeping shared by every failed mutation: identity
    /// revalidation on authorization failures, then metrics and events
    async fn settle_failure(&self, operation: &'static str, err: &ApiError) {
        if matches!(err, ApiError::Unauthorized(_)) {
            if let Revalidation::Demoted {
                org_id,
                org_name,
                personal,
            } = self.identity.revalidate(self.api.as_ref()).await
            {
                self.events.publish(ClientEvent::IdentityDemoted {
                    org_id,
                    org_name,
                    personal,
                    at: Utc::now(),
                });
            }
        }
        self.metrics.record_rollback(operation, err.kind());
        self.events
            .publish(ClientEvent::mutation_failed(operation, err));
    }

    // ========== Like toggles ==========

    /// Toggle the acting identity's like on a post
    pub async fn toggle_post_like(&self, post_id: Uuid) -> ApiResult<MutationOutcome<bool>> {
        let acting = self.identity.require_active()?;
        let viewer = ViewerKey::from(&acting);
        let current = self
            .cache
            .find_post(post_id, viewer)
            .ok_or_else(|| ApiError::NotFound("post is not cached".to_string()))?;
        let desired = !current.has_liked;

        let ticket = self.next_ticket();
        let snapshot = match self.post_likes.entry(post_id) {
            Entry::Occupied(mut occupied) => {
                // Supersede: keep the original snapshot, take over settling.
                occupied.get_mut().ticket = ticket;
                self.metrics.record_supersede("post_like");
                debug!(%post_id, "post like toggle superseded an in-flight one");
                occupied.get().snapshot.clone()
            }
            Entry::Vacant(vacant) => {
                vacant.insert(InFlight {
                    ticket,
                    snapshot: current.clone(),
                });
                current.clone()
            }
        };

        // Racing fetches must not overwrite the prediction on arrival.
        self.cache.cancel_in_flight(KeyPrefix::PostRelated(post_id));
        self.cache.cancel_in_flight(KeyPrefix::Feeds);

        // Prediction is computed against the pre-chain snapshot so that
        // rapid toggles settle on a count the server can agree with.
        self.sync.write_post_like_state(
            post_id,
            predicted_count(snapshot.like_count, snapshot.has_liked, desired),
            desired,
            viewer,
        );
        self.metrics.record_optimistic_applied("post_like");

        let result = self
            .api
            .toggle_like(LikeTarget::Post { id: post_id }, desired, &acting)
            .await;

        // Atomic: the in-flight entry is removed only if this invocation
        // still holds the ticket, so exactly one invocation settles.
        if self
            .post_likes
            .remove_if(&post_id, |_, inflight| inflight.ticket == ticket)
            .is_none()
        {
            return Ok(MutationOutcome::Superseded);
        }

        match result {
            Ok(ack) => {
                if ack.liked != desired {
                    // Server disagrees (e.g. a concurrent session); it wins.
                    warn!(%post_id, desired, settled = ack.liked, "like toggle settled differently than predicted");
                    self.sync.write_post_like_state(
                        post_id,
                        predicted_count(snapshot.like_count, snapshot.has_liked, ack.liked),
                        ack.liked,
                        viewer,
                    );
                }
                Ok(MutationOutcome::Committed(ack.liked))
            }
            Err(ApiError::NotFound(_)) => {
                self.sync.remove_post(post_id);
                Ok(MutationOutcome::TargetGone)
            }
            Err(err) => {
                self.sync.write_post_like_state(
                    post_id,
                    snapshot.like_count,
                    snapshot.has_liked,
                    viewer,
                );
                self.settle_failure("post_like", &err).await;
                Ok(MutationOutcome::RolledBack(err))
            }
        }
    }

    /// Toggle the acting identity's like on a comment
    pub async fn toggle_comment_like(&self, comment_id: Uuid) -> ApiResult<MutationOutcome<bool>> {
        let acting = self.identity.require_active()?;
        let viewer = ViewerKey::from(&acting);
        let current = self
            .cache
            .find_comment(comment_id, viewer)
            .ok_or_else(|| ApiError::NotFound("comment is not cached".to_string()))?;
        let desired = !current.has_liked;

        let ticket = self.next_ticket();
        let snapshot = match self.comment_likes.entry(comment_id) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().ticket = ticket;
                self.metrics.record_supersede("comment_like");
                occupied.get().snapshot.clone()
            }
            Entry::Vacant(vacant) => {
                vacant.insert(InFlight {
                    ticket,
                    snapshot: current.clone(),
                });
                current.clone()
            }
        };

        self.cache
            .cancel_in_flight(KeyPrefix::PostRelated(current.post_id));

        self.sync.write_comment_like_state(
            comment_id,
            predicted_count(snapshot.like_count, snapshot.has_liked, desired),
            desired,
            viewer,
        );
        self.metrics.record_optimistic_applied("comment_like");

        let result = self
            .api
            .toggle_like(LikeTarget::Comment { id: comment_id }, desired, &acting)
            .await;

        if self
            .comment_likes
            .remove_if(&comment_id, |_, inflight| inflight.ticket == ticket)
            .is_none()
        {
            return Ok(MutationOutcome::Superseded);
        }

        match result {
            Ok(ack) => {
                if ack.liked != desired {
                    self.sync.write_comment_like_state(
                        comment_id,
                        predicted_count(snapshot.like_count, snapshot.has_liked, ack.liked),
                        ack.liked,
                        viewer,
                    );
                }
                Ok(MutationOutcome::Committed(ack.liked))
            }
            Err(ApiError::NotFound(_)) => {
                self.sync.remove_comment(comment_id, viewer);
                Ok(MutationOutcome::TargetGone)
            }
            Err(err) => {
                self.sync.write_comment_like_state(
                    comment_id,
                    snapshot.like_count,
                    snapshot.has_liked,
                    viewer,
                );
                self.settle_failure("comment_like", &err).await;
                Ok(MutationOutcome::RolledBack(err))
            }
        }
    }

    // ========== Comment create/delete ==========

    /// Create a comment with an optimistic placeholder that the canonical
    /// server object replaces on success
    pub async fn create_comment(
        &self,
        payload: NewComment,
    ) -> ApiResult<MutationOutcome<Comment>> {
        payload.validate().map_err(ApiError::Validation)?;
        let acting = self.identity.require_active()?;
        let viewer = ViewerKey::from(&acting);

        // Reply structure is validated locally before any cache write.
        if let Some(parent_id) = payload.parent_comment_id {
            let parent = self.cache.find_comment(parent_id, viewer).ok_or_else(|| {
                ApiError::Validation("parent comment is not loaded".to_string())
            })?;
            if parent.post_id != payload.post_id {
                return Err(ApiError::Validation(
                    "reply parent belongs to a different post".to_string(),
                ));
            }
            if parent.depth() >= MAX_REPLY_DEPTH {
                return Err(ApiError::Validation(
                    "replies cannot be nested further".to_string(),
                ));
            }
        }

        self.cache
            .cancel_in_flight(KeyPrefix::PostRelated(payload.post_id));

        let placeholder = Comment {
            id: Uuid::new_v4(),
            post_id: payload.post_id,
            parent_comment_id: payload.parent_comment_id,
            author: AuthorRef::from(&acting),
            content: payload.content.trim().to_string(),
            like_count: 0,
            has_liked: false,
            reply_count: 0,
            created_at: Utc::now(),
        };
        let placeholder_id = placeholder.id;
        self.sync.insert_comment(placeholder, viewer);
        self.metrics.record_optimistic_applied("comment_create");

        match self.api.create_comment(&payload, &acting).await {
            Ok(canonical) => {
                self.sync.replace_comment(placeholder_id, canonical.clone());
                Ok(MutationOutcome::Committed(canonical))
            }
            Err(ApiError::NotFound(_)) => {
                // The post itself is gone; drop it and the placeholder.
                self.sync.remove_comment(placeholder_id, viewer);
                self.sync.remove_post(payload.post_id);
                Ok(MutationOutcome::TargetGone)
            }
            Err(err) => {
                self.sync.remove_comment(placeholder_id, viewer);
                self.settle_failure("comment_create", &err).await;
                Ok(MutationOutcome::RolledBack(err))
            }
        }
    }

    /// Delete a comment; optimistically removed from every cached list
    /// with the parent counters reversed
    pub async fn delete_comment(&self, comment_id: Uuid) -> ApiResult<MutationOutcome<()>> {
        let acting = self.identity.require_active()?;
        let viewer = ViewerKey::from(&acting);
        let target = self
            .cache
            .find_comment(comment_id, viewer)
            .ok_or_else(|| ApiError::NotFound("comment is not cached".to_string()))?;
        let post_id = target.post_id;

        self.cache.cancel_in_flight(KeyPrefix::PostRelated(post_id));
        self.cache.cancel_in_flight(KeyPrefix::Feeds);

        // Entry-level snapshot: lists holding the comment plus every post
        // copy whose counter the removal will touch.
        let rollback = self.cache.snapshot_where(|_, value| {
            value.contains_comment(comment_id) || value.contains_post(post_id)
        });

        self.sync.remove_comment(comment_id, viewer);
        self.metrics.record_optimistic_applied("comment_delete");

        match self.api.delete_comment(comment_id, &acting).await {
            Ok(()) => Ok(MutationOutcome::Committed(())),
            // Already gone server-side; the cache removal stands.
            Err(ApiError::NotFound(_)) => Ok(MutationOutcome::TargetGone),
            Err(err) => {
                self.cache.restore_entries(rollback);
                self.settle_failure("comment_delete", &err).await;
                Ok(MutationOutcome::RolledBack(err))
            }
        }
    }

    // ========== Post create/delete ==========

    /// Create a post. Not optimistic: the canonical object is prepended to
    /// the author's cached home feed once the server confirms.
    pub async fn create_post(&self, payload: NewPost) -> ApiResult<Post> {
        let trimmed = payload.content.trim();
        if trimmed.is_empty() && payload.media.is_empty() {
            return Err(ApiError::Validation(
                "post must have content or media".to_string(),
            ));
        }
        if trimmed.chars().count() > MAX_COMMENT_LENGTH * 2 {
            return Err(ApiError::Validation("post content too long".to_string()));
        }
        let acting = self.identity.require_active()?;
        let viewer = ViewerKey::from(&acting);

        match self.api.create_post(&payload, &acting).await {
            Ok(post) => {
                self.sync
                    .prepend_post_to_feed(FeedScope::Home, viewer, post.clone());
                self.cache.invalidate(KeyPrefix::Feeds);
                Ok(post)
            }
            Err(err) => {
                self.settle_failure("post_create", &err).await;
                Err(err)
            }
        }
    }

    /// Delete a post; optimistically removed from every cached view
    pub async fn delete_post(&self, post_id: Uuid) -> ApiResult<MutationOutcome<()>> {
        let acting = self.identity.require_active()?;
        let viewer = ViewerKey::from(&acting);
        if self.cache.find_post(post_id, viewer).is_none() {
            return Err(ApiError::NotFound("post is not cached".to_string()));
        }

        self.cache.cancel_in_flight(KeyPrefix::PostRelated(post_id));
        self.cache.cancel_in_flight(KeyPrefix::Feeds);

        let rollback = self.cache.snapshot_where(|key, value| {
            value.contains_post(post_id) || key.post_id() == Some(post_id)
        });

        self.sync.remove_post(post_id);
        self.metrics.record_optimistic_applied("post_delete");

        match self.api.delete_post(post_id, &acting).await {
            Ok(()) => Ok(MutationOutcome::Committed(())),
            Err(ApiError::NotFound(_)) => Ok(MutationOutcome::TargetGone),
            Err(err) => {
                self.cache.restore_entries(rollback);
                self.settle_failure("post_delete", &err).await;
                Ok(MutationOutcome::RolledBack(err))
            }
        }
    }
}

/// Like-count prediction from a snapshot: a toggle back to the snapshot's
/// own state restores its count, otherwise the count moves by one
fn predicted_count(snapshot_count: u32, snapshot_liked: bool, desired: bool) -> u32 {
    if desired == snapshot_liked {
        snapshot_count
    } else if desired {
        snapshot_count.saturating_add(1)
    } else {
        snapshot_count.saturating_sub(1)
    }
}
