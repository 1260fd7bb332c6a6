//! Typed cache key schema
//!
//! Every key carries the viewer it was fetched for: `has_liked` flags and
//! visibility filtering are identity-relative, so data fetched as one
//! identity must never be served to another.

use api_types::{ActingIdentity, FeedScope, IdentityKind};
use uuid::Uuid;

/// Viewer component of a cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewerKey {
    pub kind: IdentityKind,
    pub id: Uuid,
}

impl From<&ActingIdentity> for ViewerKey {
    fn from(identity: &ActingIdentity) -> Self {
        Self {
            kind: identity.kind,
            id: identity.id,
        }
    }
}

/// Tagged cache key: one variant per query kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// Paginated feed collection
    Feed { scope: FeedScope, viewer: ViewerKey },
    /// Single post detail
    Post { post_id: Uuid, viewer: ViewerKey },
    /// Paginated comment list of one post
    Comments { post_id: Uuid, viewer: ViewerKey },
}

impl QueryKey {
    pub fn viewer(&self) -> ViewerKey {
        match self {
            QueryKey::Feed { viewer, .. }
            | QueryKey::Post { viewer, .. }
            | QueryKey::Comments { viewer, .. } => *viewer,
        }
    }

    /// The post this key is directly about, if any
    pub fn post_id(&self) -> Option<Uuid> {
        match self {
            QueryKey::Feed { .. } => None,
            QueryKey::Post { post_id, .. } | QueryKey::Comments { post_id, .. } => Some(*post_id),
        }
    }

    /// Stable label for metrics and structured logs
    pub fn kind_label(&self) -> &'static str {
        match self {
            QueryKey::Feed { .. } => "feed",
            QueryKey::Post { .. } => "post",
            QueryKey::Comments { .. } => "comments",
        }
    }
}

/// Selector used by invalidation and in-flight cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPrefix {
    /// Every cached query
    All,
    /// Every feed collection
    Feeds,
    /// Every query fetched for one viewer
    Viewer(ViewerKey),
    /// The detail entry and comment lists of one post
    PostRelated(Uuid),
}

impl KeyPrefix {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            KeyPrefix::All => true,
            KeyPrefix::Feeds => matches!(key, QueryKey::Feed { .. }),
            KeyPrefix::Viewer(viewer) => key.viewer() == *viewer,
            KeyPrefix::PostRelated(post_id) => key.post_id() == Some(*post_id),
        }
    }
}
