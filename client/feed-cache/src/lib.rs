//! CampusLink client-side feed cache
//!
//! Key-addressed cache of server data with optimistic mutations on top.
//! Reads are served from cached pages; writes apply their predicted
//! outcome to every cached copy immediately and reconcile when the
//! server answers. The pieces:
//!
//! - [`store::QueryCache`]: viewer-scoped, copy-on-write storage with
//!   epoch-based cancellation of in-flight fetches
//! - [`sync::CacheSynchronizer`]: fans one entity change out to every
//!   denormalized copy
//! - [`mutation::MutationExecutor`]: the snapshot / predict / dispatch /
//!   settle protocol, including like-toggle supersede and rollback
//! - [`feed::AssembledFeed`]: page merge with first-occurrence post dedup
//! - [`identity::IdentityContext`]: the acting persona every read and
//!   write is attributed to
//!
//! [`SocialClient`] wires them together behind one handle.

pub mod config;
pub mod events;
pub mod feed;
pub mod identity;
pub mod metrics;
pub mod mutation;
pub mod store;
pub mod sync;

pub use config::Config;
pub use events::{ClientEvent, EventBus};
pub use feed::{should_fetch_next, AssembledFeed, FeedPhase};
pub use identity::{IdentityContext, Revalidation};
pub use metrics::CacheMetrics;
pub use mutation::{MutationExecutor, MutationOutcome};
pub use store::{CollectionSnapshot, KeyPrefix, QueryCache, QueryKey, ViewerKey};
pub use sync::{CacheSynchronizer, CommentDelta, PostDelta};

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use api_client::SocialApi;
use api_types::{ApiError, ApiResult, Comment, FeedScope, NewComment, NewPost, Post};

/// One client instance: cache, identity, events and mutations behind a
/// single cloneable handle
pub struct SocialClient {
    api: Arc<dyn SocialApi>,
    cache: Arc<QueryCache>,
    identity: Arc<IdentityContext>,
    events: EventBus,
    mutations: MutationExecutor,
    config: Config,
}

impl SocialClient {
    pub fn new(api: Arc<dyn SocialApi>, config: Config) -> Self {
        let cache = Arc::new(QueryCache::new());
        let identity = Arc::new(IdentityContext::new());
        let events = EventBus::new(config.events.buffer);
        let mutations = MutationExecutor::new(
            Arc::clone(&api),
            Arc::clone(&cache),
            Arc::clone(&identity),
            events.clone(),
        );
        Self {
            api,
            cache,
            identity,
            events,
            mutations,
            config,
        }
    }

    pub fn identity(&self) -> &IdentityContext {
        &self.identity
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Direct cache access for embedding applications that need manual
    /// invalidation beyond what the mutation protocol does itself
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    // ========== Feed reads ==========

    /// The assembled display list for a feed, from cached pages only
    pub fn feed(&self, scope: FeedScope) -> ApiResult<AssembledFeed> {
        let acting = self.identity.require_active()?;
        let key = QueryKey::Feed {
            scope,
            viewer: ViewerKey::from(&acting),
        };
        Ok(AssembledFeed::assemble(&self.cache.feed_snapshot(&key)))
    }

    /// Whether the next feed page should be requested now, given that the
    /// consumer signalled need (scroll position, visibility)
    pub fn should_fetch_next_feed_page(&self, scope: FeedScope, consumer_needs_more: bool) -> bool {
        let Some(acting) = self.identity.active() else {
            return false;
        };
        let key = QueryKey::Feed {
            scope,
            viewer: ViewerKey::from(&acting),
        };
        should_fetch_next(&self.cache.feed_snapshot(&key), consumer_needs_more)
    }

    /// Fetch and append the next feed page. Returns whether the page was
    /// installed; `false` means another fetch held the slot or the query
    /// was cancelled while the request was in flight.
    pub async fn load_next_feed_page(&self, scope: FeedScope) -> ApiResult<bool> {
        let acting = self.identity.require_active()?;
        let key = QueryKey::Feed {
            scope,
            viewer: ViewerKey::from(&acting),
        };
        let cursor = self
            .cache
            .feed_snapshot(&key)
            .next_cursor()
            .map(str::to_string);
        let Some(ticket) = self.cache.begin_fetch(key) else {
            return Ok(false);
        };
        match self
            .api
            .fetch_feed(
                &scope,
                cursor.as_deref(),
                self.config.feed.page_size_clamped(),
                &acting,
            )
            .await
        {
            Ok(page) => Ok(self.cache.complete_feed_page(ticket, page)),
            Err(err) => {
                self.cache.fail_fetch(ticket);
                Err(err)
            }
        }
    }

    // ========== Post & comment reads ==========

    /// A post's detail entry, fetched when missing or stale
    pub async fn post_detail(&self, post_id: Uuid) -> ApiResult<Post> {
        let acting = self.identity.require_active()?;
        let viewer = ViewerKey::from(&acting);
        let key = QueryKey::Post { post_id, viewer };

        let cached = self.cache.find_post(post_id, viewer);
        if let Some(post) = &cached {
            if !self.cache.is_stale(&key) {
                return Ok(post.clone());
            }
        }

        let Some(ticket) = self.cache.begin_fetch(key) else {
            // A fetch is already in flight; serve what we have.
            return cached.ok_or_else(|| ApiError::NotFound("post is not cached".to_string()));
        };
        match self.api.fetch_post(post_id, &acting).await {
            Ok(post) => {
                self.cache.complete_post_fetch(ticket, post.clone());
                Ok(post)
            }
            Err(err) => {
                self.cache.fail_fetch(ticket);
                Err(err)
            }
        }
    }

    /// Cached comments of a post, flattened in fetch order
    pub fn comments(&self, post_id: Uuid) -> ApiResult<Vec<Comment>> {
        let acting = self.identity.require_active()?;
        let key = QueryKey::Comments {
            post_id,
            viewer: ViewerKey::from(&acting),
        };
        Ok(feed::concat_comments(
            &self.cache.comments_snapshot(&key).pages,
        ))
    }

    /// Fetch and append the next comment page of a post
    pub async fn load_next_comments_page(&self, post_id: Uuid) -> ApiResult<bool> {
        let acting = self.identity.require_active()?;
        let key = QueryKey::Comments {
            post_id,
            viewer: ViewerKey::from(&acting),
        };
        let cursor = self
            .cache
            .comments_snapshot(&key)
            .next_cursor()
            .map(str::to_string);
        let Some(ticket) = self.cache.begin_fetch(key) else {
            return Ok(false);
        };
        match self
            .api
            .fetch_comments(
                post_id,
                cursor.as_deref(),
                self.config.feed.comment_page_size_clamped(),
                &acting,
            )
            .await
        {
            Ok(page) => Ok(self.cache.complete_comment_page(ticket, page)),
            Err(err) => {
                self.cache.fail_fetch(ticket);
                Err(err)
            }
        }
    }

    // ========== Mutations ==========

    pub async fn toggle_post_like(&self, post_id: Uuid) -> ApiResult<MutationOutcome<bool>> {
        self.mutations.toggle_post_like(post_id).await
    }

    pub async fn toggle_comment_like(&self, comment_id: Uuid) -> ApiResult<MutationOutcome<bool>> {
        self.mutations.toggle_comment_like(comment_id).await
    }

    pub async fn create_comment(&self, payload: NewComment) -> ApiResult<MutationOutcome<Comment>> {
        self.mutations.create_comment(payload).await
    }

    pub async fn delete_comment(&self, comment_id: Uuid) -> ApiResult<MutationOutcome<()>> {
        self.mutations.delete_comment(comment_id).await
    }

    pub async fn create_post(&self, payload: NewPost) -> ApiResult<Post> {
        self.mutations.create_post(payload).await
    }

    pub async fn delete_post(&self, post_id: Uuid) -> ApiResult<MutationOutcome<()>> {
        self.mutations.delete_post(post_id).await
    }

    // ========== Identity plumbing ==========

    /// Watch identity switches and retire the outgoing viewer's cache:
    /// its in-flight fetches are cancelled and its entries dropped, since
    /// `has_liked` and visibility filtering are identity-relative
    pub fn spawn_identity_watcher(&self) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let mut rx = self.identity.subscribe();
        let mut previous = rx.borrow().clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let next = rx.borrow().clone();
                if next == previous {
                    continue;
                }
                if let Some(old) = previous.take() {
                    let old_viewer = ViewerKey::from(&old);
                    let cancelled = cache.cancel_in_flight(KeyPrefix::Viewer(old_viewer));
                    let removed = cache.remove(KeyPrefix::Viewer(old_viewer));
                    info!(
                        old_viewer_id = %old.id,
                        cancelled,
                        removed,
                        "retired cache entries of previous identity"
                    );
                }
                previous = next;
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::Utc;
    use uuid::Uuid;

    use api_types::{
        AuthorRef, Comment, FeedItem, IdentityKind, Page, Post, SuggestionCard, Visibility,
    };

    use crate::store::ViewerKey;

    pub fn viewer_key() -> ViewerKey {
        ViewerKey {
            kind: IdentityKind::Personal,
            id: Uuid::new_v4(),
        }
    }

    pub fn author() -> AuthorRef {
        AuthorRef {
            id: Uuid::new_v4(),
            kind: IdentityKind::Personal,
            display_name: "Test User".to_string(),
            avatar_url: None,
        }
    }

    pub fn post_with(like_count: u32, has_liked: bool) -> Post {
        Post {
            id: Uuid::new_v4(),
            author: author(),
            content: "hello campus".to_string(),
            media: vec![],
            visibility: Visibility::Public,
            like_count,
            comment_count: 2,
            has_liked,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            tagged_org: None,
        }
    }

    pub fn feed_page(posts: Vec<Post>, cursor: Option<&str>) -> Page<FeedItem> {
        Page {
            items: posts.into_iter().map(FeedItem::Post).collect(),
            next_cursor: cursor.map(str::to_string),
        }
    }

    pub fn comment_on(post_id: Uuid, parent_comment_id: Option<Uuid>) -> Comment {
        Comment {
            id: Uuid::new_v4(),
            post_id,
            parent_comment_id,
            author: author(),
            content: "nice one".to_string(),
            like_count: 0,
            has_liked: false,
            reply_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn suggestion_card() -> FeedItem {
        FeedItem::Suggestions(SuggestionCard {
            id: Uuid::new_v4(),
            title: "People you may know".to_string(),
            accounts: vec![author()],
        })
    }
}
