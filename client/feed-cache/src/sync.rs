//! Cache synchronizer: fan-out of single-entity changes
//!
//! A change to one entity (a like, a new comment, a deletion) must reach
//! every cached view embedding a copy of it: the detail entry, every feed
//! page, every comment list. All writes here go through the store's
//! copy-on-write primitives, so each fan-out is a pure function of the
//! previous cache snapshot and the patch; no shared page or item is ever
//! mutated in place.
//!
//! Counter arithmetic is clamped at zero. Counters are server-derived and
//! a delta applied against a copy the server has since changed must never
//! produce a negative display value.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use api_types::{Comment, FeedScope, Page, Post};

use crate::store::{CachedValue, QueryCache, QueryKey, ViewerKey};

/// Relative patch for a post's interaction fields. `has_liked` applies
/// only to entries fetched for the acting viewer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostDelta {
    pub like_delta: i64,
    pub comment_delta: i64,
    pub has_liked: Option<bool>,
}

/// Relative patch for a comment's interaction fields
#[derive(Debug, Clone, Copy, Default)]
pub struct CommentDelta {
    pub like_delta: i64,
    pub reply_delta: i64,
    pub has_liked: Option<bool>,
}

/// Applies entity patches to every cached copy
#[derive(Clone)]
pub struct CacheSynchronizer {
    cache: Arc<QueryCache>,
}

impl CacheSynchronizer {
    pub fn new(cache: Arc<QueryCache>) -> Self {
        Self { cache }
    }

    // ========== Post fan-out ==========

    /// Apply a relative patch to every cached copy of a post
    pub fn apply_post_delta(&self, post_id: Uuid, delta: PostDelta, acting: ViewerKey) -> usize {
        let touched = self.cache.update_posts(post_id, |post, viewer| {
            let mut updated = post.clone();
            updated.like_count = adjust(updated.like_count, delta.like_delta);
            updated.comment_count = adjust(updated.comment_count, delta.comment_delta);
            if viewer == acting {
                if let Some(liked) = delta.has_liked {
                    updated.has_liked = liked;
                }
            }
            updated
        });
        debug!(%post_id, ?delta, touched, "applied post delta");
        touched
    }

    /// Write a post's like state absolutely, in every location a
    /// prediction was (or will be) applied. Used both to apply a
    /// prediction and to restore a pre-mutation snapshot; other fields
    /// are left as they are.
    pub fn write_post_like_state(
        &self,
        post_id: Uuid,
        like_count: u32,
        has_liked: bool,
        acting: ViewerKey,
    ) -> usize {
        let touched = self.cache.update_posts(post_id, |post, viewer| {
            let mut updated = post.clone();
            updated.like_count = like_count;
            if viewer == acting {
                updated.has_liked = has_liked;
            }
            updated
        });
        debug!(%post_id, like_count, has_liked, touched, "wrote post like state");
        touched
    }

    /// Remove a post from every cached view
    pub fn remove_post(&self, post_id: Uuid) -> usize {
        let touched = self.cache.remove_post_everywhere(post_id);
        debug!(%post_id, touched, "removed post from cache");
        touched
    }

    /// Prepend a freshly created post to the author's cached home feed
    pub fn prepend_post_to_feed(&self, scope: FeedScope, viewer: ViewerKey, post: Post) {
        let key = QueryKey::Feed { scope, viewer };
        let Some(CachedValue::FeedPages(pages)) = self.cache.get(&key) else {
            return;
        };
        let mut pages = pages;
        let first = match pages.first() {
            Some(first) => {
                let mut items = vec![api_types::FeedItem::Post(post)];
                items.extend(first.items.iter().cloned());
                Arc::new(Page {
                    items,
                    next_cursor: first.next_cursor.clone(),
                })
            }
            None => Arc::new(Page {
                items: vec![api_types::FeedItem::Post(post)],
                next_cursor: None,
            }),
        };
        if pages.is_empty() {
            pages.push(first);
        } else {
            pages[0] = first;
        }
        self.cache.restore_entries(vec![(key, CachedValue::FeedPages(pages))]);
    }

    // ========== Comment fan-out ==========

    /// Apply a relative patch to every cached copy of a comment
    pub fn apply_comment_delta(
        &self,
        comment_id: Uuid,
        delta: CommentDelta,
        acting: ViewerKey,
    ) -> usize {
        let touched = self.cache.update_comments(comment_id, |comment, viewer| {
            let mut updated = comment.clone();
            updated.like_count = adjust(updated.like_count, delta.like_delta);
            updated.reply_count = adjust(updated.reply_count, delta.reply_delta);
            if viewer == acting {
                if let Some(liked) = delta.has_liked {
                    updated.has_liked = liked;
                }
            }
            updated
        });
        debug!(%comment_id, ?delta, touched, "applied comment delta");
        touched
    }

    /// Write a comment's like state absolutely in every cached copy
    pub fn write_comment_like_state(
        &self,
        comment_id: Uuid,
        like_count: u32,
        has_liked: bool,
        acting: ViewerKey,
    ) -> usize {
        self.cache.update_comments(comment_id, |comment, viewer| {
            let mut updated = comment.clone();
            updated.like_count = like_count;
            if viewer == acting {
                updated.has_liked = has_liked;
            }
            updated
        })
    }

    /// Insert an optimistic comment: appended to the viewer's list, the
    /// post's comment counter incremented everywhere, and for a reply the
    /// parent's reply counter incremented everywhere
    pub fn insert_comment(&self, comment: Comment, acting: ViewerKey) {
        let post_id = comment.post_id;
        let parent = comment.parent_comment_id;

        self.cache.append_comment(acting, comment);
        self.apply_post_delta(
            post_id,
            PostDelta {
                comment_delta: 1,
                ..Default::default()
            },
            acting,
        );
        if let Some(parent_id) = parent {
            self.apply_comment_delta(
                parent_id,
                CommentDelta {
                    reply_delta: 1,
                    ..Default::default()
                },
                acting,
            );
        }
    }

    /// Swap an optimistic placeholder for the canonical server object
    pub fn replace_comment(&self, placeholder_id: Uuid, canonical: Comment) -> usize {
        self.cache
            .update_comments(placeholder_id, |_, _| canonical.clone())
    }

    /// Remove a comment from every cached list and reverse the counters
    /// it contributed to. Returns the removed copy.
    pub fn remove_comment(&self, comment_id: Uuid, acting: ViewerKey) -> Option<Comment> {
        let removed = self.cache.remove_comment_everywhere(comment_id)?;
        self.apply_post_delta(
            removed.post_id,
            PostDelta {
                comment_delta: -1,
                ..Default::default()
            },
            acting,
        );
        if let Some(parent_id) = removed.parent_comment_id {
            self.apply_comment_delta(
                parent_id,
                CommentDelta {
                    reply_delta: -1,
                    ..Default::default()
                },
                acting,
            );
        }
        Some(removed)
    }
}

/// Clamped counter adjustment
fn adjust(count: u32, delta: i64) -> u32 {
    (count as i64 + delta).clamp(0, u32::MAX as i64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{comment_on, feed_page, post_with, viewer_key};
    use api_types::FeedItem;

    fn seeded(
    ) -> (Arc<QueryCache>, CacheSynchronizer, ViewerKey, Post, QueryKey) {
        let cache = Arc::new(QueryCache::new());
        let sync = CacheSynchronizer::new(Arc::clone(&cache));
        let viewer = viewer_key();
        let post = post_with(5, false);

        let feed_key = QueryKey::Feed {
            scope: FeedScope::Home,
            viewer,
        };
        let t = cache.begin_fetch(feed_key).unwrap();
        cache.complete_feed_page(t, feed_page(vec![post.clone(), post_with(3, true)], None));

        let detail_key = QueryKey::Post {
            post_id: post.id,
            viewer,
        };
        let t = cache.begin_fetch(detail_key).unwrap();
        cache.complete_post_fetch(t, post.clone());

        (cache, sync, viewer, post, feed_key)
    }

    #[test]
    fn test_post_delta_reaches_all_copies_and_nothing_else() {
        let (cache, sync, viewer, post, feed_key) = seeded();

        let touched = sync.apply_post_delta(
            post.id,
            PostDelta {
                like_delta: 1,
                has_liked: Some(true),
                ..Default::default()
            },
            viewer,
        );
        assert_eq!(touched, 2);

        let detail = cache.find_post(post.id, viewer).unwrap();
        assert_eq!(detail.like_count, 6);
        assert!(detail.has_liked);

        // The sibling post in the same page is untouched.
        let feed = cache.feed_snapshot(&feed_key);
        let sibling = feed.pages[0]
            .items
            .iter()
            .find_map(|item| match item {
                FeedItem::Post(p) if p.id != post.id => Some(p.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(sibling.like_count, 3);
    }

    #[test]
    fn test_counter_never_goes_negative() {
        let (cache, sync, viewer, post, _) = seeded();

        sync.apply_post_delta(
            post.id,
            PostDelta {
                like_delta: -100,
                ..Default::default()
            },
            viewer,
        );
        assert_eq!(cache.find_post(post.id, viewer).unwrap().like_count, 0);
    }

    #[test]
    fn test_restore_matches_snapshot_exactly() {
        let (cache, sync, viewer, post, _) = seeded();

        sync.apply_post_delta(
            post.id,
            PostDelta {
                like_delta: 1,
                has_liked: Some(true),
                ..Default::default()
            },
            viewer,
        );
        sync.write_post_like_state(post.id, post.like_count, post.has_liked, viewer);

        let restored = cache.find_post(post.id, viewer).unwrap();
        assert_eq!(restored.like_count, post.like_count);
        assert_eq!(restored.has_liked, post.has_liked);
    }

    #[test]
    fn test_insert_and_remove_comment_reverse_each_other() {
        let (cache, sync, viewer, post, _) = seeded();

        let comments_key = QueryKey::Comments {
            post_id: post.id,
            viewer,
        };
        let t = cache.begin_fetch(comments_key).unwrap();
        cache.complete_comment_page(
            t,
            Page {
                items: vec![comment_on(post.id, None)],
                next_cursor: None,
            },
        );

        let comment = comment_on(post.id, None);
        let comment_id = comment.id;
        sync.insert_comment(comment, viewer);

        assert_eq!(cache.find_post(post.id, viewer).unwrap().comment_count, 3);
        assert_eq!(
            cache.comments_snapshot(&comments_key).pages[0].items.len(),
            2
        );

        sync.remove_comment(comment_id, viewer).unwrap();
        assert_eq!(cache.find_post(post.id, viewer).unwrap().comment_count, 2);
        assert_eq!(
            cache.comments_snapshot(&comments_key).pages[0].items.len(),
            1
        );
    }

    #[test]
    fn test_reply_adjusts_parent_reply_count() {
        let (cache, sync, viewer, post, _) = seeded();

        let parent = comment_on(post.id, None);
        let parent_id = parent.id;
        let comments_key = QueryKey::Comments {
            post_id: post.id,
            viewer,
        };
        let t = cache.begin_fetch(comments_key).unwrap();
        cache.complete_comment_page(
            t,
            Page {
                items: vec![parent],
                next_cursor: None,
            },
        );

        let reply = comment_on(post.id, Some(parent_id));
        let reply_id = reply.id;
        sync.insert_comment(reply, viewer);
        assert_eq!(cache.find_comment(parent_id, viewer).unwrap().reply_count, 1);

        sync.remove_comment(reply_id, viewer).unwrap();
        assert_eq!(cache.find_comment(parent_id, viewer).unwrap().reply_count, 0);
    }

    #[test]
    fn test_prepend_post_to_feed() {
        let (cache, sync, viewer, _, feed_key) = seeded();
        let fresh = post_with(0, false);

        sync.prepend_post_to_feed(FeedScope::Home, viewer, fresh.clone());

        let feed = cache.feed_snapshot(&feed_key);
        assert_eq!(feed.pages[0].items[0].post_id(), Some(fresh.id));
        assert_eq!(feed.pages[0].items.len(), 3);

        // Prepending for a viewer with no cached feed is a no-op.
        let other = viewer_key();
        sync.prepend_post_to_feed(FeedScope::Home, other, fresh);
        assert!(cache
            .feed_snapshot(&QueryKey::Feed {
                scope: FeedScope::Home,
                viewer: other
            })
            .pages
            .is_empty());
    }
}
