//! Injectable query cache
//!
//! Key-addressed store of server-fetched data. Values are a tagged union
//! (single entity vs. paginated collection) so fan-out updates dispatch on
//! the tag instead of probing shapes. Pages are held behind `Arc` and every
//! update is copy-on-write at collection, page, and item level: consumers
//! holding a previous snapshot never observe a half-applied update, and
//! untouched pages keep their identity.
//!
//! Cancellation is epoch-based. `cancel_in_flight` bumps the epoch of the
//! matching keys; a fetch completing against an older epoch is dropped so
//! a stale response can never overwrite a later optimistic value.

mod keys;

pub use keys::{KeyPrefix, QueryKey, ViewerKey};

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use api_types::{Comment, FeedItem, Page, Post};

use crate::metrics::CacheMetrics;

/// Tagged cache value: one variant per query kind
#[derive(Debug, Clone)]
pub enum CachedValue {
    /// Canonical single-post entry
    Post(Arc<Post>),
    /// Fetched feed pages in fetch order
    FeedPages(Vec<Arc<Page<FeedItem>>>),
    /// Fetched comment pages of one post, in fetch order
    CommentPages(Vec<Arc<Page<Comment>>>),
}

impl CachedValue {
    /// Whether a denormalized copy of the given post is embedded here
    pub fn contains_post(&self, post_id: Uuid) -> bool {
        match self {
            CachedValue::Post(post) => post.id == post_id,
            CachedValue::FeedPages(pages) => pages
                .iter()
                .any(|page| page.items.iter().any(|item| item.post_id() == Some(post_id))),
            CachedValue::CommentPages(_) => false,
        }
    }

    pub fn contains_comment(&self, comment_id: Uuid) -> bool {
        match self {
            CachedValue::CommentPages(pages) => pages
                .iter()
                .any(|page| page.items.iter().any(|c| c.id == comment_id)),
            _ => false,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct CacheEntry {
    value: Option<CachedValue>,
    epoch: u64,
    stale: bool,
    fetching: bool,
    errored: bool,
}

/// Handle for an in-flight fetch; carries the epoch observed at start so
/// completion can detect that it has been cancelled or superseded
#[derive(Debug, Clone, Copy)]
pub struct FetchTicket {
    key: QueryKey,
    epoch: u64,
}

impl FetchTicket {
    pub fn key(&self) -> QueryKey {
        self.key
    }
}

/// View of a paginated collection plus its fetch state
#[derive(Debug, Clone)]
pub struct CollectionSnapshot<T> {
    pub pages: Vec<Arc<Page<T>>>,
    pub fetching: bool,
    pub errored: bool,
    pub stale: bool,
}

impl<T> Default for CollectionSnapshot<T> {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            fetching: false,
            errored: false,
            stale: false,
        }
    }
}

impl<T> CollectionSnapshot<T> {
    /// Continuation cursor of the collection, if any
    pub fn next_cursor(&self) -> Option<&str> {
        self.pages.last().and_then(|page| page.next_cursor.as_deref())
    }

    /// True once a page arrived with no further cursor
    pub fn exhausted(&self) -> bool {
        self.pages
            .last()
            .map(|page| page.next_cursor.is_none())
            .unwrap_or(false)
    }

    /// At least one page fetched successfully
    pub fn loaded(&self) -> bool {
        !self.pages.is_empty()
    }
}

/// The shared client-side cache
///
/// Constructed per client instance so tests can run isolated caches. All
/// writers go through the copy-on-write update methods below; cached
/// objects are never mutated in place.
pub struct QueryCache {
    entries: DashMap<QueryKey, CacheEntry>,
    metrics: CacheMetrics,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            metrics: CacheMetrics::new(),
        }
    }

    // ========== Reads ==========

    pub fn get(&self, key: &QueryKey) -> Option<CachedValue> {
        match self.entries.get(key).and_then(|e| e.value.clone()) {
            Some(value) => {
                self.metrics.record_hit(key.kind_label());
                Some(value)
            }
            None => {
                self.metrics.record_miss(key.kind_label());
                None
            }
        }
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.entries.get(key).map(|e| e.stale).unwrap_or(false)
    }

    /// Feed pages plus fetch state for one feed key
    pub fn feed_snapshot(&self, key: &QueryKey) -> CollectionSnapshot<FeedItem> {
        let Some(entry) = self.entries.get(key) else {
            return CollectionSnapshot::default();
        };
        let pages = match &entry.value {
            Some(CachedValue::FeedPages(pages)) => pages.clone(),
            _ => Vec::new(),
        };
        CollectionSnapshot {
            pages,
            fetching: entry.fetching,
            errored: entry.errored,
            stale: entry.stale,
        }
    }

    /// Comment pages plus fetch state for one comments key
    pub fn comments_snapshot(&self, key: &QueryKey) -> CollectionSnapshot<Comment> {
        let Some(entry) = self.entries.get(key) else {
            return CollectionSnapshot::default();
        };
        let pages = match &entry.value {
            Some(CachedValue::CommentPages(pages)) => pages.clone(),
            _ => Vec::new(),
        };
        CollectionSnapshot {
            pages,
            fetching: entry.fetching,
            errored: entry.errored,
            stale: entry.stale,
        }
    }

    /// Locate the freshest cached copy of a post for one viewer: the
    /// detail entry wins over feed-embedded copies
    pub fn find_post(&self, post_id: Uuid, viewer: ViewerKey) -> Option<Post> {
        let detail_key = QueryKey::Post { post_id, viewer };
        if let Some(entry) = self.entries.get(&detail_key) {
            if let Some(CachedValue::Post(post)) = &entry.value {
                return Some(post.as_ref().clone());
            }
        }

        for entry in self.entries.iter() {
            if entry.key().viewer() != viewer {
                continue;
            }
            if let Some(CachedValue::FeedPages(pages)) = &entry.value().value {
                for page in pages {
                    for item in &page.items {
                        if let FeedItem::Post(post) = item {
                            if post.id == post_id {
                                return Some(post.clone());
                            }
                        }
                    }
                }
            }
        }
        None
    }

    /// Locate a cached comment for one viewer
    pub fn find_comment(&self, comment_id: Uuid, viewer: ViewerKey) -> Option<Comment> {
        for entry in self.entries.iter() {
            if entry.key().viewer() != viewer {
                continue;
            }
            if let Some(CachedValue::CommentPages(pages)) = &entry.value().value {
                for page in pages {
                    if let Some(comment) = page.items.iter().find(|c| c.id == comment_id) {
                        return Some(comment.clone());
                    }
                }
            }
        }
        None
    }

    // ========== Fetch lifecycle ==========

    /// Claim the fetch slot for a key. Returns `None` when a fetch is
    /// already in flight for it.
    pub fn begin_fetch(&self, key: QueryKey) -> Option<FetchTicket> {
        let mut entry = self.entries.entry(key).or_default();
        if entry.fetching {
            return None;
        }
        entry.fetching = true;
        Some(FetchTicket {
            key,
            epoch: entry.epoch,
        })
    }

    /// Install a fetched post detail; dropped if the epoch moved on
    pub fn complete_post_fetch(&self, ticket: FetchTicket, post: Post) -> bool {
        self.complete(ticket, |entry| {
            entry.value = Some(CachedValue::Post(Arc::new(post)));
        })
    }

    /// Append a fetched feed page; dropped if the epoch moved on
    pub fn complete_feed_page(&self, ticket: FetchTicket, page: Page<FeedItem>) -> bool {
        self.complete(ticket, |entry| {
            let mut pages = match entry.value.take() {
                Some(CachedValue::FeedPages(pages)) => pages,
                _ => Vec::new(),
            };
            pages.push(Arc::new(page));
            entry.value = Some(CachedValue::FeedPages(pages));
        })
    }

    /// Append a fetched comment page; dropped if the epoch moved on
    pub fn complete_comment_page(&self, ticket: FetchTicket, page: Page<Comment>) -> bool {
        self.complete(ticket, |entry| {
            let mut pages = match entry.value.take() {
                Some(CachedValue::CommentPages(pages)) => pages,
                _ => Vec::new(),
            };
            pages.push(Arc::new(page));
            entry.value = Some(CachedValue::CommentPages(pages));
        })
    }

    fn complete(&self, ticket: FetchTicket, apply: impl FnOnce(&mut CacheEntry)) -> bool {
        let Some(mut entry) = self.entries.get_mut(&ticket.key) else {
            return false;
        };
        entry.fetching = false;
        if entry.epoch != ticket.epoch {
            self.metrics
                .record_dropped_stale_response(ticket.key.kind_label());
            debug!(key = ?ticket.key, "dropping stale fetch response");
            return false;
        }
        apply(&mut entry);
        entry.stale = false;
        entry.errored = false;
        true
    }

    /// Record a failed fetch; cached data is left untouched
    pub fn fail_fetch(&self, ticket: FetchTicket) {
        if let Some(mut entry) = self.entries.get_mut(&ticket.key) {
            entry.fetching = false;
            if entry.epoch == ticket.epoch {
                entry.errored = true;
            }
        }
    }

    // ========== Invalidation & cancellation ==========

    /// Mark matching entries stale so consumers refetch them
    pub fn invalidate(&self, prefix: KeyPrefix) -> usize {
        let mut marked = 0;
        for mut entry in self.entries.iter_mut() {
            if prefix.matches(entry.key()) && entry.value.is_some() {
                entry.stale = true;
                marked += 1;
            }
        }
        if marked > 0 {
            self.metrics.record_invalidations(marked);
            debug!(?prefix, marked, "invalidated cache entries");
        }
        marked
    }

    /// Bump the epoch of matching keys so in-flight fetch responses for
    /// them are dropped on arrival. Called before optimistic writes and on
    /// identity switches.
    pub fn cancel_in_flight(&self, prefix: KeyPrefix) -> usize {
        let mut cancelled = 0;
        for mut entry in self.entries.iter_mut() {
            if prefix.matches(entry.key()) {
                entry.epoch += 1;
                if entry.fetching {
                    cancelled += 1;
                }
            }
        }
        cancelled
    }

    /// Drop matching entries entirely (identity switch, sign-out)
    pub fn remove(&self, prefix: KeyPrefix) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !prefix.matches(key));
        before - self.entries.len()
    }

    // ========== Copy-on-write updates (fan-out primitives) ==========

    /// Replace every denormalized copy of a post with the transformed
    /// copy. Touches the detail entry and feed pages embedding the post;
    /// untouched pages keep their identity. The transform receives the
    /// viewer the entry was fetched for, since `has_liked` is
    /// viewer-relative. Returns locations rewritten.
    pub fn update_posts<F>(&self, post_id: Uuid, transform: F) -> usize
    where
        F: Fn(&Post, ViewerKey) -> Post,
    {
        let mut touched = 0;
        for mut entry in self.entries.iter_mut() {
            let viewer = entry.key().viewer();
            match &entry.value {
                Some(CachedValue::Post(post)) if post.id == post_id => {
                    let updated = Arc::new(transform(post, viewer));
                    entry.value = Some(CachedValue::Post(updated));
                    touched += 1;
                }
                Some(CachedValue::FeedPages(pages)) => {
                    if let Some(rewritten) = rewrite_feed_pages(pages, post_id, viewer, &transform)
                    {
                        entry.value = Some(CachedValue::FeedPages(rewritten));
                        touched += 1;
                    }
                }
                _ => {}
            }
        }
        touched
    }

    /// Replace every cached copy of a comment with the transformed copy
    pub fn update_comments<F>(&self, comment_id: Uuid, transform: F) -> usize
    where
        F: Fn(&Comment, ViewerKey) -> Comment,
    {
        let mut touched = 0;
        for mut entry in self.entries.iter_mut() {
            let viewer = entry.key().viewer();
            if let Some(CachedValue::CommentPages(pages)) = &entry.value {
                if let Some(rewritten) =
                    rewrite_comment_pages(pages, comment_id, viewer, &transform)
                {
                    entry.value = Some(CachedValue::CommentPages(rewritten));
                    touched += 1;
                }
            }
        }
        touched
    }

    /// Remove a post from every cached view: the detail entry, feed pages
    /// embedding it, and its comment lists
    pub fn remove_post_everywhere(&self, post_id: Uuid) -> usize {
        let mut touched = 0;

        self.entries.retain(|key, _| match key {
            QueryKey::Post { post_id: id, .. } | QueryKey::Comments { post_id: id, .. } => {
                if *id == post_id {
                    touched += 1;
                    false
                } else {
                    true
                }
            }
            QueryKey::Feed { .. } => true,
        });

        for mut entry in self.entries.iter_mut() {
            if let Some(CachedValue::FeedPages(pages)) = &entry.value {
                if let Some(filtered) = filter_feed_pages(pages, post_id) {
                    entry.value = Some(CachedValue::FeedPages(filtered));
                    touched += 1;
                }
            }
        }
        touched
    }

    /// Remove a comment from every cached comment list, returning one of
    /// the removed copies so callers can reverse the parent counters
    pub fn remove_comment_everywhere(&self, comment_id: Uuid) -> Option<Comment> {
        let mut removed = None;
        for mut entry in self.entries.iter_mut() {
            if let Some(CachedValue::CommentPages(pages)) = &entry.value {
                if let Some((filtered, comment)) = filter_comment_pages(pages, comment_id) {
                    entry.value = Some(CachedValue::CommentPages(filtered));
                    removed.get_or_insert(comment);
                }
            }
        }
        removed
    }

    /// Append a comment to a viewer's cached list for its post. Creates a
    /// stale single-page entry when nothing is cached yet, so the list
    /// still refetches from the server.
    pub fn append_comment(&self, viewer: ViewerKey, comment: Comment) {
        let key = QueryKey::Comments {
            post_id: comment.post_id,
            viewer,
        };
        let mut entry = self.entries.entry(key).or_default();
        match entry.value.take() {
            Some(CachedValue::CommentPages(pages)) => {
                let mut pages = pages;
                match pages.pop() {
                    Some(last) => {
                        let mut items = last.items.clone();
                        items.push(comment);
                        pages.push(Arc::new(Page {
                            items,
                            next_cursor: last.next_cursor.clone(),
                        }));
                    }
                    None => pages.push(Arc::new(Page {
                        items: vec![comment],
                        next_cursor: None,
                    })),
                }
                entry.value = Some(CachedValue::CommentPages(pages));
            }
            _ => {
                entry.value = Some(CachedValue::CommentPages(vec![Arc::new(Page {
                    items: vec![comment],
                    next_cursor: None,
                })]));
                entry.stale = true;
            }
        }
    }

    // ========== Snapshots for rollback ==========

    /// Capture the entries matching a predicate, as they are now. Cheap:
    /// pages are `Arc`-shared, not deep-copied.
    pub fn snapshot_where<P>(&self, pred: P) -> Vec<(QueryKey, CachedValue)>
    where
        P: Fn(&QueryKey, &CachedValue) -> bool,
    {
        self.entries
            .iter()
            .filter_map(|entry| {
                let value = entry.value().value.as_ref()?;
                pred(entry.key(), value).then(|| (*entry.key(), value.clone()))
            })
            .collect()
    }

    /// Put previously captured entry values back
    pub fn restore_entries(&self, snapshot: Vec<(QueryKey, CachedValue)>) {
        for (key, value) in snapshot {
            let mut entry = self.entries.entry(key).or_default();
            entry.value = Some(value);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

fn rewrite_feed_pages<F>(
    pages: &[Arc<Page<FeedItem>>],
    post_id: Uuid,
    viewer: ViewerKey,
    transform: &F,
) -> Option<Vec<Arc<Page<FeedItem>>>>
where
    F: Fn(&Post, ViewerKey) -> Post,
{
    let mut touched = false;
    let rewritten = pages
        .iter()
        .map(|page| {
            let hit = page.items.iter().any(|item| item.post_id() == Some(post_id));
            if !hit {
                return Arc::clone(page);
            }
            touched = true;
            let items = page
                .items
                .iter()
                .map(|item| match item {
                    FeedItem::Post(post) if post.id == post_id => {
                        FeedItem::Post(transform(post, viewer))
                    }
                    other => other.clone(),
                })
                .collect();
            Arc::new(Page {
                items,
                next_cursor: page.next_cursor.clone(),
            })
        })
        .collect();
    touched.then_some(rewritten)
}

fn rewrite_comment_pages<F>(
    pages: &[Arc<Page<Comment>>],
    comment_id: Uuid,
    viewer: ViewerKey,
    transform: &F,
) -> Option<Vec<Arc<Page<Comment>>>>
where
    F: Fn(&Comment, ViewerKey) -> Comment,
{
    let mut touched = false;
    let rewritten = pages
        .iter()
        .map(|page| {
            let hit = page.items.iter().any(|c| c.id == comment_id);
            if !hit {
                return Arc::clone(page);
            }
            touched = true;
            let items = page
                .items
                .iter()
                .map(|c| {
                    if c.id == comment_id {
                        transform(c, viewer)
                    } else {
                        c.clone()
                    }
                })
                .collect();
            Arc::new(Page {
                items,
                next_cursor: page.next_cursor.clone(),
            })
        })
        .collect();
    touched.then_some(rewritten)
}

fn filter_feed_pages(
    pages: &[Arc<Page<FeedItem>>],
    post_id: Uuid,
) -> Option<Vec<Arc<Page<FeedItem>>>> {
    let mut touched = false;
    let filtered = pages
        .iter()
        .map(|page| {
            let hit = page.items.iter().any(|item| item.post_id() == Some(post_id));
            if !hit {
                return Arc::clone(page);
            }
            touched = true;
            let items = page
                .items
                .iter()
                .filter(|item| item.post_id() != Some(post_id))
                .cloned()
                .collect();
            Arc::new(Page {
                items,
                next_cursor: page.next_cursor.clone(),
            })
        })
        .collect();
    touched.then_some(filtered)
}

fn filter_comment_pages(
    pages: &[Arc<Page<Comment>>],
    comment_id: Uuid,
) -> Option<(Vec<Arc<Page<Comment>>>, Comment)> {
    let mut removed = None;
    let filtered = pages
        .iter()
        .map(|page| {
            let hit = page.items.iter().any(|c| c.id == comment_id);
            if !hit {
                return Arc::clone(page);
            }
            let items = page
                .items
                .iter()
                .filter(|c| {
                    if c.id == comment_id {
                        removed.get_or_insert_with(|| (*c).clone());
                        false
                    } else {
                        true
                    }
                })
                .cloned()
                .collect();
            Arc::new(Page {
                items,
                next_cursor: page.next_cursor.clone(),
            })
        })
        .collect();
    removed.map(|comment| (filtered, comment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{comment_on, feed_page, post_with, viewer_key};
    use api_types::FeedScope;

    fn feed_key(viewer: ViewerKey) -> QueryKey {
        QueryKey::Feed {
            scope: FeedScope::Home,
            viewer,
        }
    }

    #[test]
    fn test_fetch_lifecycle_appends_pages() {
        let cache = QueryCache::new();
        let viewer = viewer_key();
        let key = feed_key(viewer);

        let ticket = cache.begin_fetch(key).expect("slot free");
        assert!(cache.begin_fetch(key).is_none(), "second fetch must wait");

        let page = feed_page(vec![post_with(5, false)], Some("next"));
        assert!(cache.complete_feed_page(ticket, page));

        let snapshot = cache.feed_snapshot(&key);
        assert_eq!(snapshot.pages.len(), 1);
        assert_eq!(snapshot.next_cursor(), Some("next"));
        assert!(!snapshot.exhausted());
        assert!(cache.begin_fetch(key).is_some(), "slot released");
    }

    #[test]
    fn test_cancelled_fetch_response_is_dropped() {
        let cache = QueryCache::new();
        let viewer = viewer_key();
        let key = feed_key(viewer);

        let ticket = cache.begin_fetch(key).unwrap();
        cache.cancel_in_flight(KeyPrefix::Feeds);

        let page = feed_page(vec![post_with(5, false)], None);
        assert!(!cache.complete_feed_page(ticket, page), "stale response");
        assert!(cache.feed_snapshot(&key).pages.is_empty());
    }

    #[test]
    fn test_update_posts_fans_out_and_preserves_untouched_pages() {
        let cache = QueryCache::new();
        let viewer = viewer_key();
        let key = feed_key(viewer);

        let target = post_with(5, false);
        let other = post_with(1, false);
        let target_id = target.id;

        let t1 = cache.begin_fetch(key).unwrap();
        cache.complete_feed_page(t1, feed_page(vec![target.clone()], Some("a")));
        let t2 = cache.begin_fetch(key).unwrap();
        cache.complete_feed_page(t2, feed_page(vec![other.clone()], None));

        let detail = QueryKey::Post {
            post_id: target_id,
            viewer,
        };
        let t3 = cache.begin_fetch(detail).unwrap();
        cache.complete_post_fetch(t3, target.clone());

        let before = cache.feed_snapshot(&key);
        let touched = cache.update_posts(target_id, |p, _| {
            let mut p = p.clone();
            p.like_count += 1;
            p.has_liked = true;
            p
        });
        assert_eq!(touched, 2, "feed entry and detail entry");

        let after = cache.feed_snapshot(&key);
        // Touched page rebuilt, untouched page identical by pointer.
        assert!(!Arc::ptr_eq(&before.pages[0], &after.pages[0]));
        assert!(Arc::ptr_eq(&before.pages[1], &after.pages[1]));

        let updated = cache.find_post(target_id, viewer).unwrap();
        assert_eq!(updated.like_count, 6);
        assert!(updated.has_liked);
        // The other post is untouched.
        assert_eq!(cache.find_post(other.id, viewer).unwrap().like_count, 1);
    }

    #[test]
    fn test_snapshot_and_restore_round_trip() {
        let cache = QueryCache::new();
        let viewer = viewer_key();
        let key = feed_key(viewer);
        let post = post_with(5, false);
        let post_id = post.id;

        let t = cache.begin_fetch(key).unwrap();
        cache.complete_feed_page(t, feed_page(vec![post], None));

        let snapshot = cache.snapshot_where(|_, value| value.contains_post(post_id));
        assert_eq!(snapshot.len(), 1);

        cache.update_posts(post_id, |p, _| {
            let mut p = p.clone();
            p.like_count = 99;
            p
        });
        assert_eq!(cache.find_post(post_id, viewer).unwrap().like_count, 99);

        cache.restore_entries(snapshot);
        assert_eq!(cache.find_post(post_id, viewer).unwrap().like_count, 5);
    }

    #[test]
    fn test_remove_post_everywhere() {
        let cache = QueryCache::new();
        let viewer = viewer_key();
        let key = feed_key(viewer);
        let post = post_with(2, true);
        let post_id = post.id;

        let t = cache.begin_fetch(key).unwrap();
        cache.complete_feed_page(t, feed_page(vec![post.clone(), post_with(0, false)], None));

        let detail = QueryKey::Post { post_id, viewer };
        let t = cache.begin_fetch(detail).unwrap();
        cache.complete_post_fetch(t, post);

        let comments = QueryKey::Comments { post_id, viewer };
        let t = cache.begin_fetch(comments).unwrap();
        cache.complete_comment_page(
            t,
            Page {
                items: vec![comment_on(post_id, None)],
                next_cursor: None,
            },
        );

        let touched = cache.remove_post_everywhere(post_id);
        assert_eq!(touched, 3);
        assert!(cache.find_post(post_id, viewer).is_none());
        assert!(cache.comments_snapshot(&comments).pages.is_empty());
        // The unrelated post is still in the feed.
        assert_eq!(cache.feed_snapshot(&key).pages[0].items.len(), 1);
    }

    #[test]
    fn test_remove_comment_returns_removed_copy() {
        let cache = QueryCache::new();
        let viewer = viewer_key();
        let post_id = Uuid::new_v4();
        let comment = comment_on(post_id, None);
        let comment_id = comment.id;

        let key = QueryKey::Comments { post_id, viewer };
        let t = cache.begin_fetch(key).unwrap();
        cache.complete_comment_page(
            t,
            Page {
                items: vec![comment, comment_on(post_id, None)],
                next_cursor: None,
            },
        );

        let removed = cache.remove_comment_everywhere(comment_id).unwrap();
        assert_eq!(removed.id, comment_id);
        assert_eq!(cache.comments_snapshot(&key).pages[0].items.len(), 1);
        assert!(cache.remove_comment_everywhere(comment_id).is_none());
    }

    #[test]
    fn test_invalidate_marks_stale_without_dropping_data() {
        let cache = QueryCache::new();
        let viewer = viewer_key();
        let key = feed_key(viewer);
        let t = cache.begin_fetch(key).unwrap();
        cache.complete_feed_page(t, feed_page(vec![post_with(1, false)], None));

        assert_eq!(cache.invalidate(KeyPrefix::Viewer(viewer)), 1);
        assert!(cache.is_stale(&key));
        assert!(cache.get(&key).is_some(), "stale data still readable");
    }

    #[test]
    fn test_remove_by_viewer_prefix() {
        let cache = QueryCache::new();
        let a = viewer_key();
        let b = viewer_key();
        for viewer in [a, b] {
            let t = cache.begin_fetch(feed_key(viewer)).unwrap();
            cache.complete_feed_page(t, feed_page(vec![post_with(1, false)], None));
        }

        assert_eq!(cache.remove(KeyPrefix::Viewer(a)), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&feed_key(b)).is_some());
    }
}
