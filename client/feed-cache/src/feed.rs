//! Feed assembler: fetched pages in, one display list out
//!
//! The server merges several sources (connections, trending) into a single
//! cursor stream, so a post can legitimately appear on more than one page.
//! Assembly concatenates pages in fetch order and drops repeat posts,
//! first occurrence wins. Suggestion cards are not posts and pass through
//! untouched, keeping their position.

use std::collections::HashSet;
use std::sync::Arc;

use api_types::{Comment, FeedItem, Page};

use crate::store::CollectionSnapshot;

/// Where a feed is in its fetch lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    /// No page has arrived yet
    Loading,
    /// The last fetch failed before any page arrived
    Errored,
    /// At least one page fetched successfully
    Loaded,
}

/// The merged, deduplicated display list for one feed
#[derive(Debug, Clone)]
pub struct AssembledFeed {
    pub items: Vec<FeedItem>,
    pub has_next_page: bool,
    pub phase: FeedPhase,
}

impl AssembledFeed {
    /// Merge a snapshot's pages into a display list. Re-running on the
    /// same snapshot yields the same output: dedup is idempotent.
    pub fn assemble(snapshot: &CollectionSnapshot<FeedItem>) -> Self {
        let mut seen_posts = HashSet::new();
        let mut items = Vec::new();

        for page in &snapshot.pages {
            for item in &page.items {
                match item.post_id() {
                    Some(post_id) => {
                        if seen_posts.insert(post_id) {
                            items.push(item.clone());
                        }
                    }
                    // Non-post items are exempt from identity dedup.
                    None => items.push(item.clone()),
                }
            }
        }

        let phase = if snapshot.loaded() {
            FeedPhase::Loaded
        } else if snapshot.errored {
            FeedPhase::Errored
        } else {
            FeedPhase::Loading
        };

        Self {
            items,
            has_next_page: !snapshot.exhausted(),
            phase,
        }
    }

    /// True only when a fetch completed successfully and produced zero
    /// items; distinct from still-loading and from errored
    pub fn is_empty(&self) -> bool {
        self.phase == FeedPhase::Loaded && self.items.is_empty()
    }
}

/// Whether the next page should be requested now: there must be more
/// content to fetch, no fetch may already be in flight, and the consumer
/// must have signalled need (scroll position, visibility). Never true
/// once the collection is exhausted.
pub fn should_fetch_next<T>(snapshot: &CollectionSnapshot<T>, consumer_needs_more: bool) -> bool {
    if !consumer_needs_more || snapshot.fetching || snapshot.exhausted() {
        return false;
    }
    !snapshot.loaded() || snapshot.next_cursor().is_some()
}

/// Flatten comment pages in fetch order
pub fn concat_comments(pages: &[Arc<Page<Comment>>]) -> Vec<Comment> {
    pages
        .iter()
        .flat_map(|page| page.items.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{feed_page, post_with, suggestion_card, viewer_key};
    use crate::store::{QueryCache, QueryKey};
    use api_types::FeedScope;

    fn snapshot_of(pages: Vec<Page<FeedItem>>) -> CollectionSnapshot<FeedItem> {
        let cache = QueryCache::new();
        let key = QueryKey::Feed {
            scope: FeedScope::Home,
            viewer: viewer_key(),
        };
        for page in pages {
            let ticket = cache.begin_fetch(key).unwrap();
            cache.complete_feed_page(ticket, page);
        }
        cache.feed_snapshot(&key)
    }

    #[test]
    fn test_duplicate_posts_collapse_first_occurrence_wins() {
        let a = post_with(1, false);
        let b = post_with(2, false);
        let c = post_with(3, false);
        let c_dup = c.clone();
        let d = post_with(4, false);

        // Page 1: [A, B, C], page 2: [C, D] with overlap on C.
        let snapshot = snapshot_of(vec![
            feed_page(vec![a.clone(), b.clone(), c], Some("x")),
            feed_page(vec![c_dup, d.clone()], None),
        ]);

        let feed = AssembledFeed::assemble(&snapshot);
        let ids: Vec<_> = feed.items.iter().filter_map(|i| i.post_id()).collect();
        assert_eq!(ids.len(), 4);
        assert_eq!(ids[0], a.id);
        assert_eq!(ids[3], d.id);
        assert!(!feed.has_next_page);
    }

    #[test]
    fn test_assembly_is_idempotent() {
        let a = post_with(1, false);
        let snapshot = snapshot_of(vec![
            feed_page(vec![a.clone(), a.clone()], Some("x")),
            feed_page(vec![a], None),
        ]);

        let first = AssembledFeed::assemble(&snapshot);
        let second = AssembledFeed::assemble(&snapshot);
        assert_eq!(first.items.len(), 1);
        assert_eq!(first.items, second.items);
    }

    #[test]
    fn test_suggestion_cards_pass_through_positionally_stable() {
        let a = post_with(1, false);
        let card = suggestion_card();
        let b = post_with(2, false);

        let mut page = feed_page(vec![a, b], None);
        page.items.insert(1, card.clone());
        let snapshot = snapshot_of(vec![page]);

        let feed = AssembledFeed::assemble(&snapshot);
        assert_eq!(feed.items.len(), 3);
        assert_eq!(feed.items[1], card);
    }

    #[test]
    fn test_is_empty_requires_successful_fetch() {
        let loading = CollectionSnapshot::<FeedItem>::default();
        assert!(!AssembledFeed::assemble(&loading).is_empty());

        let errored = CollectionSnapshot::<FeedItem> {
            errored: true,
            ..Default::default()
        };
        let assembled = AssembledFeed::assemble(&errored);
        assert_eq!(assembled.phase, FeedPhase::Errored);
        assert!(!assembled.is_empty());

        let empty_loaded = snapshot_of(vec![feed_page(vec![], None)]);
        assert!(AssembledFeed::assemble(&empty_loaded).is_empty());
    }

    #[test]
    fn test_next_page_gating() {
        // Nothing fetched yet: initial load allowed on demand.
        let fresh = CollectionSnapshot::<FeedItem>::default();
        assert!(should_fetch_next(&fresh, true));
        assert!(!should_fetch_next(&fresh, false));

        // Fetch in flight: never.
        let in_flight = CollectionSnapshot::<FeedItem> {
            fetching: true,
            ..Default::default()
        };
        assert!(!should_fetch_next(&in_flight, true));

        // Cursor present: allowed.
        let more = snapshot_of(vec![feed_page(vec![post_with(1, false)], Some("x"))]);
        assert!(should_fetch_next(&more, true));

        // Exhausted: never again.
        let done = snapshot_of(vec![feed_page(vec![post_with(1, false)], None)]);
        assert!(!should_fetch_next(&done, true));
    }
}
