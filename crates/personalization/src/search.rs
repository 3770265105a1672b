//! Search history: case-insensitively deduplicated, capped, expiring.

use crate::EXPIRY_DAYS;
use pwx_core::time::now_ms;
use pwx_storage::LocalStore;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

const SEARCH_KEY: &str = "searches";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHistoryEntry {
    pub query: String,
    pub timestamp: u64,
}

pub struct SearchTracker {
    store: Rc<LocalStore>,
    min_length: usize,
    limit: usize,
}

impl SearchTracker {
    pub fn new(store: Rc<LocalStore>, min_length: usize, limit: usize) -> Self {
        Self {
            store,
            min_length,
            limit: limit.max(1),
        }
    }

    /// Record a query. Too-short queries are dropped; a repeat of an
    /// earlier query (case-insensitively) moves to the front instead of
    /// duplicating. Returns whether the query was recorded.
    pub fn track_search(&self, query: &str) -> bool {
        let query = query.trim();
        if query.chars().count() < self.min_length {
            return false;
        }

        let mut history = self.load();
        let lowered = query.to_lowercase();
        history.retain(|e| e.query.to_lowercase() != lowered);
        history.insert(
            0,
            SearchHistoryEntry {
                query: query.to_string(),
                timestamp: now_ms(),
            },
        );
        history.truncate(self.limit);
        self.store
            .set_serialize(SEARCH_KEY, &history, Some(EXPIRY_DAYS));
        true
    }

    /// Most recent first.
    pub fn recent(&self, limit: usize) -> Vec<SearchHistoryEntry> {
        let mut history = self.load();
        history.truncate(limit);
        history
    }

    pub fn clear(&self) {
        self.store.remove(SEARCH_KEY);
    }

    fn load(&self) -> Vec<SearchHistoryEntry> {
        self.store.get_as(SEARCH_KEY).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwx_storage::MemoryBackend;

    fn tracker(min: usize, limit: usize) -> SearchTracker {
        let store = Rc::new(LocalStore::new(Rc::new(MemoryBackend::new()), "pwx"));
        SearchTracker::new(store, min, limit)
    }

    #[test]
    fn short_queries_are_rejected() {
        let tracker = tracker(3, 10);
        assert!(!tracker.track_search("ab"));
        assert!(!tracker.track_search("  a  "));
        assert!(tracker.track_search("abc"));
        assert_eq!(tracker.recent(10).len(), 1);
    }

    #[test]
    fn dedupe_is_case_insensitive_and_keeps_latest_spelling() {
        let tracker = tracker(2, 10);
        tracker.track_search("Shoes");
        tracker.track_search("boots");
        tracker.track_search("SHOES");

        let queries: Vec<_> = tracker.recent(10).into_iter().map(|e| e.query).collect();
        assert_eq!(queries, vec!["SHOES", "boots"]);
    }

    #[test]
    fn history_is_capped() {
        let tracker = tracker(1, 2);
        tracker.track_search("one");
        tracker.track_search("two");
        tracker.track_search("three");
        let queries: Vec<_> = tracker.recent(10).into_iter().map(|e| e.query).collect();
        assert_eq!(queries, vec!["three", "two"]);
    }

    #[test]
    fn queries_are_trimmed_before_storing() {
        let tracker = tracker(2, 10);
        tracker.track_search("  winter coat  ");
        assert_eq!(tracker.recent(1)[0].query, "winter coat");
    }
}
