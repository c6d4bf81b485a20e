//! Memoizing store for fetched revision-history entries.
//!
//! Pure data: the fetch step is the only writer, and entries are never
//! mutated once inserted. Per remote path the entries are kept ordered by
//! revision, so the most recent entry is the last element.

use std::collections::HashMap;

use crate::models::LogEntry;
use crate::revision::Revision;

/// Revision-history entries keyed by remote path, ordered by revision.
#[derive(Debug, Default)]
pub struct LogEntryCache {
    entries: HashMap<String, Vec<LogEntry>>,
}

impl LogEntryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one entry, keeping the per-path list revision-ordered. An
    /// entry for an already-known revision replaces the old one.
    pub fn insert(&mut self, path: impl Into<String>, entry: LogEntry) {
        let list = self.entries.entry(path.into()).or_default();
        match list.binary_search_by(|e| e.revision.cmp(&entry.revision)) {
            Ok(i) => list[i] = entry,
            Err(i) => list.insert(i, entry),
        }
    }

    /// Insert a batch of entries for one path.
    pub fn insert_all(&mut self, path: impl Into<String>, entries: Vec<LogEntry>) {
        let path = path.into();
        for entry in entries {
            self.insert(path.clone(), entry);
        }
    }

    /// All known entries for a path, oldest first. Empty if unknown.
    pub fn entries(&self, path: &str) -> &[LogEntry] {
        self.entries.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The entry at an exact revision, if cached.
    pub fn entry_at(&self, path: &str, revision: &Revision) -> Option<&LogEntry> {
        let list = self.entries.get(path)?;
        list.binary_search_by(|e| e.revision.cmp(revision))
            .ok()
            .map(|i| &list[i])
    }

    /// The most recent known entry for a path.
    pub fn latest(&self, path: &str) -> Option<&LogEntry> {
        self.entries.get(path).and_then(|list| list.last())
    }

    /// Absorb another cache, typically a completed batch's staging cache.
    pub fn merge(&mut self, other: LogEntryCache) {
        for (path, entries) in other.entries {
            self.insert_all(path, entries);
        }
    }

    /// Number of remote paths with cached history.
    pub fn resource_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry(rev: &str, comment: &str, is_deletion: bool) -> LogEntry {
        LogEntry {
            revision: rev.parse().unwrap(),
            author: "alice".to_string(),
            date: Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap(),
            comment: comment.to_string(),
            is_deletion,
        }
    }

    #[test]
    fn test_entries_kept_ordered() {
        let mut cache = LogEntryCache::new();
        cache.insert("repo/a.rs", entry("1.4", "later", false));
        cache.insert("repo/a.rs", entry("1.2", "earlier", false));
        cache.insert("repo/a.rs", entry("1.10", "latest", false));
        let revisions: Vec<String> = cache
            .entries("repo/a.rs")
            .iter()
            .map(|e| e.revision.to_string())
            .collect();
        assert_eq!(revisions, ["1.2", "1.4", "1.10"]);
    }

    #[test]
    fn test_latest_is_last() {
        let mut cache = LogEntryCache::new();
        cache.insert("repo/a.rs", entry("1.9", "older", false));
        cache.insert("repo/a.rs", entry("1.10", "newest", false));
        assert_eq!(cache.latest("repo/a.rs").unwrap().comment, "newest");
        assert!(cache.latest("repo/unknown.rs").is_none());
    }

    #[test]
    fn test_entry_at_exact_revision() {
        let mut cache = LogEntryCache::new();
        cache.insert("repo/a.rs", entry("1.2", "two", false));
        cache.insert("repo/a.rs", entry("1.4", "four", true));
        let rev = "1.4".parse().unwrap();
        assert_eq!(cache.entry_at("repo/a.rs", &rev).unwrap().comment, "four");
        let missing = "1.3".parse().unwrap();
        assert!(cache.entry_at("repo/a.rs", &missing).is_none());
    }

    #[test]
    fn test_reinsert_replaces() {
        let mut cache = LogEntryCache::new();
        cache.insert("repo/a.rs", entry("1.2", "first wording", false));
        cache.insert("repo/a.rs", entry("1.2", "amended wording", false));
        assert_eq!(cache.entries("repo/a.rs").len(), 1);
        assert_eq!(
            cache.entries("repo/a.rs")[0].comment,
            "amended wording"
        );
    }

    #[test]
    fn test_merge_and_clear() {
        let mut cache = LogEntryCache::new();
        cache.insert("repo/a.rs", entry("1.1", "a", false));

        let mut staging = LogEntryCache::new();
        staging.insert("repo/a.rs", entry("1.2", "b", false));
        staging.insert("repo/b.rs", entry("1.1", "c", false));

        cache.merge(staging);
        assert_eq!(cache.resource_count(), 2);
        assert_eq!(cache.entries("repo/a.rs").len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }
}
