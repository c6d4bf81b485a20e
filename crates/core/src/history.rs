//! Remote history retrieval.
//!
//! [`HistoryProvider`] is the only network boundary in the crate; the
//! embedding application implements it against a real repository
//! connection. [`LogFetcher`] batches one combined request per fetch pass
//! and stages the results so a cancelled batch never leaks partial state
//! into the visible cache.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::LogEntryCache;
use crate::errors::{EngineError, HistoryError};
use crate::models::{ComparisonResult, LogEntry, RemoteRef};
use crate::revision::canonical_remote;
use crate::workspace::{Tag, WorkspaceMetadata};

// ---------------------------------------------------------------------------
// Provider boundary
// ---------------------------------------------------------------------------

/// The revision history fetched for one remote resource.
#[derive(Debug, Clone)]
pub struct RemoteHistory {
    pub path: String,
    pub entries: Vec<LogEntry>,
}

/// Remote history retrieval, implemented by the embedding application.
///
/// A single call covers a whole batch of resources. `local_tag` and
/// `remote_tag` bound the revision range for tag comparisons; head tags
/// and `None` mean no filter on that side.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn fetch_history(
        &self,
        remotes: &[RemoteRef],
        local_tag: Option<&Tag>,
        remote_tag: Option<&Tag>,
    ) -> Result<Vec<RemoteHistory>, HistoryError>;
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Performs batched history fetches into a staging cache.
pub struct LogFetcher {
    provider: Arc<dyn HistoryProvider>,
}

impl LogFetcher {
    pub fn new(provider: Arc<dyn HistoryProvider>) -> Self {
        Self { provider }
    }

    /// Fetch history for every file result whose canonical remote can be
    /// resolved, writing entries into `staging`.
    ///
    /// Resolution failures just drop the affected resource from the
    /// request. When nothing resolves, no network call is made at all.
    /// The request is raced against `cancel`; cancellation surfaces as
    /// [`EngineError::Cancelled`] and leaves `staging` untouched by the
    /// aborted call.
    pub async fn fetch(
        &self,
        results: &[&ComparisonResult],
        local_tag: Option<&Tag>,
        remote_tag: Option<&Tag>,
        staging: &mut LogEntryCache,
        metadata: &dyn WorkspaceMetadata,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let mut remotes = Vec::new();
        for result in results {
            if !result.local.is_file() {
                continue;
            }
            if let Some(remote) = canonical_remote(result, metadata) {
                remotes.push(remote);
            }
        }

        if remotes.is_empty() {
            debug!("no resolvable remotes in batch, skipping history fetch");
            return Ok(());
        }

        debug!(
            count = remotes.len(),
            local_tag = local_tag.map(|t| t.name.as_str()),
            remote_tag = remote_tag.map(|t| t.name.as_str()),
            "fetching revision history"
        );

        // Biased select: a pending cancellation always wins over the fetch.
        let histories = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            fetched = self.provider.fetch_history(&remotes, local_tag, remote_tag) => fetched?,
        };

        let mut total = 0;
        for history in histories {
            total += history.entries.len();
            staging.insert_all(history.path, history.entries);
        }
        debug!(entries = total, "history fetch complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{TimeZone, Utc};

    use crate::errors::MetadataError;
    use crate::models::{ChangeType, ComparatorMode, Direction, LocalResource};
    use crate::workspace::SyncMarker;

    struct PlainWorkspace;

    impl WorkspaceMetadata for PlainWorkspace {
        fn sync_marker(&self, _path: &str) -> Result<Option<SyncMarker>, MetadataError> {
            Ok(None)
        }
        fn nearest_tag(&self, _path: &str) -> Result<Option<Tag>, MetadataError> {
            Ok(None)
        }
        fn checked_out_tag(&self, _path: &str, _branch: &Tag) -> Result<Option<Tag>, MetadataError> {
            Ok(None)
        }
        fn remote_for_local(&self, _path: &str) -> Result<Option<RemoteRef>, MetadataError> {
            Ok(None)
        }
    }

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HistoryProvider for CountingProvider {
        async fn fetch_history(
            &self,
            remotes: &[RemoteRef],
            _local_tag: Option<&Tag>,
            _remote_tag: Option<&Tag>,
        ) -> Result<Vec<RemoteHistory>, HistoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(remotes
                .iter()
                .map(|r| RemoteHistory {
                    path: r.path.clone(),
                    entries: vec![LogEntry {
                        revision: "1.1".parse().unwrap(),
                        author: "alice".to_string(),
                        date: Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap(),
                        comment: "initial".to_string(),
                        is_deletion: false,
                    }],
                })
                .collect())
        }
    }

    fn file_result(path: &str, remote: Option<RemoteRef>) -> ComparisonResult {
        ComparisonResult {
            local: LocalResource::file(path),
            base: None,
            remote,
            direction: Direction::Incoming,
            change: ChangeType::Change,
            mode: ComparatorMode::ThreeWay,
        }
    }

    #[tokio::test]
    async fn test_empty_resolved_set_skips_network() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let fetcher = LogFetcher::new(provider.clone());
        let mut staging = LogEntryCache::new();

        // No remote and no recorded metadata resolves nothing.
        let r = file_result("a.rs", None);
        fetcher
            .fetch(
                &[&r],
                None,
                None,
                &mut staging,
                &PlainWorkspace,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(staging.is_empty());
    }

    #[tokio::test]
    async fn test_single_combined_request_populates_staging() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let fetcher = LogFetcher::new(provider.clone());
        let mut staging = LogEntryCache::new();

        let a = file_result("a.rs", Some(RemoteRef::new("repo/a.rs", "1.1")));
        let b = file_result("b.rs", Some(RemoteRef::new("repo/b.rs", "1.1")));
        let folder = ComparisonResult {
            local: LocalResource::folder("src"),
            ..a.clone()
        };
        fetcher
            .fetch(
                &[&a, &b, &folder],
                None,
                None,
                &mut staging,
                &PlainWorkspace,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(staging.resource_count(), 2);
        assert_eq!(staging.entries("repo/a.rs").len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_before_fetch() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let fetcher = LogFetcher::new(provider.clone());
        let mut staging = LogEntryCache::new();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let a = file_result("a.rs", Some(RemoteRef::new("repo/a.rs", "1.1")));
        let err = fetcher
            .fetch(&[&a], None, None, &mut staging, &PlainWorkspace, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert!(staging.is_empty());
    }
}
