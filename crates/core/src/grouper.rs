//! Assignment of comparison results into comment-keyed change sets.
//!
//! The grouper is a pure planner: it reads the log-entry cache and emits
//! [`ChangeSetOp`]s describing set membership. Applying the ops against the
//! externally visible registry happens on the delivery context, never here.

use tracing::debug;

use crate::cache::LogEntryCache;
use crate::classify::is_remote_change;
use crate::config::EngineConfig;
use crate::models::{
    ChangeSetSeed, ChangeType, ComparisonResult, Direction, LogEntry, RemoteRef,
};
use crate::revision::canonical_remote;
use crate::workspace::WorkspaceMetadata;

// ---------------------------------------------------------------------------
// Ops
// ---------------------------------------------------------------------------

/// One membership assignment produced by a grouping pass.
#[derive(Debug, Clone)]
pub enum ChangeSetOp {
    /// Place `result` into the set identified by `seed.comment`, creating
    /// the set from the seed on first use.
    Assign {
        seed: ChangeSetSeed,
        result: ComparisonResult,
    },
    /// Place `result` into the reserved unassigned set, creating it on
    /// first use.
    AssignToDefault { result: ComparisonResult },
}

// ---------------------------------------------------------------------------
// Grouper
// ---------------------------------------------------------------------------

/// Maps eligible comparison results to cached log entries and plans their
/// change-set membership.
pub struct ChangeSetGrouper<'a> {
    cache: &'a LogEntryCache,
    metadata: &'a dyn WorkspaceMetadata,
    config: &'a EngineConfig,
    /// True when comparing against explicit tags rather than live state.
    tag_comparison: bool,
}

impl<'a> ChangeSetGrouper<'a> {
    pub fn new(
        cache: &'a LogEntryCache,
        metadata: &'a dyn WorkspaceMetadata,
        config: &'a EngineConfig,
        tag_comparison: bool,
    ) -> Self {
        Self {
            cache,
            metadata,
            config,
            tag_comparison,
        }
    }

    /// Plan membership for a batch of results.
    pub fn group(&self, results: &[ComparisonResult]) -> Vec<ChangeSetOp> {
        let mut ops = Vec::new();
        for result in results {
            self.group_one(result, &mut ops);
        }
        debug!(
            results = results.len(),
            ops = ops.len(),
            "planned change-set assignments"
        );
        ops
    }

    fn group_one(&self, result: &ComparisonResult, ops: &mut Vec<ChangeSetOp>) {
        let canonical = canonical_remote(result, self.metadata);
        match canonical {
            Some(canonical) if self.tag_comparison => {
                // Tag ranges fan out: one membership per revision in range,
                // each potentially in a different set.
                let entries = self.cache.entries(&canonical.path);
                if entries.is_empty() {
                    self.assign(result, None, None, ops);
                } else {
                    for entry in entries {
                        self.assign(result, Some(&canonical), Some(entry), ops);
                    }
                }
            }
            Some(canonical) => {
                let entry = self.single_revision_entry(result, &canonical);
                self.assign(result, Some(&canonical), entry, ops);
            }
            None => self.assign(result, None, None, ops),
        }
    }

    /// Select the single log entry for an incremental comparison.
    ///
    /// Normally the entry at the canonical remote's revision. For files
    /// deleted remotely the interesting comment belongs to the deletion
    /// revision in the attic, which the current-remote pointer no longer
    /// carries: scan for the latest deletion entry strictly later than the
    /// canonical revision. Any trouble in that scan keeps whatever entry
    /// was already selected.
    fn single_revision_entry(
        &self,
        result: &ComparisonResult,
        canonical: &RemoteRef,
    ) -> Option<&'a LogEntry> {
        let mut selected = match canonical.parsed_revision() {
            Some(revision) => self.cache.entry_at(&canonical.path, &revision),
            None => self.cache.latest(&canonical.path),
        };
        if is_deleted_remotely(result) {
            if let Some(canonical_revision) = canonical.parsed_revision() {
                for entry in self.cache.entries(&canonical.path) {
                    if entry.is_deletion && entry.revision.is_later_than(&canonical_revision) {
                        selected = Some(entry);
                    }
                }
            }
        }
        selected
    }

    /// Route one (result, entry) pairing to a set or to the default set.
    fn assign(
        &self,
        result: &ComparisonResult,
        canonical: Option<&RemoteRef>,
        entry: Option<&LogEntry>,
        ops: &mut Vec<ChangeSetOp>,
    ) {
        if let (Some(canonical), Some(entry)) = (canonical, entry) {
            if is_remote_change(result, self.metadata) {
                let seed = ChangeSetSeed::from_entry(entry, &self.config.name_date_format);
                let entry_remote =
                    RemoteRef::new(canonical.path.clone(), entry.revision.to_string());
                let assigned = if requires_derived(result, &entry_remote, entry) {
                    result.with_remote(entry_remote)
                } else {
                    result.clone()
                };
                ops.push(ChangeSetOp::Assign {
                    seed,
                    result: assigned,
                });
                return;
            }
        }
        // No remote resource or log entry could be resolved for this
        // change, or it stopped qualifying: it goes to the default set.
        debug!(
            path = %result.local.path,
            "no log entry resolved, routing to unassigned set"
        );
        ops.push(ChangeSetOp::AssignToDefault {
            result: result.clone(),
        });
    }
}

/// True when the remote side of this result is a deletion: either an
/// incoming deletion, or a conflict with no remote state left.
fn is_deleted_remotely(result: &ComparisonResult) -> bool {
    if result.direction == Direction::Incoming && result.change == ChangeType::Deletion {
        return true;
    }
    result.direction == Direction::Conflicting && result.remote.is_none()
}

/// A derived result is needed when the selected entry's remote differs
/// from what the result itself points at; the derived copy shows the more
/// authoritative content while keeping the displayed kind stable.
/// Deletions are left alone.
fn requires_derived(result: &ComparisonResult, entry_remote: &RemoteRef, entry: &LogEntry) -> bool {
    if entry.is_deletion {
        return false;
    }
    match &result.remote {
        None => true,
        Some(remote) => remote != entry_remote,
    }
}
