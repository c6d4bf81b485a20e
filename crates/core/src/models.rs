//! Domain model types for workspace reconciliation and change-set grouping.
//!
//! A [`ComparisonResult`] is one local/remote/base triple with its classified
//! change kind, produced per batch by the reconciliation layer. A
//! [`ChangeSet`] is a named group of results sharing a resolved commit
//! comment. Both are consumed by the grouping engine and the external
//! registry; neither is mutated after construction except through the
//! documented [`ComparisonResult::with_remote`] derivation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::revision::Revision;

/// Name of the reserved set holding results without a resolved comment.
pub const UNASSIGNED_NAME: &str = "[Unassigned]";

/// Comment of the reserved unassigned set.
pub const UNASSIGNED_COMMENT: &str = "Unassigned";

// ---------------------------------------------------------------------------
// Local resources
// ---------------------------------------------------------------------------

/// Whether a workspace resource is a file or a folder.
///
/// Resolved once when the comparison result is built; grouping only ever
/// considers files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    File,
    Folder,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Folder => write!(f, "folder"),
        }
    }
}

/// A resource in the local workspace, identified by its workspace-relative
/// path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalResource {
    pub path: String,
    pub kind: ResourceKind,
}

impl LocalResource {
    /// A file resource.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ResourceKind::File,
        }
    }

    /// A folder resource.
    pub fn folder(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ResourceKind::Folder,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == ResourceKind::File
    }
}

// ---------------------------------------------------------------------------
// Remote references
// ---------------------------------------------------------------------------

/// A reference to a remote file state: repository path plus the revision
/// string it was seen at.
///
/// The revision is kept as the raw string from the server or from local
/// metadata; it may be absent (a remote folder handle, a dead revision) or
/// fail to parse. Canonical-reference selection copes with both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteRef {
    pub path: String,
    pub revision: Option<String>,
}

impl RemoteRef {
    pub fn new(path: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            revision: Some(revision.into()),
        }
    }

    /// A remote reference with no usable revision string.
    pub fn unversioned(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            revision: None,
        }
    }

    /// The revision as an ordered dotted-numeric value, if it parses.
    pub fn parsed_revision(&self) -> Option<Revision> {
        self.revision.as_deref().and_then(|r| r.parse().ok())
    }
}

// ---------------------------------------------------------------------------
// Comparison results
// ---------------------------------------------------------------------------

/// Direction of a classified difference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
    Conflicting,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incoming => write!(f, "incoming"),
            Self::Outgoing => write!(f, "outgoing"),
            Self::Conflicting => write!(f, "conflicting"),
        }
    }
}

/// Kind of change a difference represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Addition,
    Deletion,
    Change,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Addition => write!(f, "addition"),
            Self::Deletion => write!(f, "deletion"),
            Self::Change => write!(f, "change"),
        }
    }
}

/// How the local and remote states were compared.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComparatorMode {
    /// Direct local/remote comparison with no base tracking.
    TwoWay,
    /// Comparison against a common base revision.
    ThreeWay,
}

/// One classified local/remote/base difference.
///
/// Immutable once classified. The only sanctioned derivation is
/// [`with_remote`](Self::with_remote), which overrides the remote reference
/// while freezing the original direction and change kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComparisonResult {
    pub local: LocalResource,
    pub base: Option<RemoteRef>,
    pub remote: Option<RemoteRef>,
    pub direction: Direction,
    pub change: ChangeType,
    pub mode: ComparatorMode,
}

impl ComparisonResult {
    /// Derive a copy of this result that points at `remote` but keeps the
    /// already-classified direction and change kind, bypassing
    /// reclassification.
    pub fn with_remote(&self, remote: RemoteRef) -> Self {
        Self {
            remote: Some(remote),
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Log entries
// ---------------------------------------------------------------------------

/// One historical revision record for a remote file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub revision: Revision,
    pub author: String,
    pub date: DateTime<Utc>,
    pub comment: String,
    /// True if this revision moved the file into the attic (a deletion).
    pub is_deletion: bool,
}

// ---------------------------------------------------------------------------
// Change sets
// ---------------------------------------------------------------------------

/// How a change set obtained its identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SetOrigin {
    /// The reserved unassigned set, created lazily on first need.
    Default,
    /// Built from a fetched log entry's author/date/comment.
    FromLogEntry,
}

/// Everything needed to create or locate a change set for a log entry.
///
/// Set identity is an exact string match on `comment`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeSetSeed {
    pub author: String,
    pub date: DateTime<Utc>,
    pub comment: String,
    pub name: String,
}

impl ChangeSetSeed {
    /// Build a seed from a log entry. `date_format` is a chrono format
    /// string used for the display name.
    pub fn from_entry(entry: &LogEntry, date_format: &str) -> Self {
        let name = format!(
            "[{}] ({}) {}",
            entry.author,
            entry.date.format(date_format),
            flatten_comment(&entry.comment)
        );
        Self {
            author: entry.author.clone(),
            date: entry.date,
            comment: entry.comment.clone(),
            name,
        }
    }
}

/// A named group of comparison results sharing a resolved commit comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSet {
    pub id: Uuid,
    pub name: String,
    pub author: String,
    pub date: DateTime<Utc>,
    pub comment: String,
    pub origin: SetOrigin,
    members: Vec<ComparisonResult>,
}

impl ChangeSet {
    /// Create a set for a fetched log entry.
    pub fn from_seed(seed: &ChangeSetSeed) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: seed.name.clone(),
            author: seed.author.clone(),
            date: seed.date,
            comment: seed.comment.clone(),
            origin: SetOrigin::FromLogEntry,
            members: Vec::new(),
        }
    }

    /// Create the reserved unassigned set.
    pub fn unassigned() -> Self {
        Self {
            id: Uuid::new_v4(),
            name: UNASSIGNED_NAME.to_string(),
            author: String::new(),
            date: Utc::now(),
            comment: UNASSIGNED_COMMENT.to_string(),
            origin: SetOrigin::Default,
            members: Vec::new(),
        }
    }

    /// Add a member, replacing any existing member for the same local path.
    /// A set holds at most one result per workspace resource.
    pub fn add_member(&mut self, result: ComparisonResult) {
        if let Some(existing) = self
            .members
            .iter_mut()
            .find(|m| m.local.path == result.local.path)
        {
            *existing = result;
        } else {
            self.members.push(result);
        }
    }

    pub fn members(&self) -> &[ComparisonResult] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.members.iter().any(|m| m.local.path == path)
    }
}

/// Collapse a multi-line commit comment to a single line for display names.
pub fn flatten_comment(comment: &str) -> String {
    comment.split_whitespace().collect::<Vec<_>>().join(" ")
}
