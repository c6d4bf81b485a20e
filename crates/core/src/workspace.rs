//! Local workspace metadata: tags, sync markers, and the capability trait
//! the engine uses to consult them.
//!
//! The engine never reads workspace state directly. Everything it needs is
//! behind [`WorkspaceMetadata`], a closed surface implemented by the
//! embedding application (and by scripted fakes in tests). Every lookup is
//! fallible; callers degrade per operation rather than failing a batch.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::MetadataError;
use crate::models::{ComparisonResult, RemoteRef};

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Kind of a repository tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    /// The main line of development; also the untagged sentinel.
    Head,
    Branch,
    Version,
    Date,
}

/// A repository tag (branch, version label, date, or head).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub kind: TagKind,
}

impl Tag {
    /// The untagged sentinel. Fetching with this tag applies no tag filter.
    pub fn head() -> Self {
        Self {
            name: "HEAD".to_string(),
            kind: TagKind::Head,
        }
    }

    pub fn branch(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TagKind::Branch,
        }
    }

    pub fn version(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TagKind::Version,
        }
    }

    pub fn is_head(&self) -> bool {
        self.kind == TagKind::Head
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

// ---------------------------------------------------------------------------
// Sync markers
// ---------------------------------------------------------------------------

/// The per-file sync metadata recorded when a file is managed.
///
/// Its mere presence marks a file as previously managed, which is what
/// two-way classification needs when no remote reference survives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncMarker {
    /// The revision the file was last synchronized at, if recorded.
    pub revision: Option<String>,
}

// ---------------------------------------------------------------------------
// Metadata capability trait
// ---------------------------------------------------------------------------

/// Read-only access to local workspace sync metadata.
pub trait WorkspaceMetadata: Send + Sync {
    /// The sync marker for a file, or `None` if the file was never managed.
    fn sync_marker(&self, path: &str) -> Result<Option<SyncMarker>, MetadataError>;

    /// The nearest folder-level tag for a path, walking metadata up the
    /// tree. `None` means the resource is untagged (head).
    fn nearest_tag(&self, path: &str) -> Result<Option<Tag>, MetadataError>;

    /// The concrete checked-out tag for a path whose folder tag is a
    /// branch. Branch metadata at folder level can be stale; this resolves
    /// the tag actually checked out.
    fn checked_out_tag(&self, path: &str, branch: &Tag) -> Result<Option<Tag>, MetadataError>;

    /// The remote reference recorded in local metadata for a path, if any.
    fn remote_for_local(&self, path: &str) -> Result<Option<RemoteRef>, MetadataError>;
}

// ---------------------------------------------------------------------------
// Batch-level tag resolution
// ---------------------------------------------------------------------------

/// Determine the local tag to use for a batched history fetch.
///
/// The first batch member's nearest tag stands in for the whole batch.
/// Branch tags are normalized against the concrete checked-out tag. Any
/// failure falls back to the head sentinel so the fetch proceeds untagged.
// TODO: members of one batch can sit on different local tags; splitting the
// fetch per distinct tag would fix mixed-tag batches.
pub fn local_batch_tag(
    results: &[&ComparisonResult],
    metadata: &dyn WorkspaceMetadata,
) -> Tag {
    let Some(first) = results.first() else {
        return Tag::head();
    };
    let path = &first.local.path;
    let tag = match metadata.nearest_tag(path) {
        Ok(Some(tag)) => tag,
        Ok(None) => return Tag::head(),
        Err(error) => {
            warn!(%path, %error, "tag lookup failed, fetching untagged");
            return Tag::head();
        }
    };
    if tag.kind != TagKind::Branch {
        return tag;
    }
    match metadata.checked_out_tag(path, &tag) {
        Ok(Some(accurate)) => accurate,
        Ok(None) => tag,
        Err(error) => {
            debug!(%path, %error, "checked-out tag lookup failed, keeping folder tag");
            tag
        }
    }
}
