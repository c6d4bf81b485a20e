//! Dotted-numeric revision numbers and canonical remote selection.
//!
//! Revisions are RCS-style dotted sequences ("1.5", "1.3.0.2"). Ordering is
//! componentwise left to right; a sequence that is a strict prefix of
//! another sorts before it.
//!
//! Two remote references can disagree about a file: the reference recorded
//! in local workspace metadata and the reference the reconciliation layer
//! fetched from the server. [`choose_canonical`] picks the one whose
//! revision is later, since it carries the most up-to-date commit comment
//! even when the locally recorded reference is stale.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::InvalidRevision;
use crate::models::{ComparisonResult, RemoteRef};
use crate::workspace::WorkspaceMetadata;

// ---------------------------------------------------------------------------
// Revision numbers
// ---------------------------------------------------------------------------

/// An ordered dotted-numeric revision number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision(Vec<u64>);

impl Revision {
    /// True if `self` is strictly later than `other`.
    pub fn is_later_than(&self, other: &Revision) -> bool {
        self > other
    }
}

impl FromStr for Revision {
    type Err = InvalidRevision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(InvalidRevision(s.to_string()));
        }
        let mut parts = Vec::new();
        for part in s.split('.') {
            let n: u64 = part
                .parse()
                .map_err(|_| InvalidRevision(s.to_string()))?;
            parts.push(n);
        }
        Ok(Revision(parts))
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for part in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{part}")?;
            first = false;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Canonical remote selection
// ---------------------------------------------------------------------------

/// Pick the canonical reference between the locally recorded remote state
/// (`known`) and the freshly fetched one (`fetched`).
///
/// The later revision wins. If only one side is present, it wins. When
/// neither revision string parses, the fetched side is preferred; this is
/// long-standing behavior and is pinned by a test rather than revisited.
pub fn choose_canonical<'a>(
    known: Option<&'a RemoteRef>,
    fetched: Option<&'a RemoteRef>,
) -> Option<&'a RemoteRef> {
    match (known, fetched) {
        (None, None) => None,
        (None, Some(fetched)) => Some(fetched),
        (Some(known), None) => Some(known),
        (Some(known), Some(fetched)) => {
            if prefer_fetched(known, fetched) {
                Some(fetched)
            } else {
                Some(known)
            }
        }
    }
}

fn prefer_fetched(known: &RemoteRef, fetched: &RemoteRef) -> bool {
    match (known.parsed_revision(), fetched.parsed_revision()) {
        // Nothing usable on the known side, trust the server.
        (None, _) => true,
        (Some(_), None) => false,
        (Some(known), Some(fetched)) => fetched.is_later_than(&known),
    }
}

/// Resolve the canonical remote reference for a comparison result.
///
/// The known side comes from workspace metadata for the local path, falling
/// back to the base reference; the fetched side is the result's own remote.
/// A metadata failure excludes the resource entirely (logged, `None`)
/// rather than risking a reference that disagrees with the workspace.
pub fn canonical_remote(
    result: &ComparisonResult,
    metadata: &dyn WorkspaceMetadata,
) -> Option<RemoteRef> {
    let known = match metadata.remote_for_local(&result.local.path) {
        Ok(known) => known.or_else(|| result.base.clone()),
        Err(error) => {
            warn!(
                path = %result.local.path,
                %error,
                "remote lookup failed, excluding resource"
            );
            return None;
        }
    };
    choose_canonical(known.as_ref(), result.remote.as_ref()).cloned()
}

/// Convenience wrapper for callers that only have revision strings.
pub fn is_later_revision(a: &str, b: &str) -> Result<bool, InvalidRevision> {
    let a: Revision = a.parse()?;
    let b: Revision = b.parse()?;
    Ok(a.is_later_than(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MetadataError;
    use crate::models::{ChangeType, ComparatorMode, Direction, LocalResource};
    use crate::workspace::{SyncMarker, Tag};

    fn rev(s: &str) -> Revision {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(rev("1.5").to_string(), "1.5");
        assert_eq!(rev("1.3.0.2").to_string(), "1.3.0.2");
        assert!("".parse::<Revision>().is_err());
        assert!("1..2".parse::<Revision>().is_err());
        assert!("1.x".parse::<Revision>().is_err());
    }

    #[test]
    fn test_componentwise_ordering() {
        assert!(rev("1.5").is_later_than(&rev("1.3")));
        assert!(rev("1.10").is_later_than(&rev("1.9")));
        assert!(rev("2.1").is_later_than(&rev("1.99")));
        assert!(!rev("1.3").is_later_than(&rev("1.3")));
    }

    #[test]
    fn test_prefix_sorts_earlier() {
        // "1.2" is a strict prefix of "1.2.1" and therefore earlier.
        assert!(rev("1.2.1").is_later_than(&rev("1.2")));
        assert!(!rev("1.2").is_later_than(&rev("1.2.1")));
    }

    #[test]
    fn test_choose_canonical_later_wins() {
        let known = RemoteRef::new("repo/a.rs", "1.5");
        let fetched = RemoteRef::new("repo/a.rs", "1.3");
        assert_eq!(
            choose_canonical(Some(&known), Some(&fetched)),
            Some(&known)
        );

        let known = RemoteRef::new("repo/a.rs", "1.3");
        let fetched = RemoteRef::new("repo/a.rs", "1.5");
        assert_eq!(
            choose_canonical(Some(&known), Some(&fetched)),
            Some(&fetched)
        );
    }

    #[test]
    fn test_choose_canonical_equal_keeps_known() {
        let known = RemoteRef::new("repo/a.rs", "1.4");
        let fetched = RemoteRef::new("repo/a.rs", "1.4");
        let chosen = choose_canonical(Some(&known), Some(&fetched)).unwrap();
        assert!(std::ptr::eq(chosen, &known));
    }

    #[test]
    fn test_choose_canonical_single_side() {
        let only = RemoteRef::new("repo/a.rs", "1.1");
        assert_eq!(choose_canonical(Some(&only), None), Some(&only));
        assert_eq!(choose_canonical(None, Some(&only)), Some(&only));
        assert_eq!(choose_canonical(None, None), None);
    }

    #[test]
    fn test_prefer_remote_when_neither_parses() {
        // Documented default: with no parsable revision on either side the
        // fetched reference wins.
        let known = RemoteRef::unversioned("repo/a.rs");
        let fetched = RemoteRef::unversioned("repo/a.rs");
        let chosen = choose_canonical(Some(&known), Some(&fetched)).unwrap();
        assert!(std::ptr::eq(chosen, &fetched));

        let known = RemoteRef::new("repo/a.rs", "garbage");
        let chosen = choose_canonical(Some(&known), Some(&fetched)).unwrap();
        assert!(std::ptr::eq(chosen, &fetched));
    }

    #[test]
    fn test_unparsable_fetched_falls_back_to_known() {
        let known = RemoteRef::new("repo/a.rs", "1.2");
        let fetched = RemoteRef::unversioned("repo/a.rs");
        let chosen = choose_canonical(Some(&known), Some(&fetched)).unwrap();
        assert!(std::ptr::eq(chosen, &known));
    }

    struct FailingMetadata;

    impl WorkspaceMetadata for FailingMetadata {
        fn sync_marker(&self, _path: &str) -> Result<Option<SyncMarker>, MetadataError> {
            Ok(None)
        }
        fn nearest_tag(&self, _path: &str) -> Result<Option<Tag>, MetadataError> {
            Ok(None)
        }
        fn checked_out_tag(&self, _path: &str, _branch: &Tag) -> Result<Option<Tag>, MetadataError> {
            Ok(None)
        }
        fn remote_for_local(&self, path: &str) -> Result<Option<RemoteRef>, MetadataError> {
            Err(MetadataError::Missing(path.to_string()))
        }
    }

    #[test]
    fn test_canonical_remote_metadata_failure_excludes() {
        let result = ComparisonResult {
            local: LocalResource::file("a.rs"),
            base: None,
            remote: Some(RemoteRef::new("repo/a.rs", "1.9")),
            direction: Direction::Incoming,
            change: ChangeType::Change,
            mode: ComparatorMode::ThreeWay,
        };
        assert_eq!(canonical_remote(&result, &FailingMetadata), None);
    }

    #[test]
    fn test_is_later_revision() {
        assert!(is_later_revision("1.5", "1.3").unwrap());
        assert!(!is_later_revision("1.3", "1.5").unwrap());
        assert!(is_later_revision("bad", "1.1").is_err());
    }
}
