//! Partitioning of a batch by its enclosing comparison roots.
//!
//! Used when no single fixed tag applies to the whole batch: each root
//! carries its own tag pair, so history must be fetched per root.

use tracing::debug;

use crate::models::ComparisonResult;
use crate::workspace::Tag;

/// A comparison root: a workspace subtree compared against its own tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonRoot {
    pub path: String,
    /// The remote tag this root is compared against. `None` fetches
    /// untagged.
    pub tag: Option<Tag>,
}

impl ComparisonRoot {
    pub fn new(path: impl Into<String>, tag: Option<Tag>) -> Self {
        Self {
            path: path.into(),
            tag,
        }
    }
}

/// Group results by the first root (in declared order) whose path is a
/// prefix of the result's local path.
///
/// Declaration order is the only overlap resolution. Results matching no
/// root are excluded from tag-scoped fetching; with no history cached they
/// later land in the unassigned set.
pub fn partition<'a>(
    results: &'a [&'a ComparisonResult],
    roots: &'a [ComparisonRoot],
) -> Vec<(&'a ComparisonRoot, Vec<&'a ComparisonResult>)> {
    let mut groups: Vec<(&ComparisonRoot, Vec<&ComparisonResult>)> =
        roots.iter().map(|root| (root, Vec::new())).collect();

    for result in results {
        let matched = groups
            .iter_mut()
            .find(|(root, _)| is_path_prefix(&root.path, &result.local.path));
        match matched {
            Some((_, group)) => group.push(result),
            None => {
                debug!(
                    path = %result.local.path,
                    "no enclosing comparison root, skipping tagged fetch"
                );
            }
        }
    }

    groups.retain(|(_, group)| !group.is_empty());
    groups
}

/// Prefix match on path component boundaries: "a/b" encloses "a/b/c.rs"
/// but not "a/bc.rs".
fn is_path_prefix(root: &str, path: &str) -> bool {
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        return true;
    }
    path == root
        || (path.starts_with(root) && path.as_bytes().get(root.len()) == Some(&b'/'))
}
