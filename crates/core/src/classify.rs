//! Classification of comparison results as remote changes.
//!
//! A result is a remote change when it can be placed inside an incoming
//! commit set, i.e. the set is determined by the comments from the log
//! entries of the file.

use tracing::warn;

use crate::models::{ComparatorMode, ComparisonResult, Direction};
use crate::workspace::WorkspaceMetadata;

/// Decide whether a comparison result counts as a remote change.
///
/// Folders never qualify. In three-way mode anything that is not purely
/// outgoing qualifies. In two-way mode a result qualifies if it carries a
/// remote reference, or failing that if the local file has a recorded sync
/// marker (it was managed before). A marker lookup failure excludes the
/// file: a wrongly grouped result is worse than a missing one.
pub fn is_remote_change(result: &ComparisonResult, metadata: &dyn WorkspaceMetadata) -> bool {
    if !result.local.is_file() {
        return false;
    }
    match result.mode {
        ComparatorMode::ThreeWay => result.direction != Direction::Outgoing,
        ComparatorMode::TwoWay => {
            if result.remote.is_some() {
                return true;
            }
            match metadata.sync_marker(&result.local.path) {
                Ok(marker) => marker.is_some(),
                Err(error) => {
                    warn!(
                        path = %result.local.path,
                        %error,
                        "sync marker lookup failed, excluding from remote grouping"
                    );
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MetadataError;
    use crate::models::{ChangeType, LocalResource, RemoteRef};
    use crate::workspace::{SyncMarker, Tag};

    struct MarkerWorkspace {
        marker: Option<SyncMarker>,
        fail: bool,
    }

    impl WorkspaceMetadata for MarkerWorkspace {
        fn sync_marker(&self, path: &str) -> Result<Option<SyncMarker>, MetadataError> {
            if self.fail {
                Err(MetadataError::Corrupt {
                    path: path.to_string(),
                    detail: "truncated entry".to_string(),
                })
            } else {
                Ok(self.marker.clone())
            }
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

    fn no_marker() -> MarkerWorkspace {
        MarkerWorkspace {
            marker: None,
            fail: false,
        }
    }

    fn result(
        local: LocalResource,
        remote: Option<RemoteRef>,
        direction: Direction,
        mode: ComparatorMode,
    ) -> ComparisonResult {
        ComparisonResult {
            local,
            base: None,
            remote,
            direction,
            change: ChangeType::Change,
            mode,
        }
    }

    #[test]
    fn test_folders_never_qualify() {
        let r = result(
            LocalResource::folder("src"),
            Some(RemoteRef::new("repo/src", "1.1")),
            Direction::Incoming,
            ComparatorMode::ThreeWay,
        );
        assert!(!is_remote_change(&r, &no_marker()));
    }

    #[test]
    fn test_three_way_direction_matrix() {
        let ws = no_marker();
        for (direction, expected) in [
            (Direction::Incoming, true),
            (Direction::Conflicting, true),
            (Direction::Outgoing, false),
        ] {
            let r = result(
                LocalResource::file("a.rs"),
                None,
                direction,
                ComparatorMode::ThreeWay,
            );
            assert_eq!(is_remote_change(&r, &ws), expected, "{direction}");
        }
    }

    #[test]
    fn test_two_way_with_remote() {
        let r = result(
            LocalResource::file("a.rs"),
            Some(RemoteRef::new("repo/a.rs", "1.1")),
            Direction::Outgoing,
            ComparatorMode::TwoWay,
        );
        assert!(is_remote_change(&r, &no_marker()));
    }

    #[test]
    fn test_two_way_marker_presence_decides() {
        let r = result(
            LocalResource::file("a.rs"),
            None,
            Direction::Incoming,
            ComparatorMode::TwoWay,
        );
        let managed = MarkerWorkspace {
            marker: Some(SyncMarker {
                revision: Some("1.1".into()),
            }),
            fail: false,
        };
        assert!(is_remote_change(&r, &managed));
        assert!(!is_remote_change(&r, &no_marker()));
    }

    #[test]
    fn test_two_way_marker_failure_excludes() {
        let r = result(
            LocalResource::file("a.rs"),
            None,
            Direction::Incoming,
            ComparatorMode::TwoWay,
        );
        let failing = MarkerWorkspace {
            marker: None,
            fail: true,
        };
        assert!(!is_remote_change(&r, &failing));
    }
}
