//! cvsync core library.
//!
//! This crate reconciles a workspace's local resource state against a
//! remote versioned repository and groups remotely originated changes into
//! comment-keyed change sets: classification of differences, batched
//! revision-history fetching with a memoizing cache, canonical remote
//! selection, and a cancellable background engine that delivers set
//! add/remove events to an external registry.

pub mod cache;
pub mod classify;
pub mod config;
pub mod engine;
pub mod errors;
pub mod grouper;
pub mod history;
pub mod models;
pub mod partition;
pub mod registry;
pub mod revision;
pub mod workspace;

// Re-exports for convenience.
pub use cache::LogEntryCache;
pub use config::EngineConfig;
pub use engine::{ChangeSetEngine, CompareScope, EngineState};
pub use history::{HistoryProvider, RemoteHistory};
pub use models::{ChangeSet, ComparisonResult, LogEntry};
pub use registry::{ChangeSetListener, ChangeSetRegistry};
pub use revision::Revision;
pub use workspace::WorkspaceMetadata;
