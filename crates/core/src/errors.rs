//! Error types for the cvsync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Revision(#[from] InvalidRevision),
}

// ---------------------------------------------------------------------------
// Workspace metadata errors
// ---------------------------------------------------------------------------

/// Errors from local workspace metadata lookups (sync markers, folder tags).
#[derive(Debug, Error)]
pub enum MetadataError {
    /// No sync metadata exists for the resource.
    #[error("no sync metadata for '{0}'")]
    Missing(String),

    /// The stored metadata could not be read back.
    #[error("corrupt sync metadata for '{path}': {detail}")]
    Corrupt { path: String, detail: String },

    /// Generic I/O wrapper.
    #[error("metadata I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// History retrieval errors
// ---------------------------------------------------------------------------

/// Errors from remote revision-history retrieval.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Could not reach the repository server.
    #[error("repository connection failed: {0}")]
    ConnectionFailed(String),

    /// The server answered with something the client could not interpret.
    #[error("repository protocol error: {0}")]
    ProtocolError(String),

    /// An authentication problem with the repository server.
    #[error("repository authentication failed for user '{username}': {detail}")]
    AuthenticationFailed { username: String, detail: String },

    /// Generic I/O wrapper.
    #[error("history I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

/// Errors from the background grouping engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The in-flight batch was cancelled by a reset or dispose.
    ///
    /// Never surfaced to callers; absorbed by the worker loop.
    #[error("batch cancelled")]
    Cancelled,

    /// The engine has been disposed and accepts no further work.
    #[error("engine disposed")]
    Disposed,

    /// History retrieval for the batch failed.
    #[error("history fetch failed: {0}")]
    History(#[from] HistoryError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Revision parse error
// ---------------------------------------------------------------------------

/// A revision string was not a dotted sequence of decimal numbers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid revision number '{0}'")]
pub struct InvalidRevision(pub String);
