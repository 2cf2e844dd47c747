//! Error types for `spfresh-core`.
//!
//! Batch-level failures (bad arguments, configuration, a failed build) are
//! returned as [`Error`]. Per-item failures inside insert/remove/search
//! batches are data: they are recorded in a [`crate::BatchReport`] or
//! [`crate::SearchReport`] and only become [`Error::PartialFailure`] when the
//! caller asks for it.

use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::EngineError;

/// Result type alias for `spfresh-core` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a single failed batch item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The external id was unknown. Soft condition, never fatal on its own.
    NotFound,
    /// The engine returned a non-success status for this item.
    Engine(EngineError),
}

/// A failed item inside a batch: its position in the input and why it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Input position of the item (and its result slot).
    pub index: usize,
    /// Failure classification.
    pub kind: FailureKind,
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            FailureKind::NotFound => write!(f, "item {}: not found", self.index),
            FailureKind::Engine(err) => write!(f, "item {}: {err}", self.index),
        }
    }
}

/// Errors that can occur in `spfresh-core` operations.
///
/// Error codes follow the pattern `SPF-XXX` for easy debugging.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid dimension/value-type combination or invalid configuration (SPF-001).
    #[error("[SPF-001] Configuration error: {0}")]
    Config(String),

    /// Batch length mismatch (SPF-002).
    #[error("[SPF-002] Argument mismatch for {what}: expected {expected}, got {actual}")]
    ArgumentMismatch {
        /// What was being compared (e.g. "external ids").
        what: &'static str,
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Vector dimension does not match the index (SPF-003).
    #[error("[SPF-003] Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// Invalid argument value (SPF-004).
    #[error("[SPF-004] Invalid argument: {0}")]
    InvalidArgument(String),

    /// Non-success status returned by the engine (SPF-005).
    #[error("[SPF-005] Engine failure: {0}")]
    Engine(#[from] EngineError),

    /// Mutation or save on a loaded index whose identifier map was not
    /// restored yet (SPF-006).
    #[error("[SPF-006] Identifier map not restored; call restore_identifier_map first")]
    MapNotRestored,

    /// A batch completed but some items failed (SPF-007).
    #[error("[SPF-007] {} of {total} batch items failed", failed.len())]
    PartialFailure {
        /// Failed items with their individual classification.
        failed: Vec<ItemFailure>,
        /// Total number of items in the batch.
        total: usize,
    },

    /// Operation issued before the index was built or loaded (SPF-008).
    #[error("[SPF-008] Index has not been built")]
    NotBuilt,

    /// The index is unusable after a failed build (SPF-009).
    #[error("[SPF-009] Index is unusable: {0}")]
    IndexUnusable(String),

    /// IO error (SPF-010).
    #[error("[SPF-010] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (SPF-011).
    #[error("[SPF-011] Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns the error code (e.g., "SPF-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "SPF-001",
            Self::ArgumentMismatch { .. } => "SPF-002",
            Self::DimensionMismatch { .. } => "SPF-003",
            Self::InvalidArgument(_) => "SPF-004",
            Self::Engine(_) => "SPF-005",
            Self::MapNotRestored => "SPF-006",
            Self::PartialFailure { .. } => "SPF-007",
            Self::NotBuilt => "SPF-008",
            Self::IndexUnusable(_) => "SPF-009",
            Self::Io(_) => "SPF-010",
            Self::Serialization(_) => "SPF-011",
        }
    }

    /// Returns true if this error is recoverable.
    ///
    /// Non-recoverable errors leave the index unusable until it is rebuilt.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::IndexUnusable(_))
    }

    /// Returns the failed items when this is a [`Error::PartialFailure`].
    #[must_use]
    pub fn failed_items(&self) -> &[ItemFailure] {
        match self {
            Self::PartialFailure { failed, .. } => failed,
            _ => &[],
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
