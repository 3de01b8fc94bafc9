//! Error types for embedding lookup and loss computation.

use thiserror::Error;

/// Model errors
///
/// Every variant is fatal for the current training step: these are
/// deterministic-given-input numeric preconditions, not transient I/O
/// failures, so no retry is appropriate. The training loop decides
/// whether to skip the step or abort the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The pair index set was built for a different batch size than the
    /// one fed to the alignment objective. Proceeding would index the
    /// wrong samples silently, so this is a hard failure.
    #[error("batch size mismatch: pair index set built for {expected}, got batch of {actual}")]
    BatchSizeMismatch { expected: usize, actual: usize },

    /// A tensor or buffer has the wrong number of elements.
    #[error("{what}: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A categorical index exceeds its field's cardinality.
    #[error("index {index} out of range for field {field} (cardinality {cardinality})")]
    IndexOutOfRange {
        field: usize,
        index: u32,
        cardinality: usize,
    },
}

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;
