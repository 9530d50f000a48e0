//! Error types for the vector index.
//!
//! An empty index is not an error: `search` returns no candidates and
//! `delete_document` returns `false`.

use thiserror::Error;

/// Errors raised by [`VectorIndex`](crate::index::VectorIndex) mutations,
/// searches, and snapshot loading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// A vector's length differs from the index dimension.
    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The number of vectors differs from the number of chunk indices.
    #[error("arity mismatch: {vectors} vectors but {chunk_indices} chunk indices")]
    ArityMismatch { vectors: usize, chunk_indices: usize },

    /// Writing the durable snapshot failed. The previous snapshot is still authoritative.
    #[error("index persistence failed: {0}")]
    PersistenceFailure(String),

    /// A stored snapshot could not be decoded or is internally inconsistent.
    #[error("corrupt index snapshot: {0}")]
    CorruptSnapshot(String),
}

/// Result alias for index operations.
pub type IndexResult<T> = std::result::Result<T, IndexError>;
