use cda_types::{BatchId, BatchState};

/// Errors from batch store operations.
///
/// All of them describe caller protocol misuse except [`BatchError::Poisoned`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    /// No batch with this id was ever created.
    #[error("batch not found: {0}")]
    NotFound(BatchId),

    /// The operation is not valid in the batch's current state.
    #[error("cannot {operation} batch {id} in state {state}")]
    InvalidState {
        id: BatchId,
        state: BatchState,
        operation: &'static str,
    },

    /// Chunks are missing from the assembled payload.
    #[error("batch {id} is incomplete: {missing} chunk(s) missing")]
    Incomplete { id: BatchId, missing: u64 },

    /// A chunk index was re-sent with different bytes.
    #[error("batch {id}: chunk {index} already holds different bytes")]
    ChunkConflict { id: BatchId, index: u64 },

    /// A chunk index lies outside the announced chunk count.
    #[error("batch {id}: chunk {index} out of range (expected {expected} chunks)")]
    ChunkOutOfRange { id: BatchId, index: u64, expected: u64 },

    /// A chunk is longer than the batch accepts.
    #[error("batch {id}: chunk {index} is {len} bytes, limit {max}")]
    ChunkTooLarge {
        id: BatchId,
        index: u64,
        len: u64,
        max: u64,
    },

    /// Accepting a chunk would push the batch past its size limit.
    #[error("batch {id}: {size} bytes would exceed limit {max}")]
    TooLarge { id: BatchId, size: u64, max: u64 },

    /// The assembled payload length differs from the announced total size.
    #[error("batch {id}: assembled {actual} bytes, announced {expected}")]
    SizeMismatch {
        id: BatchId,
        expected: u64,
        actual: u64,
    },

    /// Chunks changed between reading the payload and finalizing it.
    #[error("batch {id} was modified after its payload was read")]
    Modified { id: BatchId },

    /// A lock was poisoned by a panicking writer.
    #[error("batch store lock poisoned")]
    Poisoned,
}

impl BatchError {
    /// Returns `true` for errors caused by the caller rather than the store.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Poisoned)
    }

    /// Returns `true` when a size limit was hit.
    pub fn is_too_large(&self) -> bool {
        matches!(self, Self::ChunkTooLarge { .. } | Self::TooLarge { .. })
    }
}

/// Result alias for batch store operations.
pub type BatchResult<T> = Result<T, BatchError>;
