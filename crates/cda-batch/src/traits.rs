use cda_types::{BatchId, BatchSpec, BatchState};

use crate::batch::AssembledPayload;
use crate::error::BatchResult;

/// Registry of in-flight chunked uploads.
///
/// All implementations must satisfy these invariants:
/// - Batch ids are unique for the lifetime of the store and assigned
///   monotonically.
/// - Operations on one batch are linearizable with respect to each other.
/// - A failed operation leaves the batch exactly as it was.
/// - `Committed` and `Failed` are terminal: nothing moves a batch out of them.
/// - Unknown ids yield [`BatchError::NotFound`](crate::BatchError::NotFound),
///   never a panic.
pub trait BatchStore: Send + Sync {
    /// Allocate a new batch in state `Created`.
    fn create_batch(&self, spec: BatchSpec) -> BatchResult<BatchId>;

    /// Store a chunk after the highest index present and return its index.
    ///
    /// Concurrent appends to one batch are applied in the order the store
    /// observes them.
    fn append_chunk(&self, id: BatchId, bytes: &[u8]) -> BatchResult<u64>;

    /// Store a chunk at an explicit index.
    ///
    /// Re-sending identical bytes for an index is a no-op; different bytes
    /// are a [`BatchError::ChunkConflict`](crate::BatchError::ChunkConflict).
    fn insert_chunk(&self, id: BatchId, index: u64, bytes: &[u8]) -> BatchResult<()>;

    /// Copy out the assembled payload and the revision it was read at.
    ///
    /// Requires state `Populated`. Does not change the batch.
    fn assemble(&self, id: BatchId) -> BatchResult<AssembledPayload>;

    /// Copy out the assembled payload.
    fn get_assembled_payload(&self, id: BatchId) -> BatchResult<Vec<u8>> {
        self.assemble(id).map(|assembled| assembled.bytes)
    }

    /// Move a `Populated` batch to `Committed`.
    fn finalize_batch(&self, id: BatchId) -> BatchResult<()>;

    /// Like [`Self::finalize_batch`], but only if no chunk was written since
    /// `assembled` was read.
    fn finalize_assembled(&self, id: BatchId, assembled: &AssembledPayload) -> BatchResult<()>;

    /// Abort a mutable batch. Terminal.
    fn mark_failed(&self, id: BatchId) -> BatchResult<()>;

    /// Current lifecycle state.
    fn state(&self, id: BatchId) -> BatchResult<BatchState>;

    /// The timeout hint the batch was opened with.
    fn timeout_hint(&self, id: BatchId) -> BatchResult<u64>;

    /// Number of batches ever created and still tracked.
    fn len(&self) -> BatchResult<usize>;

    /// Returns `true` if no batch has been created.
    fn is_empty(&self) -> BatchResult<bool> {
        self.len().map(|n| n == 0)
    }
}
