use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, warn};

use cda_types::{BatchId, BatchSpec, BatchState};

use crate::batch::{AssembledPayload, Batch};
use crate::error::{BatchError, BatchResult};
use crate::traits::BatchStore;

/// In-memory batch registry.
///
/// The map from id to batch sits behind a `RwLock` that is only written when
/// a batch is created. Each batch has its own `Mutex`, so uploads to
/// different batches never contend on the same lock.
pub struct InMemoryBatchStore {
    batches: RwLock<HashMap<BatchId, Arc<Mutex<Batch>>>>,
    next_id: AtomicU64,
}

impl InMemoryBatchStore {
    /// Create an empty store. The first batch gets id 0.
    pub fn new() -> Self {
        Self {
            batches: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn entry(&self, id: BatchId) -> BatchResult<Arc<Mutex<Batch>>> {
        let map = self.batches.read().map_err(|_| BatchError::Poisoned)?;
        map.get(&id).cloned().ok_or(BatchError::NotFound(id))
    }

    /// Run `f` with exclusive access to one batch.
    fn with_batch<T>(
        &self,
        id: BatchId,
        f: impl FnOnce(&mut Batch) -> BatchResult<T>,
    ) -> BatchResult<T> {
        let entry = self.entry(id)?;
        let mut batch = entry.lock().map_err(|_| BatchError::Poisoned)?;
        f(&mut batch)
    }
}

impl Default for InMemoryBatchStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchStore for InMemoryBatchStore {
    fn create_batch(&self, spec: BatchSpec) -> BatchResult<BatchId> {
        let mut map = self.batches.write().map_err(|_| BatchError::Poisoned)?;
        let id = BatchId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        map.insert(id, Arc::new(Mutex::new(Batch::new(id, spec))));
        debug!(batch_id = %id, timeout_hint = spec.timeout_hint, "batch created");
        Ok(id)
    }

    fn append_chunk(&self, id: BatchId, bytes: &[u8]) -> BatchResult<u64> {
        let index = self.with_batch(id, |batch| batch.append(bytes))?;
        debug!(batch_id = %id, index, len = bytes.len(), "chunk appended");
        Ok(index)
    }

    fn insert_chunk(&self, id: BatchId, index: u64, bytes: &[u8]) -> BatchResult<()> {
        self.with_batch(id, |batch| batch.insert(index, bytes))?;
        debug!(batch_id = %id, index, len = bytes.len(), "chunk stored");
        Ok(())
    }

    fn assemble(&self, id: BatchId) -> BatchResult<AssembledPayload> {
        self.with_batch(id, |batch| batch.assemble())
    }

    fn finalize_batch(&self, id: BatchId) -> BatchResult<()> {
        self.with_batch(id, |batch| batch.finalize(None))?;
        info!(batch_id = %id, "batch committed");
        Ok(())
    }

    fn finalize_assembled(&self, id: BatchId, assembled: &AssembledPayload) -> BatchResult<()> {
        self.with_batch(id, |batch| batch.finalize(Some(assembled.revision)))?;
        info!(batch_id = %id, len = assembled.bytes.len(), "batch committed");
        Ok(())
    }

    fn mark_failed(&self, id: BatchId) -> BatchResult<()> {
        self.with_batch(id, |batch| batch.fail())?;
        warn!(batch_id = %id, "batch marked failed");
        Ok(())
    }

    fn state(&self, id: BatchId) -> BatchResult<BatchState> {
        self.with_batch(id, |batch| Ok(batch.state()))
    }

    fn timeout_hint(&self, id: BatchId) -> BatchResult<u64> {
        self.with_batch(id, |batch| Ok(batch.spec().timeout_hint))
    }

    fn len(&self) -> BatchResult<usize> {
        let map = self.batches.read().map_err(|_| BatchError::Poisoned)?;
        Ok(map.len())
    }
}

impl std::fmt::Debug for InMemoryBatchStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBatchStore")
            .field("batch_count", &self.len().unwrap_or_default())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}
