use std::collections::BTreeMap;

use cda_types::{BatchId, BatchSpec, BatchState};

use crate::error::{BatchError, BatchResult};

/// A copy of a batch's payload together with the revision it was read at.
///
/// Passing the revision back to
/// [`BatchStore::finalize_assembled`](crate::BatchStore::finalize_assembled)
/// guarantees the finalized batch still holds exactly these bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssembledPayload {
    pub bytes: Vec<u8>,
    pub revision: u64,
}

/// One upload and its chunks, keyed by index.
#[derive(Debug)]
pub(crate) struct Batch {
    id: BatchId,
    spec: BatchSpec,
    state: BatchState,
    chunks: BTreeMap<u64, Vec<u8>>,
    /// Sum of stored chunk lengths.
    size: u64,
    /// Bumped on every chunk write.
    revision: u64,
}

impl Batch {
    pub(crate) fn new(id: BatchId, spec: BatchSpec) -> Self {
        Self {
            id,
            spec,
            state: BatchState::Created,
            chunks: BTreeMap::new(),
            size: 0,
            revision: 0,
        }
    }

    pub(crate) fn state(&self) -> BatchState {
        self.state
    }

    pub(crate) fn spec(&self) -> &BatchSpec {
        &self.spec
    }

    /// Store `bytes` after the highest index present and return that index.
    pub(crate) fn append(&mut self, bytes: &[u8]) -> BatchResult<u64> {
        let index = match self.chunks.last_key_value() {
            None => 0,
            Some((last, _)) => last.checked_add(1).ok_or(BatchError::ChunkOutOfRange {
                id: self.id,
                index: *last,
                expected: u64::MAX,
            })?,
        };
        self.insert(index, bytes)?;
        Ok(index)
    }

    /// Store `bytes` at `index`. Re-sending identical bytes is a no-op.
    pub(crate) fn insert(&mut self, index: u64, bytes: &[u8]) -> BatchResult<()> {
        self.require_mutable("write chunk to")?;
        if let Some(expected) = self.spec.expected_chunks {
            if index >= expected {
                return Err(BatchError::ChunkOutOfRange {
                    id: self.id,
                    index,
                    expected,
                });
            }
        }
        let len = bytes.len() as u64;
        if let Some(max) = self.spec.max_chunk_size {
            if len > max {
                return Err(BatchError::ChunkTooLarge {
                    id: self.id,
                    index,
                    len,
                    max,
                });
            }
        }
        match self.chunks.get(&index) {
            Some(existing) if existing.as_slice() == bytes => {}
            Some(_) => return Err(BatchError::ChunkConflict { id: self.id, index }),
            None => {
                let size = self.size.saturating_add(len);
                if let Some(max) = self.spec.max_size {
                    if size > max {
                        return Err(BatchError::TooLarge {
                            id: self.id,
                            size,
                            max,
                        });
                    }
                }
                self.chunks.insert(index, bytes.to_vec());
                self.size = size;
                self.revision += 1;
            }
        }
        self.state = BatchState::Populated;
        Ok(())
    }

    /// Concatenate the chunks in ascending index order.
    ///
    /// Indices must run contiguously from zero, up to the announced chunk
    /// count if there is one.
    pub(crate) fn assemble(&self) -> BatchResult<AssembledPayload> {
        self.require(BatchState::Populated, "assemble")?;

        let present = self.chunks.len() as u64;
        let wanted = match self.spec.expected_chunks {
            Some(expected) => expected,
            None => self
                .chunks
                .last_key_value()
                .map_or(0, |(last, _)| last.saturating_add(1)),
        };
        if present < wanted {
            return Err(BatchError::Incomplete {
                id: self.id,
                missing: wanted - present,
            });
        }

        let bytes = self.chunks.values().flatten().copied().collect::<Vec<u8>>();
        if let Some(expected) = self.spec.total_size {
            let actual = bytes.len() as u64;
            if actual != expected {
                return Err(BatchError::SizeMismatch {
                    id: self.id,
                    expected,
                    actual,
                });
            }
        }
        Ok(AssembledPayload {
            bytes,
            revision: self.revision,
        })
    }

    pub(crate) fn finalize(&mut self, revision: Option<u64>) -> BatchResult<()> {
        self.require(BatchState::Populated, "finalize")?;
        if revision.is_some_and(|r| r != self.revision) {
            return Err(BatchError::Modified { id: self.id });
        }
        self.close(BatchState::Committed);
        Ok(())
    }

    pub(crate) fn fail(&mut self) -> BatchResult<()> {
        self.require_mutable("fail")?;
        self.close(BatchState::Failed);
        Ok(())
    }

    /// Enter a terminal state. Terminal batches keep no chunk bytes.
    fn close(&mut self, state: BatchState) {
        self.state = state;
        self.chunks = BTreeMap::new();
    }

    fn require(&self, state: BatchState, operation: &'static str) -> BatchResult<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(self.invalid(operation))
        }
    }

    fn require_mutable(&self, operation: &'static str) -> BatchResult<()> {
        if self.state.is_mutable() {
            Ok(())
        } else {
            Err(self.invalid(operation))
        }
    }

    fn invalid(&self, operation: &'static str) -> BatchError {
        BatchError::InvalidState {
            id: self.id,
            state: self.state,
            operation,
        }
    }
}
