use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle for a chunked upload, unique for the lifetime of a store.
///
/// Handles are assigned monotonically starting at zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(u64);

impl BatchId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// `0x`-prefixed hex, as used on the JSON-RPC wire.
    pub fn to_prefixed_hex(self) -> String {
        format!("{:#x}", self.0)
    }
}

impl fmt::Debug for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BatchId({})", self.0)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b#{}", self.0)
    }
}

impl From<u64> for BatchId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Lifecycle state of a batch.
///
/// `Created` and `Populated` are mutable; `Committed` and `Failed` are
/// terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchState {
    /// Allocated, no chunk received yet.
    Created,
    /// At least one chunk received.
    Populated,
    /// The ledger certified the payload.
    Committed,
    /// Explicitly aborted.
    Failed,
}

impl BatchState {
    /// Returns `true` if chunks may still be written.
    pub fn is_mutable(self) -> bool {
        matches!(self, Self::Created | Self::Populated)
    }

    /// Returns `true` for `Committed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        !self.is_mutable()
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Populated => write!(f, "Populated"),
            Self::Committed => write!(f, "Committed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Parameters supplied when a batch is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSpec {
    /// Caller-supplied expiry hint, echoed in the receipt. Not enforced.
    pub timeout_hint: u64,
    /// Number of chunks the caller announced, if any.
    pub expected_chunks: Option<u64>,
    /// Total payload size the caller announced, if any.
    pub total_size: Option<u64>,
    /// Largest accepted chunk, in bytes.
    pub max_chunk_size: Option<u64>,
    /// Largest accepted sum of chunk lengths, in bytes.
    pub max_size: Option<u64>,
}

impl BatchSpec {
    /// A spec carrying only a timeout hint.
    pub fn with_timeout(timeout_hint: u64) -> Self {
        Self {
            timeout_hint,
            ..Default::default()
        }
    }
}
