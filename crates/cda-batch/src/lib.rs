//! Chunked batch store for the certified data-availability bridge.
//!
//! A batch is one in-flight upload. Clients open it, send chunks (in call
//! order or at explicit indices), and the commit path reads the assembled
//! payload and finalizes it once the ledger has certified the bytes.
//!
//! # Lifecycle
//!
//! ```text
//! Created --chunk--> Populated --chunk--> Populated --finalize--> Committed
//!    \__________________\___mark_failed___________________________> Failed
//! ```
//!
//! `Committed` and `Failed` are terminal. An operation that does not match
//! the current state fails with [`BatchError::InvalidState`] and leaves the
//! batch untouched.
//!
//! # Design Rules
//!
//! 1. The store is an owned value, never process-wide state.
//! 2. Operations on one batch are linearizable; different batches proceed in
//!    parallel under their own locks.
//! 3. Assembled payloads are copies. Callers never see a batch mid-write.
//! 4. Lock poisoning surfaces as [`BatchError::Poisoned`], never a panic.

pub mod batch;
pub mod error;
pub mod memory;
pub mod traits;

pub use batch::AssembledPayload;
pub use error::{BatchError, BatchResult};
pub use memory::InMemoryBatchStore;
pub use traits::BatchStore;
