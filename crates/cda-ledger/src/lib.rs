//! Certified ledger capability.
//!
//! - [`LedgerClient`] -- the `store` / `fetch` / `root_public_key` boundary the
//!   commit path talks to
//! - [`InMemoryLedger`] -- a local ledger that certifies what it stores,
//!   optionally through a subnet delegation, with fault-injection hooks

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{LedgerError, LedgerResult};
pub use memory::InMemoryLedger;
pub use traits::LedgerClient;
