//! Foundation types for the certified data-availability bridge.
//!
//! Every other `cda-*` crate depends on `cda-types`.
//!
//! # Key Types
//!
//! - [`Digest`]: 32-byte digest used for tree nodes and payload fingerprints
//! - [`OwnerId`]: identity of the namespace data is certified under
//! - [`BatchId`] / [`BatchState`] / [`BatchSpec`]: chunked upload handles
//! - [`CommitReceipt`]: acknowledgment of a verified commit
//! - [`CertifiedRecord`]: certificate, witness, and data fetched from the ledger

pub mod batch;
pub mod digest;
pub mod error;
pub mod owner;
pub mod receipt;
pub mod record;

pub use batch::{BatchId, BatchSpec, BatchState};
pub use digest::Digest;
pub use error::TypeError;
pub use owner::OwnerId;
pub use receipt::{CommitReceipt, RECEIPT_VERSION};
pub use record::CertifiedRecord;
