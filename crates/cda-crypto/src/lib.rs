//! Cryptographic primitives for the certified data-availability bridge.
//!
//! Provides the labeled, prunable hash tree used by certificates and
//! witnesses, the data-availability tree hash that fingerprints payloads,
//! domain-separated BLAKE3 hashing for key sets, and the signature capability
//! used to check signed state roots.
//!
//! All crypto operations wrap established libraries. There is no custom cryptography.

pub mod dastree;
pub mod hasher;
pub mod hashtree;
pub mod signer;

pub use hasher::ContentHasher;
pub use hashtree::{HashTree, Lookup, TreeError};
pub use signer::{
    state_root_message, Ed25519Scheme, Signature, SignatureError, SignatureScheme, SigningKey,
    VerifyingKey,
};
