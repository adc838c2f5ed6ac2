//! Certificate decoding and inclusion verification.
//!
//! A [`Certificate`] asserts a state-tree root, signed either by the trusted
//! root key or by a subnet key the root key delegated to. The
//! [`CertificateVerifier`] checks that signature, reads the owner's
//! certified data out of the tree, and proves that a witness tree with the
//! same root contains an expected data digest.

pub mod certificate;
pub mod error;
pub mod verifier;

pub use certificate::{encode_ranges, encode_time, Certificate, Delegation};
pub use error::{VerifyError, VerifyResult};
pub use verifier::{committed_root, CertificateVerifier, VerifiedRecord};
