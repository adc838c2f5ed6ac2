use thiserror::Error;

use cda_types::Digest;

/// Reasons a certified record is rejected.
///
/// Each variant corresponds to one step of verification and is terminal.
/// All of them are security-relevant: callers must surface them as an
/// explicit rejection and never retry automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("invalid certificate signature: {0}")]
    InvalidSignature(String),

    #[error("path not found in certificate: {path}")]
    PathNotFound { path: String },

    #[error("malformed witness: {0}")]
    MalformedWitness(String),

    #[error("witness root {witness} does not match certified root {committed}")]
    RootMismatch { witness: Digest, committed: Digest },

    #[error("data digest {0} not included in witness")]
    DataNotIncluded(Digest),
}

impl VerifyError {
    /// Short machine-readable name of the failed step.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedCertificate(_) => "MalformedCertificate",
            Self::InvalidSignature(_) => "InvalidSignature",
            Self::PathNotFound { .. } => "PathNotFound",
            Self::MalformedWitness(_) => "MalformedWitness",
            Self::RootMismatch { .. } => "RootMismatch",
            Self::DataNotIncluded(_) => "DataNotIncluded",
        }
    }
}

pub type VerifyResult<T> = Result<T, VerifyError>;
