use cda_batch::BatchError;
use cda_certificate::VerifyError;
use cda_types::Digest;

/// Errors from the commit pipeline and the verified read path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// Batch lifecycle misuse or store failure.
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// The ledger's record failed certificate verification.
    #[error("verification failed: {0}")]
    Verify(#[from] VerifyError),

    /// The ledger returned data whose content digest differs from the one
    /// that was certified.
    #[error("ledger data hashes to {actual}, expected {expected}")]
    DataMismatch { expected: Digest, actual: Digest },

    /// Storing the payload in the ledger failed or timed out.
    #[error("upstream store failed: {0}")]
    UpstreamStoreFailed(String),

    /// Fetching the certified record failed or timed out.
    #[error("upstream fetch failed: {0}")]
    UpstreamFetchFailed(String),

    /// A caller-supplied digest could not be parsed.
    #[error("invalid digest: {0}")]
    InvalidDigest(String),
}

impl BridgeError {
    /// Returns `true` if the same request may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamStoreFailed(_) | Self::UpstreamFetchFailed(_))
    }

    /// Returns `true` if the ledger's answer was rejected as untrustworthy.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Verify(_) | Self::DataMismatch { .. })
    }
}

/// Result alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
