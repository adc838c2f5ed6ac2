/// Errors produced by a ledger backend.
///
/// None of these carry security meaning: a ledger that misbehaves is caught
/// by certificate verification, not here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("key not found in ledger: {0}")]
    NotFound(String),

    #[error("ledger rejected the request: {0}")]
    Rejected(String),

    #[error("certificate issuance failed: {0}")]
    Certification(String),

    #[error("ledger state lock poisoned")]
    Poisoned,
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
