use async_trait::async_trait;

use cda_types::CertifiedRecord;

use crate::error::LedgerResult;

/// Client for an external certified ledger.
///
/// The ledger is untrusted: everything returned by [`Self::fetch`] must pass
/// certificate verification before it is used.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Persist `bytes` under `key`.
    async fn store(&self, key: &str, bytes: &[u8]) -> LedgerResult<()>;

    /// Fetch the data stored under `key` together with a certificate and an
    /// inclusion witness for it.
    async fn fetch(&self, key: &str) -> LedgerResult<CertifiedRecord>;

    /// The ledger's declared root public key.
    fn root_public_key(&self) -> Vec<u8>;
}
