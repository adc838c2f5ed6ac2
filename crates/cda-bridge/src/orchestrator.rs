use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use cda_batch::BatchStore;
use cda_certificate::{CertificateVerifier, VerifiedRecord};
use cda_crypto::{dastree, ContentHasher};
use cda_ledger::{LedgerClient, LedgerResult};
use cda_types::{BatchId, CertifiedRecord, CommitReceipt, Digest, OwnerId, RECEIPT_VERSION};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};

/// Bit 0: the single certified backend signed.
const SIGNERS_MASK: u64 = 1;

/// A ledger record that passed verification, with its provenance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedRecord {
    pub record: CertifiedRecord,
    pub provenance: VerifiedRecord,
}

/// Sequences store → fetch-back → verify → finalize for a batch.
///
/// A receipt is only ever produced for data the ledger certified under our
/// owner and root key. Upstream failures and rejections leave the batch
/// `Populated` so the caller can retry.
pub struct CommitOrchestrator {
    store: Arc<dyn BatchStore>,
    ledger: Arc<dyn LedgerClient>,
    verifier: CertificateVerifier,
    config: BridgeConfig,
}

impl CommitOrchestrator {
    /// Create an orchestrator verifying with Ed25519.
    pub fn new(store: Arc<dyn BatchStore>, ledger: Arc<dyn LedgerClient>, config: BridgeConfig) -> Self {
        Self::with_verifier(store, ledger, config, CertificateVerifier::default())
    }

    /// Create an orchestrator with a custom verifier.
    pub fn with_verifier(
        store: Arc<dyn BatchStore>,
        ledger: Arc<dyn LedgerClient>,
        config: BridgeConfig,
        verifier: CertificateVerifier,
    ) -> Self {
        let verifier = match config.max_certificate_age {
            Some(age) => verifier.with_max_age(age),
            None => verifier,
        };
        Self {
            store,
            ledger,
            verifier,
            config,
        }
    }

    /// The batch store commits read from.
    pub fn store(&self) -> &Arc<dyn BatchStore> {
        &self.store
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn owner(&self) -> &OwnerId {
        &self.config.owner
    }

    /// Commit a populated batch to the ledger and return a receipt once the
    /// ledger's certificate for it verifies.
    pub async fn commit_batch(&self, id: BatchId) -> BridgeResult<CommitReceipt> {
        let started = Instant::now();

        let assembled = self.store.assemble(id)?;
        let digest = dastree::hash(&assembled.bytes);
        let key = digest.to_hex();
        debug!(batch_id = %id, digest = %digest, len = assembled.bytes.len(), "committing batch");

        self.bounded(self.ledger.store(&key, &assembled.bytes))
            .await
            .map_err(BridgeError::UpstreamStoreFailed)
            .inspect_err(|e| warn!(batch_id = %id, digest = %digest, "{e}"))?;

        let fetched = self
            .fetch_verified(&digest)
            .await
            .inspect_err(|e| warn!(batch_id = %id, digest = %digest, "{e}"))?;

        self.store.finalize_assembled(id, &assembled)?;

        let root_key = self.ledger.root_public_key();
        let receipt = CommitReceipt {
            digest,
            timeout: self.store.timeout_hint(id)?,
            signers_mask: SIGNERS_MASK,
            keyset_digest: ContentHasher::KEYSET.hash(&root_key),
            signature: fetched.record.certificate,
            version: RECEIPT_VERSION,
            certified_at_nanos: fetched.provenance.certified_at_nanos,
        };
        info!(
            batch_id = %id,
            digest = %digest,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch certified"
        );
        Ok(receipt)
    }

    /// Fetch the record stored under `digest` and return it only if it
    /// verifies and its data hashes to `digest`.
    pub async fn fetch_by_digest(&self, digest: &Digest) -> BridgeResult<FetchedRecord> {
        let fetched = self.fetch_verified(digest).await?;
        let actual = dastree::hash(&fetched.record.data);
        if actual != *digest {
            warn!(digest = %digest, actual = %actual, "ledger data does not match certified digest");
            return Err(BridgeError::DataMismatch {
                expected: *digest,
                actual,
            });
        }
        Ok(fetched)
    }

    /// Like [`Self::fetch_by_digest`], parsing a hex digest first.
    pub async fn fetch_by_hex(&self, digest: &str) -> BridgeResult<FetchedRecord> {
        let digest =
            Digest::from_hex(digest).map_err(|e| BridgeError::InvalidDigest(e.to_string()))?;
        self.fetch_by_digest(&digest).await
    }

    async fn fetch_verified(&self, digest: &Digest) -> BridgeResult<FetchedRecord> {
        let record = self
            .bounded(self.ledger.fetch(&digest.to_hex()))
            .await
            .map_err(BridgeError::UpstreamFetchFailed)?;

        let root_key = self.ledger.root_public_key();
        let owner = &self.config.owner;
        let provenance = match self.config.max_certificate_age {
            Some(_) => self
                .verifier
                .verify_at(&record, &root_key, owner, digest, now_nanos())?,
            None => self.verifier.verify(&record, &root_key, owner, digest)?,
        };
        Ok(FetchedRecord { record, provenance })
    }

    /// Apply the upstream deadline to a ledger call.
    async fn bounded<T>(&self, call: impl Future<Output = LedgerResult<T>>) -> Result<T, String> {
        let deadline = self.config.upstream_timeout;
        match tokio::time::timeout(deadline, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {}", format_duration(deadline))),
        }
    }
}

impl std::fmt::Debug for CommitOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitOrchestrator")
            .field("config", &self.config)
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

fn format_duration(d: Duration) -> String {
    if d.as_secs() > 0 {
        format!("{}s", d.as_secs_f64())
    } else {
        format!("{}ms", d.as_millis())
    }
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cda_batch::{BatchError, InMemoryBatchStore};
    use cda_certificate::VerifyError;
    use cda_crypto::SigningKey;
    use cda_ledger::InMemoryLedger;
    use cda_types::{BatchSpec, BatchState};

    struct Harness {
        store: Arc<InMemoryBatchStore>,
        ledger: Arc<InMemoryLedger>,
        bridge: CommitOrchestrator,
    }

    fn owner() -> OwnerId {
        OwnerId::from_text("bkyz2-fmaaa-aaaaa-qaaaq-cai").unwrap()
    }

    fn harness_with(ledger: InMemoryLedger, config: BridgeConfig) -> Harness {
        let store = Arc::new(InMemoryBatchStore::new());
        let ledger = Arc::new(ledger);
        let bridge = CommitOrchestrator::new(store.clone(), ledger.clone(), config);
        Harness {
            store,
            ledger,
            bridge,
        }
    }

    fn harness() -> Harness {
        harness_with(
            InMemoryLedger::new(owner(), SigningKey::from_bytes([9; 32])),
            BridgeConfig::new(owner()),
        )
    }

    fn populated(h: &Harness, chunks: &[&[u8]]) -> BatchId {
        let id = h.store.create_batch(BatchSpec::with_timeout(300)).unwrap();
        for chunk in chunks {
            h.store.append_chunk(id, chunk).unwrap();
        }
        id
    }

    #[tokio::test]
    async fn hello_world_commit_and_fetch() {
        let h = harness();
        let id = populated(&h, &[b"hello ", b"world"]);

        let receipt = h.bridge.commit_batch(id).await.unwrap();
        assert_eq!(receipt.digest, dastree::hash(b"hello world"));
        assert_eq!(receipt.timeout, 300);
        assert_eq!(receipt.signers_mask, 1);
        assert_eq!(receipt.version, RECEIPT_VERSION);
        assert_eq!(
            receipt.keyset_digest,
            ContentHasher::KEYSET.hash(&h.ledger.root_public_key())
        );
        assert!(receipt.certified_at_nanos.is_some());
        assert_eq!(h.store.state(id).unwrap(), BatchState::Committed);

        let fetched = h.bridge.fetch_by_digest(&receipt.digest).await.unwrap();
        assert_eq!(fetched.record.data, b"hello world");
        assert_eq!(
            fetched.provenance.data_path,
            vec![receipt.digest.to_hex().into_bytes()]
        );
    }

    #[tokio::test]
    async fn second_commit_is_invalid_state() {
        let h = harness();
        let id = populated(&h, &[b"once"]);
        h.bridge.commit_batch(id).await.unwrap();
        assert!(matches!(
            h.bridge.commit_batch(id).await,
            Err(BridgeError::Batch(BatchError::InvalidState { state: BatchState::Committed, .. }))
        ));
    }

    #[tokio::test]
    async fn commit_of_empty_batch_is_invalid_state() {
        let h = harness();
        let id = populated(&h, &[]);
        assert!(matches!(
            h.bridge.commit_batch(id).await,
            Err(BridgeError::Batch(BatchError::InvalidState { .. }))
        ));
        assert!(h.ledger.is_empty());
    }

    #[tokio::test]
    async fn unknown_batch_is_not_found() {
        let h = harness();
        let ghost = BatchId::new(42);
        assert_eq!(
            h.bridge.commit_batch(ghost).await,
            Err(BridgeError::Batch(BatchError::NotFound(ghost)))
        );
    }

    #[tokio::test]
    async fn store_failure_leaves_batch_retryable() {
        let h = harness();
        let id = populated(&h, &[b"retry me"]);
        h.ledger.fail_next_store();

        let err = h.bridge.commit_batch(id).await.unwrap_err();
        assert!(matches!(err, BridgeError::UpstreamStoreFailed(_)));
        assert!(err.is_retryable());
        assert_eq!(h.store.state(id).unwrap(), BatchState::Populated);

        h.bridge.commit_batch(id).await.unwrap();
        assert_eq!(h.store.state(id).unwrap(), BatchState::Committed);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_batch_retryable() {
        let h = harness();
        let id = populated(&h, &[b"x"]);
        h.ledger.fail_next_fetch();
        assert!(matches!(
            h.bridge.commit_batch(id).await,
            Err(BridgeError::UpstreamFetchFailed(_))
        ));
        assert_eq!(h.store.state(id).unwrap(), BatchState::Populated);
    }

    #[tokio::test]
    async fn stalled_ledger_times_out() {
        let h = harness_with(
            InMemoryLedger::new(owner(), SigningKey::from_bytes([9; 32])),
            BridgeConfig::new(owner()).with_upstream_timeout(Duration::from_millis(20)),
        );
        let id = populated(&h, &[b"slow"]);
        h.ledger.stall(Some(Duration::from_secs(5)));
        let err = h.bridge.commit_batch(id).await.unwrap_err();
        match err {
            BridgeError::UpstreamStoreFailed(reason) => assert!(reason.contains("timed out")),
            other => panic!("expected store timeout, got {other:?}"),
        }
        assert_eq!(h.store.state(id).unwrap(), BatchState::Populated);
    }

    #[tokio::test]
    async fn fetch_timeout_leaves_batch_retryable() {
        let h = harness_with(
            InMemoryLedger::new(owner(), SigningKey::from_bytes([9; 32])),
            BridgeConfig::new(owner()).with_upstream_timeout(Duration::from_millis(20)),
        );
        let id = populated(&h, &[b"slow fetch"]);
        h.ledger.stall_fetch(Some(Duration::from_secs(5)));

        let err = h.bridge.commit_batch(id).await.unwrap_err();
        match &err {
            BridgeError::UpstreamFetchFailed(reason) => assert!(reason.contains("timed out")),
            other => panic!("expected fetch timeout, got {other:?}"),
        }
        assert!(err.is_retryable());
        assert_eq!(h.ledger.len(), 1);
        assert_eq!(h.store.state(id).unwrap(), BatchState::Populated);

        let digest = dastree::hash(b"slow fetch");
        assert!(matches!(
            h.bridge.fetch_by_digest(&digest).await,
            Err(BridgeError::UpstreamFetchFailed(_))
        ));

        h.ledger.stall_fetch(None);
        h.bridge.commit_batch(id).await.unwrap();
        assert_eq!(h.store.state(id).unwrap(), BatchState::Committed);
    }

    #[tokio::test]
    async fn tampered_witness_is_rejected_without_finalizing() {
        let h = harness();
        let id = populated(&h, &[b"payload"]);
        h.ledger.tamper_witness(true);

        let err = h.bridge.commit_batch(id).await.unwrap_err();
        assert!(matches!(err, BridgeError::Verify(VerifyError::RootMismatch { .. })));
        assert!(err.is_rejection());
        assert_eq!(h.store.state(id).unwrap(), BatchState::Populated);
    }

    #[tokio::test]
    async fn fetch_with_mismatched_root_returns_no_data() {
        let h = harness();
        let id = populated(&h, &[b"stored"]);
        let receipt = h.bridge.commit_batch(id).await.unwrap();

        h.ledger.tamper_witness(true);
        assert!(matches!(
            h.bridge.fetch_by_digest(&receipt.digest).await,
            Err(BridgeError::Verify(VerifyError::RootMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn fetch_rejects_data_that_does_not_hash_to_digest() {
        let h = harness();
        // Stored under a key that is not the digest of its bytes.
        let digest = dastree::hash(b"claimed");
        h.ledger.store(&digest.to_hex(), b"different").await.unwrap();
        let err = h.bridge.fetch_by_digest(&digest).await.unwrap_err();
        assert!(err.is_rejection());
    }

    #[tokio::test]
    async fn fetch_by_hex_rejects_garbage() {
        let h = harness();
        assert!(matches!(
            h.bridge.fetch_by_hex("zz").await,
            Err(BridgeError::InvalidDigest(_))
        ));
    }

    #[tokio::test]
    async fn wrong_owner_is_rejected() {
        let other = OwnerId::from_raw(vec![1, 2, 3]).unwrap();
        let h = harness_with(
            InMemoryLedger::new(other, SigningKey::from_bytes([9; 32])),
            BridgeConfig::new(owner()),
        );
        let id = populated(&h, &[b"x"]);
        assert!(matches!(
            h.bridge.commit_batch(id).await,
            Err(BridgeError::Verify(VerifyError::PathNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn delegated_ledger_commits() {
        let ledger = InMemoryLedger::new(owner(), SigningKey::from_bytes([9; 32]))
            .with_delegation(b"subnet".to_vec(), SigningKey::from_bytes([10; 32]))
            .unwrap();
        let h = harness_with(
            ledger,
            BridgeConfig::new(owner()).with_max_certificate_age(Duration::from_secs(600)),
        );
        let id = populated(&h, &[b"via subnet"]);
        h.bridge.commit_batch(id).await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_commits_of_one_batch_finalize_once() {
        let h = Arc::new(harness());
        let id = populated(&h, &[b"race"]);
        let a = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.bridge.commit_batch(id).await })
        };
        let b = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.bridge.commit_batch(id).await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    }
}
