use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::{debug, warn};

use cda_certificate::certificate::{LABEL_CANISTER, LABEL_CERTIFIED_DATA, LABEL_TIME};
use cda_certificate::{encode_time, Certificate, Delegation};
use cda_crypto::{dastree, HashTree, SigningKey};
use cda_types::{CertifiedRecord, Digest, OwnerId};

use crate::error::{LedgerError, LedgerResult};
use crate::traits::LedgerClient;

/// In-memory certified ledger for local runs and tests.
///
/// Every stored key becomes a `key → content digest` leaf in a labeled tree
/// whose root is the owner's certified data. Fetches return a certificate
/// over the current state and a witness pruned to the requested key.
pub struct InMemoryLedger {
    owner: OwnerId,
    root_key: SigningKey,
    subnet: Option<Subnet>,
    entries: RwLock<BTreeMap<String, Entry>>,
    faults: Mutex<Faults>,
}

struct Subnet {
    key: SigningKey,
    delegation: Delegation,
}

struct Entry {
    data: Vec<u8>,
    digest: Digest,
}

#[derive(Default)]
struct Faults {
    fail_store: bool,
    fail_fetch: bool,
    tamper_witness: bool,
    stall: Option<Duration>,
    stall_fetch: Option<Duration>,
}

impl InMemoryLedger {
    /// A ledger certifying data for `owner`, signing directly with `root_key`.
    pub fn new(owner: OwnerId, root_key: SigningKey) -> Self {
        Self {
            owner,
            root_key,
            subnet: None,
            entries: RwLock::new(BTreeMap::new()),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Sign certificates with `subnet_key` instead, under a delegation from
    /// the root key that covers exactly this ledger's owner.
    pub fn with_delegation(mut self, subnet_id: Vec<u8>, subnet_key: SigningKey) -> LedgerResult<Self> {
        let owner = self.owner.as_bytes().to_vec();
        let delegation = Delegation::issue(
            subnet_id,
            &subnet_key.verifying_key().as_bytes(),
            &[(owner.clone(), owner)],
            &self.root_key,
            now_nanos(),
        )
        .map_err(|e| LedgerError::Certification(e.to_string()))?;
        self.subnet = Some(Subnet {
            key: subnet_key,
            delegation,
        });
        Ok(self)
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the next `store` call fail.
    pub fn fail_next_store(&self) {
        self.with_faults(|f| f.fail_store = true);
    }

    /// Make the next `fetch` call fail.
    pub fn fail_next_fetch(&self) {
        self.with_faults(|f| f.fail_fetch = true);
    }

    /// Serve witnesses whose leaves do not match the certified state.
    pub fn tamper_witness(&self, enabled: bool) {
        self.with_faults(|f| f.tamper_witness = enabled);
    }

    /// Delay every call by `delay`, or stop delaying with `None`.
    pub fn stall(&self, delay: Option<Duration>) {
        self.with_faults(|f| f.stall = delay);
    }

    /// Delay only `fetch` calls by `delay`, or stop with `None`.
    pub fn stall_fetch(&self, delay: Option<Duration>) {
        self.with_faults(|f| f.stall_fetch = delay);
    }

    fn with_faults<T>(&self, f: impl FnOnce(&mut Faults) -> T) -> T {
        let mut guard = match self.faults.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    async fn maybe_stall(&self, fetch: bool) {
        let delay = self.with_faults(|f| if fetch { f.stall_fetch.or(f.stall) } else { f.stall });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn certify(&self, key: &str) -> LedgerResult<CertifiedRecord> {
        let entries = self.entries.read().map_err(|_| LedgerError::Poisoned)?;
        let data = entries
            .get(key)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| LedgerError::NotFound(key.to_string()))?;

        let data_tree = HashTree::from_entries(
            entries
                .iter()
                .map(|(k, entry)| (k.as_bytes().to_vec(), entry.digest.as_bytes().to_vec())),
        );
        drop(entries);

        let state = HashTree::fork(
            HashTree::labeled(
                LABEL_CANISTER,
                HashTree::labeled(
                    self.owner.as_bytes(),
                    HashTree::labeled(
                        LABEL_CERTIFIED_DATA,
                        HashTree::leaf(data_tree.digest().as_bytes().to_vec()),
                    ),
                ),
            ),
            HashTree::labeled(LABEL_TIME, HashTree::leaf(encode_time(now_nanos()))),
        );
        let certificate = match &self.subnet {
            None => Certificate::issue(state, &self.root_key, None),
            Some(subnet) => Certificate::issue(state, &subnet.key, Some(subnet.delegation.clone())),
        };

        let mut witness = data_tree.witness(&[key]);
        if self.with_faults(|f| f.tamper_witness) {
            warn!(key, "serving tampered witness");
            witness = HashTree::labeled(key, HashTree::leaf(vec![0u8; Digest::LEN]));
        }

        Ok(CertifiedRecord {
            certificate: certificate
                .encode()
                .map_err(|e| LedgerError::Certification(e.to_string()))?,
            witness: witness
                .to_cbor()
                .map_err(|e| LedgerError::Certification(e.to_string()))?,
            data,
            owner: self.owner.clone(),
        })
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn store(&self, key: &str, bytes: &[u8]) -> LedgerResult<()> {
        self.maybe_stall(false).await;
        if self.with_faults(|f| std::mem::take(&mut f.fail_store)) {
            return Err(LedgerError::Unavailable("injected store failure".into()));
        }
        let entry = Entry {
            data: bytes.to_vec(),
            digest: dastree::hash(bytes),
        };
        self.entries
            .write()
            .map_err(|_| LedgerError::Poisoned)?
            .insert(key.to_string(), entry);
        debug!(key, len = bytes.len(), "ledger stored entry");
        Ok(())
    }

    async fn fetch(&self, key: &str) -> LedgerResult<CertifiedRecord> {
        self.maybe_stall(true).await;
        if self.with_faults(|f| std::mem::take(&mut f.fail_fetch)) {
            return Err(LedgerError::Unavailable("injected fetch failure".into()));
        }
        let record = self.certify(key)?;
        debug!(key, certificate_len = record.certificate.len(), "ledger served record");
        Ok(record)
    }

    fn root_public_key(&self) -> Vec<u8> {
        self.root_key.verifying_key().as_bytes().to_vec()
    }
}

impl std::fmt::Debug for InMemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLedger")
            .field("owner", &self.owner)
            .field("entries", &self.len())
            .field("delegated", &self.subnet.is_some())
            .finish()
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
    use cda_certificate::{CertificateVerifier, VerifyError};

    fn owner() -> OwnerId {
        OwnerId::from_text("bkyz2-fmaaa-aaaaa-qaaaq-cai").unwrap()
    }

    fn ledger() -> InMemoryLedger {
        InMemoryLedger::new(owner(), SigningKey::from_bytes([5; 32]))
    }

    fn verify(ledger: &InMemoryLedger, record: &CertifiedRecord, digest: &Digest) -> Result<bool, VerifyError> {
        CertificateVerifier::default()
            .verify(record, &ledger.root_public_key(), &owner(), digest)
            .map(|v| v.delegated)
    }

    #[tokio::test]
    async fn stored_entry_verifies() {
        let ledger = ledger();
        let digest = dastree::hash(b"hello world");
        ledger.store(&digest.to_hex(), b"hello world").await.unwrap();
        ledger.store("unrelated", b"other").await.unwrap();

        let record = ledger.fetch(&digest.to_hex()).await.unwrap();
        assert_eq!(record.data, b"hello world");
        assert_eq!(record.owner, owner());
        assert_eq!(verify(&ledger, &record, &digest), Ok(false));
    }

    #[tokio::test]
    async fn witness_hides_other_keys() {
        let ledger = ledger();
        ledger.store("a", b"1").await.unwrap();
        ledger.store("b", b"2").await.unwrap();
        let record = ledger.fetch("a").await.unwrap();
        let witness = HashTree::from_cbor(&record.witness).unwrap();
        let paths: Vec<_> = witness.all_paths().into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec![vec![b"a".to_vec()]]);
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let ledger = ledger();
        assert_eq!(
            ledger.fetch("nope").await,
            Err(LedgerError::NotFound("nope".into()))
        );
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let ledger = ledger();
        ledger.fail_next_store();
        assert!(matches!(ledger.store("k", b"v").await, Err(LedgerError::Unavailable(_))));
        ledger.store("k", b"v").await.unwrap();

        ledger.fail_next_fetch();
        assert!(matches!(ledger.fetch("k").await, Err(LedgerError::Unavailable(_))));
        assert!(ledger.fetch("k").await.is_ok());
    }

    #[tokio::test]
    async fn tampered_witness_fails_verification() {
        let ledger = ledger();
        let digest = dastree::hash(b"data");
        ledger.store(&digest.to_hex(), b"data").await.unwrap();
        ledger.tamper_witness(true);
        let record = ledger.fetch(&digest.to_hex()).await.unwrap();
        assert!(matches!(
            verify(&ledger, &record, &digest),
            Err(VerifyError::RootMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn delegated_ledger_verifies() {
        let ledger = ledger()
            .with_delegation(b"subnet-0".to_vec(), SigningKey::from_bytes([6; 32]))
            .unwrap();
        let digest = dastree::hash(b"data");
        ledger.store(&digest.to_hex(), b"data").await.unwrap();
        let record = ledger.fetch(&digest.to_hex()).await.unwrap();
        assert_eq!(verify(&ledger, &record, &digest), Ok(true));
    }

    #[tokio::test]
    async fn stall_delays_calls() {
        let ledger = ledger();
        ledger.stall(Some(Duration::from_millis(50)));
        let started = tokio::time::Instant::now();
        ledger.store("k", b"v").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn fetch_stall_leaves_store_fast() {
        let ledger = ledger();
        ledger.stall_fetch(Some(Duration::from_secs(5)));
        tokio::time::timeout(Duration::from_secs(1), ledger.store("k", b"v"))
            .await
            .unwrap()
            .unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(20), ledger.fetch("k"))
            .await
            .is_err());
    }
}
