use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use cda_crypto::{state_root_message, Ed25519Scheme, HashTree, Lookup, SignatureScheme};
use cda_types::{CertifiedRecord, Digest, OwnerId};

use crate::certificate::{
    decode_ranges, Certificate, Delegation, LABEL_CANISTER, LABEL_CANISTER_RANGES,
    LABEL_CERTIFIED_DATA, LABEL_PUBLIC_KEY, LABEL_SUBNET,
};
use crate::error::{VerifyError, VerifyResult};

/// Provenance extracted from a record that passed verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedRecord {
    /// The owner's certified data, equal to the witness root.
    pub committed_root: Digest,
    /// Certification time, if the certificate carries one.
    pub certified_at_nanos: Option<u64>,
    /// Whether the certificate was signed through a subnet delegation.
    pub delegated: bool,
    /// Witness path under which the expected digest was found.
    pub data_path: Vec<Vec<u8>>,
}

/// Decides whether a [`CertifiedRecord`] is authentic and includes an
/// expected data digest.
///
/// Holds no per-call state: the same inputs always produce the same
/// outcome.
#[derive(Clone)]
pub struct CertificateVerifier {
    scheme: Arc<dyn SignatureScheme>,
    max_age: Option<Duration>,
}

impl Default for CertificateVerifier {
    fn default() -> Self {
        Self::new(Arc::new(Ed25519Scheme))
    }
}

impl CertificateVerifier {
    /// Create a verifier that checks signatures with `scheme`.
    pub fn new(scheme: Arc<dyn SignatureScheme>) -> Self {
        Self {
            scheme,
            max_age: None,
        }
    }

    /// Reject certificates older than `max_age` when a clock is supplied
    /// through [`Self::verify_at`].
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Verify `record` against the trusted `root_key`.
    ///
    /// `expected` must be computed by the caller from data it already holds,
    /// never taken from the record.
    pub fn verify(
        &self,
        record: &CertifiedRecord,
        root_key: &[u8],
        owner: &OwnerId,
        expected: &Digest,
    ) -> VerifyResult<VerifiedRecord> {
        self.verify_inner(record, root_key, owner, expected, None)
    }

    /// Like [`Self::verify`], additionally enforcing the maximum certificate
    /// age relative to `now_nanos`.
    pub fn verify_at(
        &self,
        record: &CertifiedRecord,
        root_key: &[u8],
        owner: &OwnerId,
        expected: &Digest,
        now_nanos: u64,
    ) -> VerifyResult<VerifiedRecord> {
        self.verify_inner(record, root_key, owner, expected, Some(now_nanos))
    }

    fn verify_inner(
        &self,
        record: &CertifiedRecord,
        root_key: &[u8],
        owner: &OwnerId,
        expected: &Digest,
        now_nanos: Option<u64>,
    ) -> VerifyResult<VerifiedRecord> {
        let result = self.run_steps(record, root_key, owner, expected, now_nanos);
        if let Err(err) = &result {
            debug!(owner = %owner, digest = %expected, kind = err.kind(), "record rejected: {err}");
        }
        result
    }

    fn run_steps(
        &self,
        record: &CertifiedRecord,
        root_key: &[u8],
        owner: &OwnerId,
        expected: &Digest,
        now_nanos: Option<u64>,
    ) -> VerifyResult<VerifiedRecord> {
        let certificate = Certificate::decode(&record.certificate)?;

        self.verify_certificate(&certificate, root_key, owner)?;
        let certified_at_nanos = certificate.time_nanos()?;
        self.check_freshness(certified_at_nanos, now_nanos)?;

        let committed_root = committed_root(&certificate.tree, owner)?;

        let witness = HashTree::from_cbor(&record.witness)
            .map_err(|e| VerifyError::MalformedWitness(e.to_string()))?;
        let witness_root = witness.digest();
        if witness_root != committed_root {
            return Err(VerifyError::RootMismatch {
                witness: witness_root,
                committed: committed_root,
            });
        }

        let data_path = witness
            .all_paths()
            .into_iter()
            .find(|(_, value)| *value == expected.as_bytes().as_slice())
            .map(|(path, _)| path)
            .ok_or(VerifyError::DataNotIncluded(*expected))?;

        Ok(VerifiedRecord {
            committed_root,
            certified_at_nanos,
            delegated: certificate.delegation.is_some(),
            data_path,
        })
    }

    /// Check the certificate's signature, following a delegation if present.
    pub fn verify_certificate(
        &self,
        certificate: &Certificate,
        root_key: &[u8],
        owner: &OwnerId,
    ) -> VerifyResult<()> {
        let signing_key = match &certificate.delegation {
            None => root_key.to_vec(),
            Some(delegation) => self.delegated_key(delegation, root_key, owner)?,
        };
        self.check_signature(certificate, &signing_key)
    }

    fn check_signature(&self, certificate: &Certificate, key: &[u8]) -> VerifyResult<()> {
        let message = state_root_message(&certificate.root());
        self.scheme
            .verify(key, &message, &certificate.signature)
            .map_err(|e| VerifyError::InvalidSignature(e.to_string()))
    }

    fn delegated_key(
        &self,
        delegation: &Delegation,
        root_key: &[u8],
        owner: &OwnerId,
    ) -> VerifyResult<Vec<u8>> {
        let inner = Certificate::decode(&delegation.certificate)?;
        if inner.delegation.is_some() {
            return Err(VerifyError::InvalidSignature(
                "delegation certificate is itself delegated".into(),
            ));
        }
        self.check_signature(&inner, root_key)
            .map_err(|e| VerifyError::InvalidSignature(format!("delegation: {e}")))?;

        let subnet_id = delegation.subnet_id.as_slice();
        let key_path: [&[u8]; 3] = [LABEL_SUBNET, subnet_id, LABEL_PUBLIC_KEY];
        let key = inner.tree.lookup_path(&key_path).value().ok_or_else(|| {
            VerifyError::InvalidSignature("delegation carries no subnet public key".into())
        })?;

        let ranges_path: [&[u8]; 3] = [LABEL_SUBNET, subnet_id, LABEL_CANISTER_RANGES];
        let ranges = inner.tree.lookup_path(&ranges_path).value().ok_or_else(|| {
            VerifyError::InvalidSignature("delegation carries no owner ranges".into())
        })?;
        let owner_bytes = owner.as_bytes();
        let covered = decode_ranges(ranges)?
            .iter()
            .any(|(lo, hi)| lo.as_slice() <= owner_bytes && owner_bytes <= hi.as_slice());
        if !covered {
            return Err(VerifyError::InvalidSignature(format!(
                "owner {owner} is outside the delegated ranges"
            )));
        }
        Ok(key.to_vec())
    }

    fn check_freshness(&self, certified_at: Option<u64>, now: Option<u64>) -> VerifyResult<()> {
        let (Some(max_age), Some(now)) = (self.max_age, now) else {
            return Ok(());
        };
        let Some(certified_at) = certified_at else {
            return Err(VerifyError::InvalidSignature(
                "certificate has no time but a maximum age is enforced".into(),
            ));
        };
        let age = now.saturating_sub(certified_at);
        if u128::from(age) > max_age.as_nanos() {
            return Err(VerifyError::InvalidSignature(format!(
                "certificate is {age}ns old, max {}ns",
                max_age.as_nanos()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for CertificateVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateVerifier")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

/// Look up the owner's certified data in a certificate tree.
pub fn committed_root(tree: &HashTree, owner: &OwnerId) -> VerifyResult<Digest> {
    let path: [&[u8]; 3] = [LABEL_CANISTER, owner.as_bytes(), LABEL_CERTIFIED_DATA];
    match tree.lookup_path(&path) {
        Lookup::Found(value) => Digest::from_slice(value).map_err(|e| {
            VerifyError::MalformedCertificate(format!("certified_data: {e}"))
        }),
        Lookup::Absent | Lookup::Unknown => Err(VerifyError::PathNotFound {
            path: format!("canister/{owner}/certified_data"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::{encode_time, LABEL_TIME};
    use cda_crypto::{dastree, SigningKey};
    use proptest::prelude::*;

    const CERTIFIED_AT: u64 = 1_700_000_000_000_000_000;

    fn owner() -> OwnerId {
        OwnerId::from_text("bkyz2-fmaaa-aaaaa-qaaaq-cai").unwrap()
    }

    fn data_tree(payload: &[u8]) -> (Digest, HashTree) {
        let digest = dastree::hash(payload);
        let tree = HashTree::from_entries([
            (digest.to_hex().into_bytes(), digest.as_bytes().to_vec()),
            (b"other-key".to_vec(), vec![9; 32]),
        ]);
        (digest, tree)
    }

    fn state_tree(owner: &OwnerId, committed: &Digest) -> HashTree {
        HashTree::fork(
            HashTree::labeled(
                LABEL_CANISTER,
                HashTree::labeled(
                    owner.as_bytes(),
                    HashTree::labeled(LABEL_CERTIFIED_DATA, HashTree::leaf(committed.as_bytes().to_vec())),
                ),
            ),
            HashTree::labeled(LABEL_TIME, HashTree::leaf(encode_time(CERTIFIED_AT))),
        )
    }

    struct Fixture {
        root_key: SigningKey,
        record: CertifiedRecord,
        expected: Digest,
    }

    fn fixture(payload: &[u8]) -> Fixture {
        let root_key = SigningKey::from_bytes([11; 32]);
        let (expected, tree) = data_tree(payload);
        let witness = tree.witness(&[expected.to_hex()]);
        let certificate = Certificate::issue(state_tree(&owner(), &tree.digest()), &root_key, None);
        Fixture {
            root_key,
            record: CertifiedRecord {
                certificate: certificate.encode().unwrap(),
                witness: witness.to_cbor().unwrap(),
                data: payload.to_vec(),
                owner: owner(),
            },
            expected,
        }
    }

    fn public(key: &SigningKey) -> [u8; 32] {
        key.verifying_key().as_bytes()
    }

    #[test]
    fn accepts_valid_record() {
        let fx = fixture(b"hello world");
        let verified = CertificateVerifier::default()
            .verify(&fx.record, &public(&fx.root_key), &owner(), &fx.expected)
            .unwrap();
        assert_eq!(verified.certified_at_nanos, Some(CERTIFIED_AT));
        assert!(!verified.delegated);
        assert_eq!(verified.data_path, vec![fx.expected.to_hex().into_bytes()]);
    }

    #[test]
    fn verification_is_deterministic() {
        let fx = fixture(b"payload");
        let verifier = CertificateVerifier::default();
        let first = verifier.verify(&fx.record, &public(&fx.root_key), &owner(), &fx.expected);
        for _ in 0..5 {
            assert_eq!(
                verifier.verify(&fx.record, &public(&fx.root_key), &owner(), &fx.expected),
                first
            );
        }
    }

    #[test]
    fn rejects_garbage_certificate() {
        let mut fx = fixture(b"x");
        fx.record.certificate = vec![0xff, 0x00];
        let err = CertificateVerifier::default()
            .verify(&fx.record, &public(&fx.root_key), &owner(), &fx.expected)
            .unwrap_err();
        assert_eq!(err.kind(), "MalformedCertificate");
    }

    #[test]
    fn rejects_wrong_root_key() {
        let fx = fixture(b"x");
        let other = SigningKey::from_bytes([12; 32]);
        let err = CertificateVerifier::default()
            .verify(&fx.record, &public(&other), &owner(), &fx.expected)
            .unwrap_err();
        assert!(matches!(err, VerifyError::InvalidSignature(_)));
    }

    #[test]
    fn rejects_unknown_owner() {
        let fx = fixture(b"x");
        let stranger = OwnerId::from_raw(vec![1, 2, 3]).unwrap();
        let err = CertificateVerifier::default()
            .verify(&fx.record, &public(&fx.root_key), &stranger, &fx.expected)
            .unwrap_err();
        assert!(matches!(err, VerifyError::PathNotFound { .. }));
    }

    #[test]
    fn pruned_certified_path_is_not_found() {
        let root_key = SigningKey::from_bytes([11; 32]);
        let full = state_tree(&owner(), &Digest::from_hash([1; 32]));
        let pruned = full.witness(&[LABEL_TIME]);
        let certificate = Certificate::issue(pruned, &root_key, None);
        let err = committed_root(&certificate.tree, &owner()).unwrap_err();
        assert!(matches!(err, VerifyError::PathNotFound { .. }));
    }

    #[test]
    fn rejects_malformed_witness() {
        let mut fx = fixture(b"x");
        fx.record.witness = vec![0x83, 0x01];
        let err = CertificateVerifier::default()
            .verify(&fx.record, &public(&fx.root_key), &owner(), &fx.expected)
            .unwrap_err();
        assert!(matches!(err, VerifyError::MalformedWitness(_)));
    }

    #[test]
    fn rejects_substituted_witness() {
        let mut fx = fixture(b"x");
        let (_, other_tree) = data_tree(b"something else");
        fx.record.witness = other_tree.to_cbor().unwrap();
        let err = CertificateVerifier::default()
            .verify(&fx.record, &public(&fx.root_key), &owner(), &fx.expected)
            .unwrap_err();
        assert!(matches!(err, VerifyError::RootMismatch { .. }));
    }

    #[test]
    fn rejects_digest_not_in_witness() {
        let fx = fixture(b"x");
        let absent = dastree::hash(b"y");
        let err = CertificateVerifier::default()
            .verify(&fx.record, &public(&fx.root_key), &owner(), &absent)
            .unwrap_err();
        assert_eq!(err, VerifyError::DataNotIncluded(absent));
    }

    #[test]
    fn stale_certificate_is_rejected() {
        let fx = fixture(b"x");
        let verifier = CertificateVerifier::default().with_max_age(Duration::from_secs(300));
        let key = public(&fx.root_key);
        let fresh = CERTIFIED_AT + 10_000_000_000;
        assert!(verifier
            .verify_at(&fx.record, &key, &owner(), &fx.expected, fresh)
            .is_ok());
        let stale = CERTIFIED_AT + 301_000_000_000;
        let err = verifier
            .verify_at(&fx.record, &key, &owner(), &fx.expected, stale)
            .unwrap_err();
        assert!(matches!(err, VerifyError::InvalidSignature(_)));
        // Without a clock the age is not checked.
        assert!(verifier.verify(&fx.record, &key, &owner(), &fx.expected).is_ok());
    }

    fn delegated_fixture(ranges: &[(Vec<u8>, Vec<u8>)]) -> Fixture {
        let root_key = SigningKey::from_bytes([21; 32]);
        let subnet_key = SigningKey::from_bytes([22; 32]);
        let delegation = Delegation::issue(
            b"subnet-a".to_vec(),
            &public(&subnet_key),
            ranges,
            &root_key,
            CERTIFIED_AT,
        )
        .unwrap();
        let (expected, tree) = data_tree(b"delegated");
        let certificate = Certificate::issue(
            state_tree(&owner(), &tree.digest()),
            &subnet_key,
            Some(delegation),
        );
        Fixture {
            root_key,
            record: CertifiedRecord {
                certificate: certificate.encode().unwrap(),
                witness: tree.witness(&[expected.to_hex()]).to_cbor().unwrap(),
                data: b"delegated".to_vec(),
                owner: owner(),
            },
            expected,
        }
    }

    #[test]
    fn accepts_delegated_certificate() {
        let own = owner().as_bytes().to_vec();
        let fx = delegated_fixture(&[(own.clone(), own)]);
        let verified = CertificateVerifier::default()
            .verify(&fx.record, &public(&fx.root_key), &owner(), &fx.expected)
            .unwrap();
        assert!(verified.delegated);
    }

    #[test]
    fn rejects_owner_outside_delegated_ranges() {
        let fx = delegated_fixture(&[(vec![0x00], vec![0x01])]);
        let err = CertificateVerifier::default()
            .verify(&fx.record, &public(&fx.root_key), &owner(), &fx.expected)
            .unwrap_err();
        assert!(matches!(err, VerifyError::InvalidSignature(_)));
    }

    #[test]
    fn rejects_delegation_from_untrusted_root() {
        let fx = delegated_fixture(&[(vec![0x00], vec![0xff; 10])]);
        let stranger = SigningKey::from_bytes([23; 32]);
        let err = CertificateVerifier::default()
            .verify(&fx.record, &public(&stranger), &owner(), &fx.expected)
            .unwrap_err();
        assert!(matches!(err, VerifyError::InvalidSignature(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn tampered_witness_never_verifies(index in any::<prop::sample::Index>(), flip in 1u8..=255) {
            let fx = fixture(b"hello world");
            let mut record = fx.record.clone();
            let at = index.index(record.witness.len());
            record.witness[at] ^= flip;
            let result = CertificateVerifier::default()
                .verify(&record, &public(&fx.root_key), &owner(), &fx.expected);
            prop_assert!(matches!(
                result,
                Err(VerifyError::MalformedWitness(_)) | Err(VerifyError::RootMismatch { .. })
            ), "unexpected outcome {:?}", result);
        }
    }
}
