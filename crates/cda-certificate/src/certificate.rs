use std::collections::BTreeMap;

use integer_encoding::VarInt;
use serde_cbor::Value;

use cda_crypto::hashtree::{decode_value, encode_value};
use cda_crypto::{state_root_message, HashTree, Lookup, SigningKey};
use cda_types::Digest;

use crate::error::{VerifyError, VerifyResult};

const KEY_TREE: &str = "tree";
const KEY_SIGNATURE: &str = "signature";
const KEY_DELEGATION: &str = "delegation";
const KEY_SUBNET_ID: &str = "subnet_id";
const KEY_CERTIFICATE: &str = "certificate";

pub const LABEL_CANISTER: &[u8] = b"canister";
pub const LABEL_CERTIFIED_DATA: &[u8] = b"certified_data";
pub const LABEL_SUBNET: &[u8] = b"subnet";
pub const LABEL_PUBLIC_KEY: &[u8] = b"public_key";
pub const LABEL_CANISTER_RANGES: &[u8] = b"canister_ranges";
pub const LABEL_TIME: &[u8] = b"time";

/// A signed assertion of a state-tree root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    pub tree: HashTree,
    /// Signature over [`state_root_message`] of the tree's root digest.
    pub signature: Vec<u8>,
    pub delegation: Option<Delegation>,
}

/// Hands signing authority for a range of owners to a subnet key.
///
/// `certificate` is itself an encoded [`Certificate`] signed by the root
/// key; its tree carries the subnet's public key and owner ranges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delegation {
    pub subnet_id: Vec<u8>,
    pub certificate: Vec<u8>,
}

impl Certificate {
    /// Decode from CBOR.
    pub fn decode(bytes: &[u8]) -> VerifyResult<Self> {
        let value =
            decode_value(bytes).map_err(|e| VerifyError::MalformedCertificate(e.to_string()))?;
        let map = as_map(&value, "certificate")?;

        let tree = HashTree::from_value(required(map, KEY_TREE)?)
            .map_err(|e| VerifyError::MalformedCertificate(format!("tree: {e}")))?;
        let signature = as_bytes(required(map, KEY_SIGNATURE)?, KEY_SIGNATURE)?.to_vec();
        let delegation = match map.get(&text(KEY_DELEGATION)) {
            None | Some(Value::Null) => None,
            Some(value) => Some(Delegation::from_value(value)?),
        };

        Ok(Self {
            tree,
            signature,
            delegation,
        })
    }

    /// Encode as self-described CBOR.
    pub fn encode(&self) -> VerifyResult<Vec<u8>> {
        let mut map = BTreeMap::new();
        map.insert(text(KEY_TREE), self.tree.to_value());
        map.insert(text(KEY_SIGNATURE), Value::Bytes(self.signature.clone()));
        if let Some(delegation) = &self.delegation {
            map.insert(text(KEY_DELEGATION), delegation.to_value());
        }
        encode_value(&Value::Map(map)).map_err(|e| VerifyError::MalformedCertificate(e.to_string()))
    }

    /// Sign `tree` directly with `key`.
    pub fn issue(tree: HashTree, key: &SigningKey, delegation: Option<Delegation>) -> Self {
        let signature = key.sign(&state_root_message(&tree.digest())).to_bytes().to_vec();
        Self {
            tree,
            signature,
            delegation,
        }
    }

    /// Root digest of the certified tree.
    pub fn root(&self) -> Digest {
        self.tree.digest()
    }

    /// The certification time in nanoseconds, if the tree carries one.
    pub fn time_nanos(&self) -> VerifyResult<Option<u64>> {
        match self.tree.lookup_path(&[LABEL_TIME]) {
            Lookup::Found(bytes) => decode_time(bytes).map(Some),
            Lookup::Absent | Lookup::Unknown => Ok(None),
        }
    }
}

impl Delegation {
    /// Issue a delegation certificate, signed by the root key, that binds
    /// `subnet_key` to `subnet_id` for the given inclusive owner ranges.
    pub fn issue(
        subnet_id: Vec<u8>,
        subnet_key: &[u8],
        ranges: &[(Vec<u8>, Vec<u8>)],
        root_key: &SigningKey,
        time_nanos: u64,
    ) -> VerifyResult<Self> {
        let subnet_tree = HashTree::fork(
            HashTree::labeled(LABEL_CANISTER_RANGES, HashTree::leaf(encode_ranges(ranges)?)),
            HashTree::labeled(LABEL_PUBLIC_KEY, HashTree::leaf(subnet_key.to_vec())),
        );
        let tree = HashTree::fork(
            HashTree::labeled(
                LABEL_SUBNET,
                HashTree::labeled(subnet_id.clone(), subnet_tree),
            ),
            HashTree::labeled(LABEL_TIME, HashTree::leaf(encode_time(time_nanos))),
        );
        let certificate = Certificate::issue(tree, root_key, None).encode()?;
        Ok(Self {
            subnet_id,
            certificate,
        })
    }

    fn from_value(value: &Value) -> VerifyResult<Self> {
        let map = as_map(value, KEY_DELEGATION)?;
        Ok(Self {
            subnet_id: as_bytes(required(map, KEY_SUBNET_ID)?, KEY_SUBNET_ID)?.to_vec(),
            certificate: as_bytes(required(map, KEY_CERTIFICATE)?, KEY_CERTIFICATE)?.to_vec(),
        })
    }

    fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert(text(KEY_SUBNET_ID), Value::Bytes(self.subnet_id.clone()));
        map.insert(text(KEY_CERTIFICATE), Value::Bytes(self.certificate.clone()));
        Value::Map(map)
    }
}

/// Unsigned LEB128 nanoseconds, as stored under `time`.
pub fn encode_time(nanos: u64) -> Vec<u8> {
    nanos.encode_var_vec()
}

fn decode_time(bytes: &[u8]) -> VerifyResult<u64> {
    match u64::decode_var(bytes) {
        Some((nanos, read)) if read == bytes.len() => Ok(nanos),
        _ => Err(VerifyError::MalformedCertificate("time is not LEB128".into())),
    }
}

/// Encode owner ranges as a CBOR array of `[lo, hi]` byte-string pairs.
pub fn encode_ranges(ranges: &[(Vec<u8>, Vec<u8>)]) -> VerifyResult<Vec<u8>> {
    let value = Value::Array(
        ranges
            .iter()
            .map(|(lo, hi)| Value::Array(vec![Value::Bytes(lo.clone()), Value::Bytes(hi.clone())]))
            .collect(),
    );
    encode_value(&value).map_err(|e| VerifyError::MalformedCertificate(e.to_string()))
}

pub(crate) fn decode_ranges(bytes: &[u8]) -> VerifyResult<Vec<(Vec<u8>, Vec<u8>)>> {
    let malformed = |reason: &str| VerifyError::MalformedCertificate(format!("canister_ranges: {reason}"));
    let value = decode_value(bytes).map_err(|e| malformed(&e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(malformed("not an array"));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Array(pair) => match <[Value; 2]>::try_from(pair) {
                Ok([Value::Bytes(lo), Value::Bytes(hi)]) => Ok((lo, hi)),
                _ => Err(malformed("range is not a pair of byte strings")),
            },
            _ => Err(malformed("range is not an array")),
        })
        .collect()
}

fn text(key: &str) -> Value {
    Value::Text(key.to_string())
}

fn as_map<'a>(value: &'a Value, what: &str) -> VerifyResult<&'a BTreeMap<Value, Value>> {
    match value {
        Value::Map(map) => Ok(map),
        _ => Err(VerifyError::MalformedCertificate(format!("{what} is not a map"))),
    }
}

fn required<'a>(map: &'a BTreeMap<Value, Value>, key: &str) -> VerifyResult<&'a Value> {
    map.get(&text(key))
        .ok_or_else(|| VerifyError::MalformedCertificate(format!("missing field `{key}`")))
}

fn as_bytes<'a>(value: &'a Value, what: &str) -> VerifyResult<&'a [u8]> {
    match value {
        Value::Bytes(bytes) => Ok(bytes),
        _ => Err(VerifyError::MalformedCertificate(format!("{what} is not a byte string"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> HashTree {
        HashTree::fork(
            HashTree::labeled(LABEL_TIME, HashTree::leaf(encode_time(1_700_000_000_000_000_000))),
            HashTree::labeled("other", HashTree::Empty),
        )
    }

    #[test]
    fn encode_decode_roundtrip() {
        let key = SigningKey::from_bytes([1; 32]);
        let cert = Certificate::issue(sample_tree(), &key, None);
        let decoded = Certificate::decode(&cert.encode().unwrap()).unwrap();
        assert_eq!(decoded, cert);
        assert_eq!(decoded.root(), sample_tree().digest());
    }

    #[test]
    fn time_is_read_from_tree() {
        let key = SigningKey::from_bytes([1; 32]);
        let cert = Certificate::issue(sample_tree(), &key, None);
        assert_eq!(cert.time_nanos().unwrap(), Some(1_700_000_000_000_000_000));
    }

    #[test]
    fn missing_time_is_none() {
        let key = SigningKey::from_bytes([1; 32]);
        let cert = Certificate::issue(HashTree::Empty, &key, None);
        assert_eq!(cert.time_nanos().unwrap(), None);
    }

    #[test]
    fn delegation_roundtrip() {
        let root = SigningKey::from_bytes([2; 32]);
        let subnet = SigningKey::from_bytes([3; 32]);
        let delegation = Delegation::issue(
            b"subnet-1".to_vec(),
            &subnet.verifying_key().as_bytes(),
            &[(vec![0], vec![0xff])],
            &root,
            5,
        )
        .unwrap();
        let cert = Certificate::issue(sample_tree(), &subnet, Some(delegation.clone()));
        let decoded = Certificate::decode(&cert.encode().unwrap()).unwrap();
        assert_eq!(decoded.delegation, Some(delegation));
    }

    #[test]
    fn ranges_roundtrip() {
        let ranges = vec![(vec![0, 1], vec![0, 9]), (vec![5], vec![6])];
        let decoded = decode_ranges(&encode_ranges(&ranges).unwrap()).unwrap();
        assert_eq!(decoded, ranges);
    }

    #[test]
    fn rejects_non_map() {
        let bytes = encode_value(&Value::Array(vec![])).unwrap();
        assert!(matches!(
            Certificate::decode(&bytes),
            Err(VerifyError::MalformedCertificate(_))
        ));
    }

    #[test]
    fn rejects_missing_signature() {
        let mut map = BTreeMap::new();
        map.insert(text(KEY_TREE), HashTree::Empty.to_value());
        let bytes = encode_value(&Value::Map(map)).unwrap();
        let err = Certificate::decode(&bytes).unwrap_err();
        assert_eq!(
            err,
            VerifyError::MalformedCertificate("missing field `signature`".into())
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(Certificate::decode(b"not cbor at all").is_err());
    }
}
