//! CBOR wire format for hash trees.
//!
//! Each node is a CBOR array whose first element is the node tag:
//! `[0]`, `[1, left, right]`, `[2, label, subtree]`, `[3, value]`,
//! `[4, digest]`. Encoded trees carry the CBOR self-describe prefix.

use serde_cbor::Value;

use cda_types::Digest;

use super::{HashTree, TreeError};

/// CBOR self-describe tag (55799).
pub const SELF_DESCRIBE: [u8; 3] = [0xd9, 0xd9, 0xf7];

const TAG_EMPTY: i128 = 0;
const TAG_FORK: i128 = 1;
const TAG_LABELED: i128 = 2;
const TAG_LEAF: i128 = 3;
const TAG_PRUNED: i128 = 4;

impl HashTree {
    /// Decode a tree from CBOR bytes.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, TreeError> {
        let value = decode_value(bytes)?;
        Self::from_value(&value)
    }

    /// Encode this tree as self-described CBOR.
    pub fn to_cbor(&self) -> Result<Vec<u8>, TreeError> {
        encode_value(&self.to_value())
    }

    /// Convert from an already-decoded CBOR value.
    pub fn from_value(value: &Value) -> Result<Self, TreeError> {
        let Value::Array(items) = value else {
            return Err(TreeError::Malformed("node is not an array".into()));
        };
        let (tag, fields) = match items.split_first() {
            Some((Value::Integer(tag), fields)) => (*tag, fields),
            _ => return Err(TreeError::Malformed("node tag is not an integer".into())),
        };
        match (tag, fields) {
            (TAG_EMPTY, []) => Ok(Self::Empty),
            (TAG_FORK, [left, right]) => {
                Ok(Self::fork(Self::from_value(left)?, Self::from_value(right)?))
            }
            (TAG_LABELED, [Value::Bytes(label), child]) => {
                Ok(Self::labeled(label.clone(), Self::from_value(child)?))
            }
            (TAG_LEAF, [Value::Bytes(value)]) => Ok(Self::leaf(value.clone())),
            (TAG_PRUNED, [Value::Bytes(digest)]) => Digest::from_slice(digest)
                .map(Self::Pruned)
                .map_err(|e| TreeError::Malformed(format!("pruned digest: {e}"))),
            (tag, fields) => Err(TreeError::Malformed(format!(
                "unexpected node: tag {tag} with {} fields",
                fields.len()
            ))),
        }
    }

    /// Convert to a CBOR value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Empty => Value::Array(vec![Value::Integer(TAG_EMPTY)]),
            Self::Fork(left, right) => Value::Array(vec![
                Value::Integer(TAG_FORK),
                left.to_value(),
                right.to_value(),
            ]),
            Self::Labeled(label, child) => Value::Array(vec![
                Value::Integer(TAG_LABELED),
                Value::Bytes(label.clone()),
                child.to_value(),
            ]),
            Self::Leaf(value) => {
                Value::Array(vec![Value::Integer(TAG_LEAF), Value::Bytes(value.clone())])
            }
            Self::Pruned(digest) => Value::Array(vec![
                Value::Integer(TAG_PRUNED),
                Value::Bytes(digest.as_bytes().to_vec()),
            ]),
        }
    }
}

/// Decode a CBOR document, accepting the self-describe prefix.
///
/// Any other semantic tag at the top level is rejected.
pub fn decode_value(bytes: &[u8]) -> Result<Value, TreeError> {
    let body = bytes.strip_prefix(&SELF_DESCRIBE).unwrap_or(bytes);
    match body.first() {
        None => return Err(TreeError::Cbor("empty input".into())),
        Some(first) if first >> 5 == 6 => {
            return Err(TreeError::Cbor("unexpected semantic tag".into()))
        }
        Some(_) => {}
    }
    serde_cbor::from_slice(body).map_err(|e| TreeError::Cbor(e.to_string()))
}

/// Encode a CBOR value with the self-describe prefix.
pub fn encode_value(value: &Value) -> Result<Vec<u8>, TreeError> {
    let body = serde_cbor::to_vec(value).map_err(|e| TreeError::Cbor(e.to_string()))?;
    let mut out = Vec::with_capacity(SELF_DESCRIBE.len() + body.len());
    out.extend_from_slice(&SELF_DESCRIBE);
    out.extend_from_slice(&body);
    Ok(out)
}
