use std::fmt;
use std::str::FromStr;

use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Identity of the namespace under which data is certified by the ledger.
///
/// The raw form is an opaque byte string of at most 29 bytes; it is the
/// label used in the certificate path `canister/<owner>/certified_data`.
/// The textual form is the checksummed, dash-grouped base32 encoding used
/// by the ledger (for example `bkyz2-fmaaa-aaaaa-qaaaq-cai`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId {
    raw: Vec<u8>,
}

impl OwnerId {
    /// Maximum raw length accepted by the ledger.
    pub const MAX_LEN: usize = 29;

    /// Create from raw bytes.
    pub fn from_raw(raw: impl Into<Vec<u8>>) -> Result<Self, TypeError> {
        let raw = raw.into();
        if raw.len() > Self::MAX_LEN {
            return Err(TypeError::InvalidOwner(format!(
                "raw identity is {} bytes, max {}",
                raw.len(),
                Self::MAX_LEN
            )));
        }
        Ok(Self { raw })
    }

    /// The raw identity bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Parse the textual form, validating the embedded checksum.
    pub fn from_text(text: &str) -> Result<Self, TypeError> {
        let compact: String = text.chars().filter(|c| *c != '-').collect();
        let bytes = BASE32_NOPAD
            .decode(compact.to_ascii_uppercase().as_bytes())
            .map_err(|e| TypeError::InvalidOwner(format!("not base32: {text}: {e}")))?;
        if bytes.len() < 4 {
            return Err(TypeError::InvalidOwner(format!("too short: {text}")));
        }
        let (checksum, raw) = bytes.split_at(4);
        let owner = Self::from_raw(raw.to_vec())?;
        if checksum != crc32fast::hash(raw).to_be_bytes() {
            return Err(TypeError::InvalidOwner(format!("checksum mismatch: {text}")));
        }
        if owner.to_text() != text.to_ascii_lowercase() {
            return Err(TypeError::InvalidOwner(format!("non-canonical text: {text}")));
        }
        Ok(owner)
    }

    /// Render the textual form.
    pub fn to_text(&self) -> String {
        let mut bytes = crc32fast::hash(&self.raw).to_be_bytes().to_vec();
        bytes.extend_from_slice(&self.raw);
        let encoded = BASE32_NOPAD.encode(&bytes).to_ascii_lowercase();
        let groups: Vec<&str> = encoded
            .as_bytes()
            .chunks(5)
            .filter_map(|group| std::str::from_utf8(group).ok())
            .collect();
        groups.join("-")
    }
}

impl FromStr for OwnerId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({})", self.to_text())
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl Serialize for OwnerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_text())
    }
}

impl<'de> Deserialize<'de> for OwnerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_text(&text).map_err(serde::de::Error::custom)
    }
}
