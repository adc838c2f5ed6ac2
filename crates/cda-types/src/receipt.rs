use serde::{Deserialize, Serialize};

use crate::digest::Digest;

/// Receipt format version.
pub const RECEIPT_VERSION: u64 = 1;

/// Acknowledgment returned once a batch's payload has been stored and the
/// ledger's certificate for it has been verified.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    /// Content digest of the assembled payload.
    pub digest: Digest,
    /// Timeout hint supplied when the batch was opened.
    pub timeout: u64,
    /// Bitmask of the backends whose certificate was verified.
    pub signers_mask: u64,
    /// Digest of the trusted root key set.
    pub keyset_digest: Digest,
    /// Certificate bytes that authenticated the commit.
    pub signature: Vec<u8>,
    /// Receipt format version.
    pub version: u64,
    /// Certification time reported by the ledger, in nanoseconds.
    pub certified_at_nanos: Option<u64>,
}

impl CommitReceipt {
    /// Short display form: digest prefix and version.
    pub fn summary(&self) -> String {
        format!("{} v{}", self.digest.short_hex(), self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_roundtrip() {
        let receipt = CommitReceipt {
            digest: Digest::from_hash([1; 32]),
            timeout: 300,
            signers_mask: 1,
            keyset_digest: Digest::from_hash([2; 32]),
            signature: vec![0xde, 0xad],
            version: RECEIPT_VERSION,
            certified_at_nanos: Some(7),
        };
        let json = serde_json::to_string(&receipt).unwrap();
        let parsed: CommitReceipt = serde_json::from_str(&json).unwrap();
        assert_eq!(receipt, parsed);
        assert_eq!(parsed.summary(), "01010101 v1");
    }
}
