use serde::{Deserialize, Serialize};

use crate::owner::OwnerId;

/// A record fetched back from the ledger, not trusted until verified.
///
/// Constructed fresh per fetch and never mutated.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertifiedRecord {
    /// Signed certificate asserting the ledger's state root.
    pub certificate: Vec<u8>,
    /// Pruned tree proving inclusion under the owner's certified data.
    pub witness: Vec<u8>,
    /// The payload as returned by the ledger.
    pub data: Vec<u8>,
    /// The namespace the record is certified under.
    pub owner: OwnerId,
}

impl std::fmt::Debug for CertifiedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertifiedRecord")
            .field("certificate_len", &self.certificate.len())
            .field("witness_len", &self.witness.len())
            .field("data_len", &self.data.len())
            .field("owner", &self.owner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_shows_sizes_only() {
        let record = CertifiedRecord {
            certificate: vec![0; 10],
            witness: vec![0; 4],
            data: b"secret".to_vec(),
            owner: OwnerId::from_raw(vec![1]).unwrap(),
        };
        let debug = format!("{record:?}");
        assert!(debug.contains("data_len: 6"));
        assert!(!debug.contains("secret"));
    }
}
