//! Data-availability tree hash.
//!
//! The payload is split into 64 KiB bins. Each bin becomes a leaf
//! `keccak(0xfe ∥ keccak(bin))`. Adjacent pairs are combined as
//! `keccak(0xff ∥ left ∥ right ∥ u32_be(bytes under))` until one node is left;
//! an odd node at the end of a layer moves up unchanged. The empty payload
//! hashes as a leaf over `keccak("")`.

use sha3::{Digest as _, Keccak256};

use cda_types::Digest;

/// Bytes per leaf.
pub const BIN_SIZE: usize = 64 * 1024;

const LEAF_BYTE: u8 = 0xfe;
const NODE_BYTE: u8 = 0xff;

struct Node {
    hash: [u8; 32],
    size: u32,
}

/// Root of the data-availability tree over `data`.
///
/// This is the content digest used as the ledger key and returned to
/// clients as `dataHash`.
pub fn hash(data: &[u8]) -> Digest {
    if data.is_empty() {
        return Digest::from_hash(leaf(&keccak(&[b""])));
    }

    let mut layer: Vec<Node> = data
        .chunks(BIN_SIZE)
        .map(|bin| Node {
            hash: leaf(&keccak(&[bin])),
            size: u32::try_from(bin.len()).unwrap_or(u32::MAX),
        })
        .collect();

    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
        let mut nodes = layer.into_iter();
        while let Some(left) = nodes.next() {
            match nodes.next() {
                Some(right) => {
                    let size = left.size.wrapping_add(right.size);
                    let hash = keccak(&[&[NODE_BYTE], &left.hash, &right.hash, &size.to_be_bytes()]);
                    next.push(Node { hash, size });
                }
                None => next.push(left),
            }
        }
        layer = next;
    }

    match layer.pop() {
        Some(root) => Digest::from_hash(root.hash),
        None => Digest::from_hash(leaf(&keccak(&[b""]))),
    }
}

/// Whether `data` hashes to `expected`.
pub fn verify(data: &[u8], expected: &Digest) -> bool {
    hash(data) == *expected
}

fn leaf(inner: &[u8; 32]) -> [u8; 32] {
    keccak(&[&[LEAF_BYTE], inner])
}

fn keccak(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_matches_known_vector() {
        assert_eq!(
            hex::encode(keccak(&[b""])),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn known_roots() {
        assert_eq!(
            hash(b"").to_hex(),
            "cd2717b64170dc19cfef3dedd2076c9f7457d4f534a998dd8236ffeb40214bf5"
        );
        assert_eq!(
            hash(b"hello world").to_hex(),
            "4a4f570299cce18693b692798e8df87647ec1623e761a8d18bbb290e45678aff"
        );
        let multi_bin = vec![7u8; BIN_SIZE * 2 + 100];
        assert_eq!(
            hash(&multi_bin).to_hex(),
            "8e0028c44fe54bad25de3cf597277926f7f68afbc2ca09266eb3d6b140aade6f"
        );
    }

    #[test]
    fn two_bins_pair_with_size() {
        let data = vec![1u8; BIN_SIZE + 1];
        let left = leaf(&keccak(&[&data[..BIN_SIZE]]));
        let right = leaf(&keccak(&[&data[BIN_SIZE..]]));
        let size = u32::try_from(data.len()).unwrap().to_be_bytes();
        let expected = keccak(&[&[NODE_BYTE], &left, &right, &size]);
        assert_eq!(hash(&data), Digest::from_hash(expected));
    }

    #[test]
    fn verify_detects_tampering() {
        let digest = hash(b"original");
        assert!(verify(b"original", &digest));
        assert!(!verify(b"tampered", &digest));
    }
}
