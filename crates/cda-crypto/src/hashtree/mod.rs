//! Labeled, prunable hash tree.
//!
//! The same structure is used for the full state tree inside a certificate
//! and for the pruned witnesses served next to data. Only the root digest of
//! a tree is ever signed, so [`HashTree::digest`] must reproduce the
//! backend's hashing convention bit for bit:
//!
//! | node                  | digest                                           |
//! |-----------------------|--------------------------------------------------|
//! | `Empty`               | `H(sep("empty"))`                                |
//! | `Fork(l, r)`          | `H(sep("fork") ‖ digest(l) ‖ digest(r))`         |
//! | `Labeled(label, t)`   | `H(sep("labeled") ‖ label ‖ digest(t))`          |
//! | `Leaf(v)`             | `H(sep("leaf") ‖ v)`                             |
//! | `Pruned(d)`           | `d`                                              |
//!
//! where `H` is SHA-256 and `sep(s)` is a length byte followed by
//! `"ic-hashtree-" ‖ s`.

pub mod encoding;

use sha2::{Digest as _, Sha256};
use thiserror::Error;

use cda_types::Digest;

pub use encoding::{decode_value, encode_value, SELF_DESCRIBE};

const DOMAIN_PREFIX: &[u8] = b"ic-hashtree-";

/// Errors from decoding a hash tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("cbor error: {0}")]
    Cbor(String),

    #[error("malformed hash tree: {0}")]
    Malformed(String),
}

/// A node of the hash tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HashTree {
    Empty,
    Fork(Box<HashTree>, Box<HashTree>),
    Labeled(Vec<u8>, Box<HashTree>),
    Leaf(Vec<u8>),
    /// A subtree whose content was elided; only its digest is known.
    Pruned(Digest),
}

/// Outcome of a path lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// The path ends at a leaf with this value.
    Found(&'a [u8]),
    /// The tree proves the path does not exist.
    Absent,
    /// The path runs into a pruned subtree.
    Unknown,
}

impl<'a> Lookup<'a> {
    /// The leaf value, if found.
    pub fn value(self) -> Option<&'a [u8]> {
        match self {
            Self::Found(value) => Some(value),
            Self::Absent | Self::Unknown => None,
        }
    }
}

enum SubtreeLookup<'a> {
    Found(&'a HashTree),
    Absent,
    Unknown,
}

impl HashTree {
    pub fn fork(left: HashTree, right: HashTree) -> Self {
        Self::Fork(Box::new(left), Box::new(right))
    }

    pub fn labeled(label: impl Into<Vec<u8>>, child: HashTree) -> Self {
        Self::Labeled(label.into(), Box::new(child))
    }

    pub fn leaf(value: impl Into<Vec<u8>>) -> Self {
        Self::Leaf(value.into())
    }

    pub fn pruned(digest: Digest) -> Self {
        Self::Pruned(digest)
    }

    /// Reconstruct the root digest bottom-up.
    pub fn digest(&self) -> Digest {
        match self {
            Self::Empty => domain_hash("empty", &[]),
            Self::Fork(left, right) => {
                let (l, r) = (left.digest(), right.digest());
                domain_hash("fork", &[l.as_bytes(), r.as_bytes()])
            }
            Self::Labeled(label, child) => {
                let c = child.digest();
                domain_hash("labeled", &[label, c.as_bytes()])
            }
            Self::Leaf(value) => domain_hash("leaf", &[value]),
            Self::Pruned(digest) => *digest,
        }
    }

    /// Look up the leaf at `path`, a sequence of exact-match labels.
    ///
    /// Forks are searched on both sides. Running into a `Pruned` node on the
    /// path yields [`Lookup::Unknown`].
    pub fn lookup_path<P: AsRef<[u8]>>(&self, path: &[P]) -> Lookup<'_> {
        let mut node = self;
        for label in path {
            node = match find_label(node, label.as_ref()) {
                SubtreeLookup::Found(child) => child,
                SubtreeLookup::Absent => return Lookup::Absent,
                SubtreeLookup::Unknown => return Lookup::Unknown,
            };
        }
        match node {
            Self::Leaf(value) => Lookup::Found(value),
            Self::Pruned(_) => Lookup::Unknown,
            Self::Empty | Self::Fork(..) | Self::Labeled(..) => Lookup::Absent,
        }
    }

    /// Every `(path, value)` pair reachable through non-pruned nodes.
    pub fn all_paths(&self) -> Vec<(Vec<Vec<u8>>, &[u8])> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        collect_paths(self, &mut prefix, &mut out);
        out
    }

    /// A copy of this tree that keeps `path` (and everything under it)
    /// visible and replaces every other subtree with its digest.
    ///
    /// The result has the same digest as `self`.
    pub fn witness<P: AsRef<[u8]>>(&self, path: &[P]) -> HashTree {
        let Some((head, rest)) = path.split_first() else {
            return self.clone();
        };
        match self {
            Self::Empty => Self::Empty,
            Self::Pruned(digest) => Self::Pruned(*digest),
            Self::Leaf(_) => Self::Pruned(self.digest()),
            Self::Labeled(label, child) if label.as_slice() == head.as_ref() => {
                Self::labeled(label.clone(), child.witness(rest))
            }
            Self::Labeled(..) => Self::Pruned(self.digest()),
            Self::Fork(left, right) => {
                match (left.witness(path), right.witness(path)) {
                    (Self::Pruned(_), Self::Pruned(_)) => Self::Pruned(self.digest()),
                    (l, r) => Self::fork(l, r),
                }
            }
        }
    }

    /// Build a balanced tree of `label → leaf` entries.
    ///
    /// Entries are sorted by label so the shape (and digest) is independent
    /// of input order. An empty input yields `Empty`.
    pub fn from_entries<L, V, I>(entries: I) -> HashTree
    where
        L: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
        I: IntoIterator<Item = (L, V)>,
    {
        let mut nodes: Vec<(Vec<u8>, HashTree)> = entries
            .into_iter()
            .map(|(label, value)| {
                let label = label.into();
                (label.clone(), HashTree::labeled(label, HashTree::leaf(value)))
            })
            .collect();
        nodes.sort_by(|a, b| a.0.cmp(&b.0));
        balanced(nodes.into_iter().map(|(_, node)| node).collect())
    }
}

fn balanced(mut nodes: Vec<HashTree>) -> HashTree {
    match nodes.len() {
        0 => HashTree::Empty,
        1 => nodes.remove(0),
        n => {
            let right = nodes.split_off(n / 2);
            HashTree::fork(balanced(nodes), balanced(right))
        }
    }
}

fn find_label<'a>(node: &'a HashTree, label: &[u8]) -> SubtreeLookup<'a> {
    match node {
        HashTree::Labeled(l, child) if l.as_slice() == label => SubtreeLookup::Found(child),
        HashTree::Labeled(..) | HashTree::Leaf(_) | HashTree::Empty => SubtreeLookup::Absent,
        HashTree::Pruned(_) => SubtreeLookup::Unknown,
        HashTree::Fork(left, right) => match find_label(left, label) {
            SubtreeLookup::Found(child) => SubtreeLookup::Found(child),
            left_miss => match (left_miss, find_label(right, label)) {
                (_, SubtreeLookup::Found(child)) => SubtreeLookup::Found(child),
                (SubtreeLookup::Unknown, _) | (_, SubtreeLookup::Unknown) => {
                    SubtreeLookup::Unknown
                }
                _ => SubtreeLookup::Absent,
            },
        },
    }
}

fn collect_paths<'a>(
    node: &'a HashTree,
    prefix: &mut Vec<Vec<u8>>,
    out: &mut Vec<(Vec<Vec<u8>>, &'a [u8])>,
) {
    match node {
        HashTree::Empty | HashTree::Pruned(_) => {}
        HashTree::Fork(left, right) => {
            collect_paths(left, prefix, out);
            collect_paths(right, prefix, out);
        }
        HashTree::Labeled(label, child) => {
            prefix.push(label.clone());
            collect_paths(child, prefix, out);
            prefix.pop();
        }
        HashTree::Leaf(value) => out.push((prefix.clone(), value.as_slice())),
    }
}

/// Length-prefixed domain separator for a node kind.
fn domain_sep(kind: &str) -> Vec<u8> {
    let len = DOMAIN_PREFIX.len() + kind.len();
    let mut sep = Vec::with_capacity(len + 1);
    sep.push(len as u8);
    sep.extend_from_slice(DOMAIN_PREFIX);
    sep.extend_from_slice(kind.as_bytes());
    sep
}

fn domain_hash(kind: &str, parts: &[&[u8]]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(domain_sep(kind));
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    Digest::from_hash(out)
}
