use cda_types::Digest;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so inputs hashed under different domains never collide.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for trusted root key sets.
    pub const KEYSET: Self = Self {
        domain: "cda-keyset-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hash a sequence of chunks as if they were one contiguous buffer.
    pub fn hash_chunks<'a, I>(&self, chunks: I) -> Digest
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        for chunk in chunks {
            hasher.update(chunk);
        }
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Verify that data produces the expected digest.
    pub fn verify(&self, data: &[u8], expected: &Digest) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        assert_eq!(ContentHasher::KEYSET.hash(data), ContentHasher::KEYSET.hash(data));
    }

    #[test]
    fn different_domains_produce_different_hashes() {
        let data = b"same content";
        assert_ne!(
            ContentHasher::KEYSET.hash(data),
            ContentHasher::new("other-v1").hash(data)
        );
    }

    #[test]
    fn chunked_hash_matches_contiguous() {
        let whole = ContentHasher::KEYSET.hash(b"hello world");
        let parts: [&[u8]; 2] = [b"hello ", b"world"];
        assert_eq!(ContentHasher::KEYSET.hash_chunks(parts), whole);
    }

    #[test]
    fn verify_detects_tampering() {
        let digest = ContentHasher::KEYSET.hash(b"original");
        assert!(ContentHasher::KEYSET.verify(b"original", &digest));
        assert!(!ContentHasher::KEYSET.verify(b"tampered", &digest));
    }

    #[test]
    fn custom_domain() {
        let hasher = ContentHasher::new("my-custom-domain-v1");
        assert_eq!(hasher.domain(), "my-custom-domain-v1");
        assert_ne!(hasher.hash(b"data"), ContentHasher::KEYSET.hash(b"data"));
    }
}
