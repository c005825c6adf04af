use sha2::{Digest, Sha512Trunc256};

use proto::crypto::HashResult;

pub struct Hasher {
    inner: Sha512Trunc256,
}

impl Hasher {
    pub fn new() -> Self {
        Self {
            inner: Sha512Trunc256::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    pub fn chain(mut self, data: &[u8]) -> Self {
        self.inner.update(data);
        self
    }

    pub fn finalize(&self) -> HashResult {
        let digest_res = self.inner.clone().finalize();

        let mut inner = [0x00; HashResult::len()];
        inner.copy_from_slice(digest_res.as_ref());

        HashResult::from(&inner)
    }
}

/// Calculate SHA512/256 over the given data.
pub fn hash_buffer(data: &[u8]) -> HashResult {
    Hasher::new().update(data).finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_basic() {
        let data = b"This is a test!";

        let hash_res = hash_buffer(&data[..]);
        // Stable across calls, sensitive to input:
        assert_eq!(hash_res, hash_buffer(&data[..]));
        assert_ne!(hash_res, hash_buffer(b"This is a test?"));
    }

    #[test]
    fn test_hasher_chain_matches_update() {
        let chained = Hasher::new().chain(b"ab").chain(b"cd").finalize();
        let mut hasher = Hasher::new();
        hasher.update(b"ab").update(b"cd");
        assert_eq!(chained, hasher.finalize());
        assert_eq!(chained, hash_buffer(b"abcd"));
    }
}
