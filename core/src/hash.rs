use sha2::{Digest, Sha256};

/// SHA-256 over the raw bytes of a page body (text is encoded as UTF-8
/// first).
pub fn content_hash(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// A 64-bit simhash over whitespace-separated tokens. Each token is hashed
/// with MD5; for every bit position the token's hash contributes +1 if the
/// bit is set, -1 otherwise, and the final bit is 1 iff the accumulator is
/// positive.
pub fn simhash(text: &str, size: u32) -> u64 {
    debug_assert!(size <= 64);
    let mut acc = vec![0i64; size as usize];
    for token in text.split_whitespace() {
        let digest = md5::compute(token.as_bytes());
        let value = u128::from_be_bytes({
            let mut buf = [0u8; 16];
            buf.copy_from_slice(&digest.0);
            buf
        });
        for (i, slot) in acc.iter_mut().enumerate() {
            if (value >> i) & 1 == 1 {
                *slot += 1;
            } else {
                *slot -= 1;
            }
        }
    }
    let mut result: u64 = 0;
    for (i, slot) in acc.iter().enumerate() {
        if *slot > 0 {
            result |= 1 << i;
        }
    }
    result
}

/// Hamming distance between two simhash values.
pub fn simhash_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_symmetric() {
        let a = simhash("the quick brown fox", 64);
        let b = simhash("a slow red fox", 64);
        assert_eq!(simhash_distance(a, b), simhash_distance(b, a));
    }

    #[test]
    fn distance_is_zero_for_equal_content() {
        let a = simhash("identical text here", 64);
        let b = simhash("identical text here", 64);
        assert_eq!(simhash_distance(a, b), 0);
    }

    #[test]
    fn content_hash_is_deterministic() {
        assert_eq!(content_hash(b"hello"), content_hash(b"hello"));
        assert_ne!(content_hash(b"hello"), content_hash(b"world"));
    }
}
