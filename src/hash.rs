//! Content hashing for rendered artifacts.
//!
//! The per-artifact hash is a plain SHA-256 of the content bytes. The
//! per-service combined hash is a left-fold over the per-artifact hashes in
//! emission order, folding each step's hex digest (not raw bytes) into the
//! next `SHA-256` call. This differs from a straight concatenation fold and
//! must be preserved exactly for compatibility with the external artifact
//! store.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `content`.
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Folds per-artifact hashes (in emission order) into one combined hash:
/// `h0 = hash0`, `hn = SHA-256(hex(h_{n-1}) ++ hex(hashn))`.
///
/// Returns an empty string if `hashes` is empty; callers are not expected
/// to fold a service with zero artifacts.
pub fn combined_hash<'a>(hashes: impl IntoIterator<Item = &'a str>) -> String {
    let mut iter = hashes.into_iter();
    let Some(first) = iter.next() else {
        return String::new();
    };

    let mut acc = first.to_owned();
    for next in iter {
        let mut hasher = Sha256::new();
        hasher.update(acc.as_bytes());
        hasher.update(next.as_bytes());
        acc = hex::encode(hasher.finalize());
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic() {
        assert_eq!(content_hash(b"hello"), content_hash(b"hello"));
    }

    #[test]
    fn content_hash_matches_known_vector() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn single_artifact_combined_hash_equals_its_own_hash() {
        let h = content_hash(b"only");
        assert_eq!(combined_hash([h.as_str()]), h);
    }

    #[test]
    fn combined_hash_differs_from_naive_concatenation() {
        let a = content_hash(b"a");
        let b = content_hash(b"b");
        let folded = combined_hash([a.as_str(), b.as_str()]);

        let mut hasher = Sha256::new();
        hasher.update(a.as_bytes());
        hasher.update(b.as_bytes());
        let expected = hex::encode(hasher.finalize());

        assert_eq!(folded, expected);
    }

    #[test]
    fn empty_input_yields_empty_string() {
        assert_eq!(combined_hash(std::iter::empty()), "");
    }
}
