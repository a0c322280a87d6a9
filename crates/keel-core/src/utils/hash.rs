//! Blake3 hashing utilities for installed-file digests.

use crate::error::{KeelError, KeelResult};

/// Compute Blake3 hash of data
pub fn blake3_hash(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    hash.to_hex().to_string()
}

/// Compute Blake3 hash of a file
pub fn blake3_hash_file(path: &std::path::Path) -> KeelResult<String> {
    let data = std::fs::read(path)
        .map_err(|e| KeelError::io(format!("Failed to read file: {}", path.display()), e))?;
    Ok(blake3_hash(&data))
}

/// Check whether a file still has the digest recorded at install time
pub fn file_matches_digest(path: &std::path::Path, expected: &str) -> KeelResult<bool> {
    Ok(blake3_hash_file(path)? == expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_blake3_hash() {
        let hash = blake3_hash(b"hello world");

        assert_eq!(hash.len(), 64); // 32 bytes = 64 hex chars
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, blake3_hash(b"hello world"));
    }

    #[test]
    fn test_blake3_hash_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"test file content").unwrap();

        let hash = blake3_hash_file(file.path()).unwrap();
        assert_eq!(hash, blake3_hash(b"test file content"));
        assert!(file_matches_digest(file.path(), &hash).unwrap());
        assert!(!file_matches_digest(file.path(), &blake3_hash(b"other")).unwrap());
    }
}
