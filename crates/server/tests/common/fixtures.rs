//! Test fixtures for generating test data.

use bytes::Bytes;
use sha2::{Digest, Sha256};

/// Raw admin token matching `AdminConfig::for_testing`.
#[allow(dead_code)]
pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";

/// Compute SHA-256 hash of data as hex string.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn sha256_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    result.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Smallest body that passes the JPEG magic-byte check.
#[allow(dead_code)]
pub fn jpeg_bytes(len: usize) -> Bytes {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.resize(len.max(4), 0x42);
    Bytes::from(data)
}

/// PNG signature followed by padding.
#[allow(dead_code)]
pub fn png_bytes() -> Bytes {
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.extend_from_slice(&[0u8; 16]);
    Bytes::from(data)
}

/// Public URL the server writes for `key` in `bucket` with default config.
#[allow(dead_code)]
pub fn public_url(bucket: &str, key: &str) -> String {
    format!("http://127.0.0.1:8080/files/{bucket}/{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_token_hash_matches_config() {
        assert_eq!(
            sha256_hash(TEST_ADMIN_TOKEN.as_bytes()),
            farmgate_core::config::AdminConfig::for_testing().token_hash
        );
    }
}
