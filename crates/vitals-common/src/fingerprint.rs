//! MD5 content fingerprinting
//!
//! Every identity and integrity hash in the pipeline is MD5: published
//! artifacts are content-addressed by the MD5 of their serialized bytes,
//! fetched report documents are deduplicated by the MD5 of their raw bytes,
//! and object-store writes carry a base64 `Content-MD5` header.

use base64::{engine::general_purpose::STANDARD, Engine};

/// Hex-encoded MD5 digest, used for content-addressed keys and
/// report fingerprints.
pub fn hex_md5(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Base64-encoded raw MD5 digest in the form the `Content-MD5` request
/// header expects.
pub fn content_md5(data: &[u8]) -> String {
    STANDARD.encode(md5::compute(data).0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_md5() {
        assert_eq!(hex_md5(b"hello world"), "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(hex_md5(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_content_md5_is_base64_of_digest() {
        // md5("hello world") = 5eb63bbbe01eeed093cb22bb8f5acdc3
        assert_eq!(content_md5(b"hello world"), "XrY7u+Ae7tCTyyK7j1rNww==");
    }
}
