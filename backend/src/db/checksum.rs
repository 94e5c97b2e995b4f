//! Checksums over canonical landmark content.

use sha2::{Digest, Sha256};

/// Calculate the SHA-256 checksum of `content` as lowercase hex.
pub fn calculate_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            calculate_checksum(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_landmark_content_changes_checksum() {
        let before = r#"[{"view":"ANTERIOR","landmarks":[{"name":"nose","x":0.5}]}]"#;
        let after = r#"[{"view":"ANTERIOR","landmarks":[{"name":"nose","x":0.51}]}]"#;
        assert_ne!(calculate_checksum(before), calculate_checksum(after));
        assert_eq!(calculate_checksum(before).len(), 64);
    }
}
