use base64::Engine;
use sha2::{Digest, Sha256};

/// SHA-256 of the raw bytes, base64 encoded.
pub fn compute_content_hash(content: &[u8]) -> String {
    let hash = Sha256::digest(content);
    base64::engine::general_purpose::STANDARD.encode(hash)
}
