//! Opaque secret generation and hashing.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// 32 random bytes (256 bits), base64url-encoded without padding.
fn generate_opaque_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rand::Rng::random(&mut rng);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a fresh refresh secret. Only its hash is persisted.
pub fn generate_refresh_secret() -> String {
    generate_opaque_token()
}

/// Generate a one-time nonce value.
pub fn generate_nonce() -> String {
    generate_opaque_token()
}

/// SHA-256 hash of a raw refresh secret, hex-encoded.
///
/// This is the value stored as `session.refresh_secret_hash`.
pub fn hash_refresh_secret(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Shorten an identifier or secret for logging.
pub fn redact(value: &str) -> String {
    let prefix: String = value.chars().take(8).collect();
    format!("{prefix}…")
}
