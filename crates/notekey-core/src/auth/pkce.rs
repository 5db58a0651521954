use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

fn random_url_safe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generates a random PKCE code verifier.
///
/// 48 random bytes give a 64-character URL-safe string (RFC 7636 allows 43-128).
pub fn generate_code_verifier() -> String {
    random_url_safe(48)
}

/// `BASE64URL(SHA256(verifier))`, the S256 code challenge.
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Random anti-CSRF `state` value (16 bytes, 22 characters).
pub fn generate_state() -> String {
    random_url_safe(16)
}

/// Random OIDC `nonce`, echoed back inside the ID token.
pub fn generate_nonce() -> String {
    random_url_safe(16)
}
