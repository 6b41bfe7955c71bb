use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use rand::rngs::OsRng;

/// The size of a session identifier in bytes.
pub const SESSION_ID_SIZE: usize = 32;
/// The size of a single-request CSRF token in bytes.
const CSRF_TOKEN_SIZE: usize = 32;
/// The size of a CSP nonce in bytes.
const NONCE_SIZE: usize = 16;

/// Fills a buffer of `len` bytes from the OS RNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// URL-safe base64 of `len` random bytes.
pub fn random_token(len: usize) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(random_bytes(len))
}

/// Generates a new session identifier.
///
/// The identifier only needs to be unguessable: it is never decrypted and
/// carries no data, so 256 bits of randomness stand in for the wrapped form.
pub fn generate_session_id() -> String {
    random_token(SESSION_ID_SIZE)
}

/// Generates a new random single-request CSRF token.
pub fn generate_csrf_token() -> String {
    random_token(CSRF_TOKEN_SIZE)
}

/// Generates a CSP nonce.
pub fn generate_nonce() -> String {
    random_token(NONCE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique_and_url_safe() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
