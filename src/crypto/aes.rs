use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use aes_gcm::aead::rand_core::RngCore;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// The size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Failure modes of [`open`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum OpenError {
    /// Shorter than a nonce plus a tag.
    #[error("sealed data too short")]
    TooShort,
    /// Wrong key, tampered data or a different cipher.
    #[error("authentication failed")]
    Authentication,
}

/// A secure key wrapper that ensures the key is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureKey([u8; KEY_SIZE]);

impl SecureKey {
    /// Creates a new `SecureKey` from a byte array.
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self(key)
    }

    /// Returns a reference to the key as a byte slice.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// Generates a new random AES-256 key.
pub fn generate_key() -> SecureKey {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    SecureKey::new(key)
}

/// Generates a new random AES-GCM nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypts `plaintext` under a fresh nonce and returns `nonce ‖ ciphertext`.
///
/// # Arguments
///
/// * `key` - The AES-256 key.
/// * `plaintext` - The data to encrypt.
pub fn seal(key: &SecureKey, plaintext: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from(nonce_bytes);

    let ciphertext = cipher.encrypt(&nonce, plaintext)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Reverses [`seal`]: splits off the leading nonce and authenticates the rest.
pub fn open(key: &SecureKey, sealed: &[u8]) -> Result<Vec<u8>, OpenError> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(OpenError::TooShort);
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| OpenError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_prepends_a_fresh_nonce() {
        let key = generate_key();
        let a = seal(&key, b"payload").unwrap();
        let b = seal(&key, b"payload").unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_eq!(open(&key, &a).unwrap(), b"payload");
    }

    #[test]
    fn open_rejects_other_key_and_short_input() {
        let sealed = seal(&generate_key(), b"payload").unwrap();
        assert_eq!(open(&generate_key(), &sealed), Err(OpenError::Authentication));
        assert_eq!(open(&generate_key(), &sealed[..4]), Err(OpenError::TooShort));
    }

    #[test]
    fn nonce_without_room_for_a_tag_is_too_short() {
        let key = generate_key();
        let sealed = seal(&key, b"").unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + TAG_SIZE);
        assert_eq!(open(&key, &sealed).unwrap(), b"");

        for len in [NONCE_SIZE, NONCE_SIZE + 1, NONCE_SIZE + TAG_SIZE - 1] {
            assert_eq!(open(&key, &vec![0u8; len]), Err(OpenError::TooShort), "len {}", len);
        }
    }
}
