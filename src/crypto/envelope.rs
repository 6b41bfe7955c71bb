//! Per-user RSA keypairs and the hybrid envelope that binds an access token
//! to one user record.
//!
//! RSA-OAEP-SHA256 under a 2048-bit key carries at most 190 bytes, less than
//! a signed access token, so the token is sealed with a one-off AES-256-GCM
//! key and only that key is wrapped with RSA:
//!
//! `base64url(u16_be wrapped_len ‖ wrapped_key ‖ nonce ‖ ciphertext)`

use base64::{Engine as _, engine::general_purpose};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::aes::{self, SecureKey, KEY_SIZE};
use crate::error::AppError;

/// Modulus size for newly provisioned user keys.
pub const RSA_KEY_BITS: usize = 2048;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    #[error("malformed envelope")]
    Malformed,
    #[error("envelope failed to open")]
    Open,
    #[error("envelope sealing failed: {0}")]
    Seal(String),
}

impl From<EnvelopeError> for AppError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Malformed | EnvelopeError::Open => {
                AppError::Unauthorized("invalid access token".to_string())
            }
            other => AppError::Encryption(other.to_string()),
        }
    }
}

/// PEM-encoded keypair as persisted on the user record.
pub struct RsaKeyPair {
    /// SPKI `PUBLIC KEY` PEM.
    pub public_pem: String,
    /// PKCS#1 `RSA PRIVATE KEY` PEM.
    pub private_pem: Zeroizing<String>,
}

/// Generates a new keypair. CPU heavy: call from a blocking task.
pub fn generate_keypair(bits: usize) -> Result<RsaKeyPair, EnvelopeError> {
    let private_key = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| EnvelopeError::KeyGeneration(e.to_string()))?;

    let private_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| EnvelopeError::KeyGeneration(e.to_string()))?;

    let public_pem = RsaPublicKey::from(&private_key)
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| EnvelopeError::KeyGeneration(e.to_string()))?;

    Ok(RsaKeyPair {
        public_pem,
        private_pem,
    })
}

/// Seals `message` so only the holder of the matching private key can read it.
pub fn seal_for(public_pem: &str, message: &[u8]) -> Result<String, EnvelopeError> {
    let public_key = RsaPublicKey::from_public_key_pem(public_pem)
        .map_err(|e| EnvelopeError::InvalidKey(e.to_string()))?;

    let content_key = aes::generate_key();
    let wrapped = public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), content_key.as_bytes())
        .map_err(|e| EnvelopeError::Seal(e.to_string()))?;
    let body = aes::seal(&content_key, message).map_err(|e| EnvelopeError::Seal(e.to_string()))?;

    let wrapped_len = u16::try_from(wrapped.len()).map_err(|_| EnvelopeError::Seal("wrapped key too large".into()))?;

    let mut out = Vec::with_capacity(2 + wrapped.len() + body.len());
    out.extend_from_slice(&wrapped_len.to_be_bytes());
    out.extend_from_slice(&wrapped);
    out.extend_from_slice(&body);

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(out))
}

/// Opens an envelope produced by [`seal_for`].
pub fn open_with(private_pem: &str, envelope: &str) -> Result<Vec<u8>, EnvelopeError> {
    let raw = general_purpose::URL_SAFE_NO_PAD
        .decode(envelope)
        .map_err(|_| EnvelopeError::Malformed)?;

    if raw.len() < 2 {
        return Err(EnvelopeError::Malformed);
    }
    let wrapped_len = u16::from_be_bytes([raw[0], raw[1]]) as usize;
    let rest = &raw[2..];
    if rest.len() < wrapped_len {
        return Err(EnvelopeError::Malformed);
    }
    let (wrapped, body) = rest.split_at(wrapped_len);

    let private_key = RsaPrivateKey::from_pkcs1_pem(private_pem)
        .map_err(|e| EnvelopeError::InvalidKey(e.to_string()))?;

    let key_bytes = Zeroizing::new(
        private_key
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|_| EnvelopeError::Open)?,
    );
    let key_array: [u8; KEY_SIZE] = key_bytes
        .as_slice()
        .try_into()
        .map_err(|_| EnvelopeError::Open)?;
    let content_key = SecureKey::new(key_array);

    aes::open(&content_key, body).map_err(|_| EnvelopeError::Open)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::LazyLock;

    static KEYS: LazyLock<(RsaKeyPair, RsaKeyPair)> = LazyLock::new(|| {
        (
            generate_keypair(RSA_KEY_BITS).unwrap(),
            generate_keypair(RSA_KEY_BITS).unwrap(),
        )
    });

    #[test]
    fn opens_long_messages_with_matching_key() {
        let (owner, _) = &*KEYS;
        let message = "x".repeat(600);
        let envelope = seal_for(&owner.public_pem, message.as_bytes()).unwrap();
        assert_eq!(open_with(&owner.private_pem, &envelope).unwrap(), message.as_bytes());
    }

    #[test]
    fn other_private_key_cannot_open() {
        let (owner, other) = &*KEYS;
        let envelope = seal_for(&owner.public_pem, b"access").unwrap();
        assert!(matches!(
            open_with(&other.private_pem, &envelope),
            Err(EnvelopeError::Open)
        ));
    }

    #[test]
    fn truncated_envelope_is_malformed() {
        let (owner, _) = &*KEYS;
        let envelope = seal_for(&owner.public_pem, b"access").unwrap();
        let raw = general_purpose::URL_SAFE_NO_PAD.decode(&envelope).unwrap();
        let truncated = general_purpose::URL_SAFE_NO_PAD.encode(&raw[..40]);
        assert!(matches!(
            open_with(&owner.private_pem, &truncated),
            Err(EnvelopeError::Malformed)
        ));
    }
}
