//! Stateless sealed tokens: `base64url(nonce ‖ AES-GCM(client_ip ":" issued_nanos))`.
//!
//! A token is valid when it authenticates under the current secret, is no
//! older than the kind's TTL and names the same client IP that presents it.
//! Nothing is stored server-side.

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use crate::crypto::aes::{self, OpenError};
use crate::crypto::secret_store::SecretStore;
use crate::error::AppError;

/// The three sealed token families and their transport names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SealedKind {
    /// Anti-forgery token for state-changing requests.
    Csrf,
    /// Resource-access token for reads.
    Rsp,
    /// Nonce token for document rendering.
    Nonce,
}

impl SealedKind {
    pub fn cookie_name(self) -> &'static str {
        match self {
            SealedKind::Csrf => "_csrf",
            SealedKind::Rsp => "_rsp",
            SealedKind::Nonce => "_nonce",
        }
    }

    pub fn header_name(self) -> &'static str {
        match self {
            SealedKind::Csrf => "x-csrf-token",
            SealedKind::Rsp => "x-rsp-token",
            SealedKind::Nonce => "x-nonce",
        }
    }

    /// Max age of a token, also used as the cookie `Max-Age`.
    pub fn ttl(self) -> TimeDelta {
        match self {
            SealedKind::Csrf => TimeDelta::minutes(30),
            SealedKind::Rsp => TimeDelta::minutes(5),
            SealedKind::Nonce => TimeDelta::minutes(30),
        }
    }
}

/// Why a sealed token failed to open.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SealError {
    #[error("malformed token: {0}")]
    Decode(&'static str),
    #[error("token failed authentication")]
    Crypto,
    #[error("token expired")]
    Expired,
    #[error("token issued to a different client")]
    IdentityMismatch,
    #[error("cipher failure")]
    Cipher,
}

impl From<SealError> for AppError {
    fn from(err: SealError) -> Self {
        match err {
            SealError::Cipher => AppError::Encryption(err.to_string()),
            other => AppError::Forbidden(other.to_string()),
        }
    }
}

/// The authenticated plaintext of a sealed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
    pub client_ip: String,
    pub issued_at: DateTime<Utc>,
}

impl SealedPayload {
    fn encode(&self) -> Result<String, SealError> {
        let nanos = self
            .issued_at
            .timestamp_nanos_opt()
            .ok_or(SealError::Cipher)?;
        Ok(format!("{}:{}", self.client_ip, nanos))
    }

    /// IPv6 addresses contain `:`, so only the last one separates the timestamp.
    fn decode(plaintext: &[u8]) -> Result<Self, SealError> {
        let text = std::str::from_utf8(plaintext).map_err(|_| SealError::Decode("payload is not utf-8"))?;
        let (ip, nanos) = text
            .rsplit_once(':')
            .ok_or(SealError::Decode("payload has no timestamp"))?;
        if ip.is_empty() {
            return Err(SealError::Decode("payload has no client ip"));
        }
        let nanos: i64 = nanos
            .parse()
            .map_err(|_| SealError::Decode("payload timestamp is not numeric"))?;

        Ok(Self {
            client_ip: ip.to_string(),
            issued_at: DateTime::from_timestamp_nanos(nanos),
        })
    }
}

/// Seals and opens client-bound tokens with the rotating secret.
#[derive(Clone)]
pub struct TokenCodec {
    secrets: SecretStore,
}

impl TokenCodec {
    pub fn new(secrets: SecretStore) -> Self {
        Self { secrets }
    }

    /// Seals `client_ip` and `now` into an opaque token.
    pub fn seal(&self, client_ip: &str, now: DateTime<Utc>) -> Result<String, SealError> {
        let payload = SealedPayload {
            client_ip: client_ip.to_string(),
            issued_at: now,
        }
        .encode()?;

        let key = self.secrets.current();
        let sealed = aes::seal(&key, payload.as_bytes()).map_err(|_| SealError::Cipher)?;

        Ok(general_purpose::URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Opens `token` for `client_ip`, rejecting anything older than `max_age` at `now`.
    pub fn open(
        &self,
        token: &str,
        client_ip: &str,
        now: DateTime<Utc>,
        max_age: TimeDelta,
    ) -> Result<SealedPayload, SealError> {
        let raw = general_purpose::URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| SealError::Decode("invalid token encoding"))?;

        let key = self.secrets.current();
        let plaintext = aes::open(&key, &raw).map_err(|e| match e {
            OpenError::TooShort => SealError::Decode("token too short"),
            OpenError::Authentication => SealError::Crypto,
        })?;

        let payload = SealedPayload::decode(&plaintext)?;

        if now - payload.issued_at > max_age {
            return Err(SealError::Expired);
        }

        if payload.client_ip != client_ip {
            return Err(SealError::IdentityMismatch);
        }

        Ok(payload)
    }

    /// Opens a token of `kind` using that kind's TTL.
    pub fn open_kind(
        &self,
        kind: SealedKind,
        token: &str,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<SealedPayload, SealError> {
        self.open(token, client_ip, now, kind.ttl())
    }
}
