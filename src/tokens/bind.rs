//! Session-bound, single-use claim tokens.
//!
//! A bind token lives 5 seconds and is accepted exactly once: the first
//! successful [`BindTokenService::validate`] revokes it, so every protected
//! round trip has to hand the client a fresh pair.

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::random;
use crate::error::AppError;
use crate::tokens::revocation::RevocationRegistry;

/// Lifetime of every bind token.
pub const BIND_TOKEN_TTL: TimeDelta = TimeDelta::seconds(5);

/// The two bind token families. Each has its own key and revocation set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindKind {
    Csrf,
    Rsp,
}

impl BindKind {
    pub fn cookie_name(self) -> &'static str {
        match self {
            BindKind::Csrf => "bind_csrf",
            BindKind::Rsp => "bind_rsp",
        }
    }

    pub fn cookie_path(self) -> &'static str {
        match self {
            BindKind::Csrf => "/csrf",
            BindKind::Rsp => "/rsp",
        }
    }

    fn type_tag(self) -> &'static str {
        match self {
            BindKind::Csrf => "_bind_csrf",
            BindKind::Rsp => "_bind_rsp",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BindClaims {
    pub sid: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub iat: i64,
    pub exp: i64,
    /// Expiry in milliseconds. `exp` only has whole seconds, which would
    /// stretch the lifetime towards 6s.
    pub exp_ms: i64,
    /// Keeps two tokens minted in the same second for one session distinct.
    pub jti: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BindError {
    #[error("bind token missing")]
    Missing,
    #[error("bind token revoked")]
    Revoked,
    #[error("bind token signature invalid")]
    InvalidSignature,
    #[error("bind token malformed")]
    Malformed,
    #[error("bind token expired")]
    Expired,
    #[error("bind token has the wrong type")]
    WrongType,
    #[error("bind token session mismatch")]
    SessionMismatch,
    #[error("bind token issuance failed: {0}")]
    Issue(String),
}

impl From<BindError> for AppError {
    fn from(err: BindError) -> Self {
        match err {
            BindError::Issue(msg) => AppError::Internal(msg),
            other => AppError::Forbidden(other.to_string()),
        }
    }
}

/// A freshly issued csrf/rsp pair for one session.
#[derive(Debug, Clone)]
pub struct BindPair {
    pub csrf: String,
    pub rsp: String,
}

impl BindPair {
    pub fn get(&self, kind: BindKind) -> &str {
        match kind {
            BindKind::Csrf => &self.csrf,
            BindKind::Rsp => &self.rsp,
        }
    }
}

struct KindKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    revoked: RevocationRegistry,
}

impl KindKeys {
    fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            revoked: RevocationRegistry::default(),
        }
    }
}

/// Issues, validates and revokes bind tokens.
pub struct BindTokenService {
    csrf: KindKeys,
    rsp: KindKeys,
    validation: Validation,
}

impl BindTokenService {
    pub fn new(csrf_secret: &[u8], rsp_secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "iat"]);

        Self {
            csrf: KindKeys::new(csrf_secret),
            rsp: KindKeys::new(rsp_secret),
            validation,
        }
    }

    fn keys(&self, kind: BindKind) -> &KindKeys {
        match kind {
            BindKind::Csrf => &self.csrf,
            BindKind::Rsp => &self.rsp,
        }
    }

    /// The revocation set for `kind`, exposed for the sweep task.
    pub fn registry(&self, kind: BindKind) -> &RevocationRegistry {
        &self.keys(kind).revoked
    }

    pub fn issue(&self, session_id: &str, kind: BindKind) -> Result<String, BindError> {
        self.issue_at(session_id, kind, Utc::now())
    }

    pub(crate) fn issue_at(
        &self,
        session_id: &str,
        kind: BindKind,
        now: DateTime<Utc>,
    ) -> Result<String, BindError> {
        let claims = BindClaims {
            sid: session_id.to_string(),
            kind: kind.type_tag().to_string(),
            iat: now.timestamp(),
            exp: (now + BIND_TOKEN_TTL).timestamp(),
            exp_ms: (now + BIND_TOKEN_TTL).timestamp_millis(),
            jti: random::random_token(12),
        };

        encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &self.keys(kind).encoding,
        )
        .map_err(|e| BindError::Issue(e.to_string()))
    }

    pub fn issue_pair(&self, session_id: &str) -> Result<BindPair, BindError> {
        Ok(BindPair {
            csrf: self.issue(session_id, BindKind::Csrf)?,
            rsp: self.issue(session_id, BindKind::Rsp)?,
        })
    }

    /// Validates `token` for `session_id` and revokes it on success.
    ///
    /// Checks run cheapest first: revocation, signature, expiry, type,
    /// session. When two callers race with the same token only the one that
    /// revokes it first succeeds; the other sees [`BindError::Revoked`].
    pub fn validate(
        &self,
        token: &str,
        session_id: &str,
        kind: BindKind,
    ) -> Result<BindClaims, BindError> {
        if token.is_empty() {
            return Err(BindError::Missing);
        }

        let keys = self.keys(kind);
        if keys.revoked.is_revoked(token) {
            return Err(BindError::Revoked);
        }

        let claims = decode::<BindClaims>(token, &keys.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => BindError::Expired,
                ErrorKind::InvalidSignature => BindError::InvalidSignature,
                _ => BindError::Malformed,
            })?;

        if Utc::now().timestamp_millis() > claims.exp_ms {
            return Err(BindError::Expired);
        }

        if claims.kind != kind.type_tag() {
            return Err(BindError::WrongType);
        }

        if claims.sid != session_id {
            return Err(BindError::SessionMismatch);
        }

        if !keys.revoked.try_revoke(token) {
            return Err(BindError::Revoked);
        }

        tracing::debug!("✅ {} validated and revoked", kind.cookie_name());
        Ok(claims)
    }

    /// Revokes a presented token without validating it. Unknown kinds of
    /// garbage are harmless: they only occupy the set until the next sweep.
    pub fn revoke(&self, token: &str, kind: BindKind) {
        self.keys(kind).revoked.revoke(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> BindTokenService {
        BindTokenService::new(&random::random_bytes(32), &random::random_bytes(32))
    }

    #[test]
    fn token_validates_once() {
        let svc = service();
        let token = svc.issue("session-a", BindKind::Csrf).unwrap();

        let claims = svc.validate(&token, "session-a", BindKind::Csrf).unwrap();
        assert_eq!(claims.sid, "session-a");
        assert_eq!(claims.exp - claims.iat, 5);

        assert_eq!(
            svc.validate(&token, "session-a", BindKind::Csrf),
            Err(BindError::Revoked)
        );
    }

    #[test]
    fn tokens_issued_back_to_back_differ() {
        let svc = service();
        let a = svc.issue("s", BindKind::Rsp).unwrap();
        let b = svc.issue("s", BindKind::Rsp).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn session_mismatch_is_rejected_without_revoking() {
        let svc = service();
        let token = svc.issue("session-a", BindKind::Rsp).unwrap();

        assert_eq!(
            svc.validate(&token, "session-b", BindKind::Rsp),
            Err(BindError::SessionMismatch)
        );
        assert!(!svc.registry(BindKind::Rsp).is_revoked(&token));
        assert!(svc.validate(&token, "session-a", BindKind::Rsp).is_ok());
    }

    #[test]
    fn kinds_do_not_cross_validate() {
        let svc = service();
        let csrf = svc.issue("s", BindKind::Csrf).unwrap();
        assert_eq!(
            svc.validate(&csrf, "s", BindKind::Rsp),
            Err(BindError::InvalidSignature)
        );
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let svc = service();
        let token = svc
            .issue_at("s", BindKind::Csrf, Utc::now() - TimeDelta::seconds(30))
            .unwrap();
        assert_eq!(
            svc.validate(&token, "s", BindKind::Csrf),
            Err(BindError::Expired)
        );
    }

    #[test]
    fn lifetime_is_five_seconds_to_the_millisecond() {
        let svc = service();
        let now = Utc::now();

        let stale = svc
            .issue_at("s", BindKind::Csrf, now - TimeDelta::milliseconds(5_400))
            .unwrap();
        assert_eq!(
            svc.validate(&stale, "s", BindKind::Csrf),
            Err(BindError::Expired)
        );
        assert!(!svc.registry(BindKind::Csrf).is_revoked(&stale));

        let fresh = svc
            .issue_at("s", BindKind::Csrf, now - TimeDelta::milliseconds(4_000))
            .unwrap();
        assert!(svc.validate(&fresh, "s", BindKind::Csrf).is_ok());
    }

    #[test]
    fn revoked_before_use_fails() {
        let svc = service();
        let token = svc.issue("s", BindKind::Csrf).unwrap();
        svc.revoke(&token, BindKind::Csrf);
        assert_eq!(
            svc.validate(&token, "s", BindKind::Csrf),
            Err(BindError::Revoked)
        );
    }

    #[test]
    fn concurrent_validation_has_one_winner() {
        let svc = service();
        let token = svc.issue("s", BindKind::Rsp).unwrap();
        let wins: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| svc.validate(&token, "s", BindKind::Rsp).is_ok() as usize))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(wins, 1);
    }
}
