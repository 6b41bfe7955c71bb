use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

pub const ACCESS_TOKEN_TTL: TimeDelta = TimeDelta::minutes(15);
pub const REFRESH_TOKEN_TTL: TimeDelta = TimeDelta::days(7);

/// Claims carried by the (RSA-sealed) access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub uid: Uuid,
    pub sid: String,
    pub role: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub iss: String,
    pub sub: String,
}

/// Claims carried by the refresh token. The user is re-derived from the
/// session record, never trusted from these alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshClaims {
    pub uid: Uuid,
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// Signs and verifies access and refresh claims with separate HS256 keys.
pub struct SessionTokens {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    issuer: String,
    validation: Validation,
}

impl SessionTokens {
    pub fn new(access_secret: &[u8], refresh_secret: &[u8], issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iat", "iss"]);

        Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
            issuer,
            validation,
        }
    }

    pub fn issue_access(
        &self,
        user_id: Uuid,
        session_id: &str,
        role: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let claims = AccessClaims {
            uid: user_id,
            sid: session_id.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + ACCESS_TOKEN_TTL).timestamp(),
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign access token: {}", e)))
    }

    pub fn issue_refresh(
        &self,
        user_id: Uuid,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let claims = RefreshClaims {
            uid: user_id,
            sid: session_id.to_string(),
            iat: now.timestamp(),
            exp: (now + REFRESH_TOKEN_TTL).timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign refresh token: {}", e)))
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims> {
        decode::<AccessClaims>(token, &self.access_decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| unauthorized("access", e.kind()))
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims> {
        decode::<RefreshClaims>(token, &self.refresh_decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| unauthorized("refresh", e.kind()))
    }
}

fn unauthorized(which: &str, kind: &ErrorKind) -> AppError {
    let reason = match kind {
        ErrorKind::ExpiredSignature => "expired",
        ErrorKind::ImmatureSignature => "not yet valid",
        ErrorKind::InvalidIssuer => "issued elsewhere",
        _ => "invalid",
    };
    AppError::Unauthorized(format!("{} token {}", which, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::random;

    fn tokens() -> SessionTokens {
        SessionTokens::new(&random::random_bytes(32), &random::random_bytes(32), "magic899")
    }

    #[test]
    fn access_claims_round_trip() {
        let tokens = tokens();
        let uid = Uuid::new_v4();
        let token = tokens.issue_access(uid, "sid", "admin", Utc::now()).unwrap();
        let claims = tokens.verify_access(&token).unwrap();
        assert_eq!(claims.uid, uid);
        assert_eq!(claims.sid, "sid");
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.exp - claims.iat, ACCESS_TOKEN_TTL.num_seconds());
    }

    #[test]
    fn access_and_refresh_keys_are_separate() {
        let tokens = tokens();
        let refresh = tokens.issue_refresh(Uuid::new_v4(), "sid", Utc::now()).unwrap();
        assert!(matches!(
            tokens.verify_access(&refresh),
            Err(AppError::Unauthorized(_))
        ));
        assert!(tokens.verify_refresh(&refresh).is_ok());
    }

    #[test]
    fn expired_refresh_is_unauthorized() {
        let tokens = tokens();
        let token = tokens
            .issue_refresh(Uuid::new_v4(), "sid", Utc::now() - TimeDelta::days(8))
            .unwrap();
        match tokens.verify_refresh(&token) {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, "refresh token expired"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let secret = random::random_bytes(32);
        let ours = SessionTokens::new(&secret, &secret, "magic899");
        let theirs = SessionTokens::new(&secret, &secret, "elsewhere");
        let token = theirs.issue_access(Uuid::new_v4(), "sid", "user", Utc::now()).unwrap();
        assert!(ours.verify_access(&token).is_err());
    }
}
