use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::envelope::{self, RSA_KEY_BITS};
use crate::crypto::{password, random};
use crate::error::{AppError, Result};
use crate::models::session::{AuthContext, Session};
use crate::models::user::{Profile, User};
use crate::repositories::user::UserRepository;
use crate::tokens::bind::{BindKind, BindPair, BindTokenService};
use crate::tokens::session::SessionTokens;

const INVALID_CREDENTIALS: &str = "invalid credentials";

/// Everything a successful login hands back to the client.
pub struct LoginOutcome {
    pub session_id: String,
    /// Access token sealed under the user's public key.
    pub access_token: String,
    pub refresh_token: String,
    pub bind: BindPair,
    pub profile: Profile,
}

/// A renewed access token with the replacement bind pair.
pub struct RefreshOutcome {
    pub access_token: String,
    pub bind: BindPair,
}

/// Bind tokens the caller presented, revoked on logout and refresh.
#[derive(Default, Debug, Clone)]
pub struct PresentedBinds {
    pub csrf: Option<String>,
    pub rsp: Option<String>,
}

/// Login, logout and refresh transitions over the user store.
pub struct SessionAuthenticator {
    users: Arc<dyn UserRepository>,
    tokens: SessionTokens,
    bind: Arc<BindTokenService>,
    db_timeout: Duration,
}

impl SessionAuthenticator {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: SessionTokens,
        bind: Arc<BindTokenService>,
        db_timeout: Duration,
    ) -> Self {
        Self {
            users,
            tokens,
            bind,
            db_timeout,
        }
    }

    /// Runs a user-store call under the configured deadline.
    async fn bounded<T>(
        &self,
        what: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.db_timeout, call)
            .await
            .map_err(|_| AppError::Timeout(what))?
    }

    /// Authenticates `email`/`password` and opens a new session.
    ///
    /// An unknown email and a wrong password produce the same error after the
    /// same amount of hashing work.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let candidate = Zeroizing::new(password.to_string());
        let user = self
            .bounded("user lookup", self.users.find_by_email(email))
            .await?;

        let Some(user) = user else {
            tokio::task::spawn_blocking(move || password::verify_against_dummy(&candidate))
                .await
                .map_err(|e| AppError::Internal(format!("Password task failed: {}", e)))?;
            tracing::warn!("❌ Login failed");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };

        let hash = user.password_hash.clone();
        let matches =
            tokio::task::spawn_blocking(move || password::verify_password(&candidate, &hash))
                .await
                .map_err(|e| AppError::Internal(format!("Password task failed: {}", e)))?;
        if !matches {
            tracing::warn!("❌ Login failed");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        let public_pem = self.ensure_keypair(&user).await?;

        let session_id = random::generate_session_id();
        let now = Utc::now();

        let access = Zeroizing::new(self.tokens.issue_access(user.id, &session_id, &user.role, now)?);
        let access_token = envelope::seal_for(&public_pem, access.as_bytes())?;
        let refresh_token = self.tokens.issue_refresh(user.id, &session_id, now)?;

        self.bounded(
            "session start",
            self.users.start_session(user.id, &session_id, now),
        )
        .await?;

        let bind = self.bind.issue_pair(&session_id)?;

        let mut profile = Profile::from(&user);
        profile.last_login_at = Some(now);

        tracing::info!("✅ User {} logged in", user.id);

        Ok(LoginOutcome {
            session_id,
            access_token,
            refresh_token,
            bind,
            profile,
        })
    }

    /// Returns the user's public key, provisioning a keypair the first time.
    async fn ensure_keypair(&self, user: &User) -> Result<String> {
        if let (Some(public), Some(_)) = (&user.rsa_public, &user.rsa_private) {
            return Ok(public.clone());
        }

        tracing::info!("🔐 Provisioning keypair for user {}", user.id);
        let pair = tokio::task::spawn_blocking(|| envelope::generate_keypair(RSA_KEY_BITS))
            .await
            .map_err(|e| AppError::Internal(format!("Key generation task failed: {}", e)))??;

        // A concurrent first login may have stored its pair first; that one wins.
        let (public, _) = self
            .bounded(
                "keypair store",
                self.users
                    .store_keypair(user.id, &pair.public_pem, &pair.private_pem),
            )
            .await?;
        Ok(public)
    }

    /// Ends the session, if any. Succeeds with nothing to end.
    pub async fn logout(&self, session_id: Option<&str>, presented: &PresentedBinds) -> Result<()> {
        self.revoke_presented(presented);

        if let Some(session_id) = session_id.filter(|s| !s.is_empty()) {
            let ended = self
                .bounded("session end", self.users.end_session(session_id))
                .await?;
            if ended {
                tracing::info!("✅ Session ended");
            }
        }
        Ok(())
    }

    /// Issues a new access token and bind pair for a live session.
    ///
    /// The user comes from the session record, so ending a session server-side
    /// invalidates refresh tokens that have not expired yet.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        session_id: &str,
        presented: &PresentedBinds,
    ) -> Result<RefreshOutcome> {
        let claims = self.tokens.verify_refresh(refresh_token)?;
        if claims.sid != session_id {
            return Err(AppError::Unauthorized("refresh token session mismatch".to_string()));
        }

        let user = self
            .bounded("session lookup", self.users.find_by_session(session_id))
            .await?
            .ok_or_else(|| AppError::Unauthorized("session ended".to_string()))?;
        if user.id != claims.uid {
            return Err(AppError::Unauthorized("refresh token user mismatch".to_string()));
        }
        let session = Session::from_user(&user)
            .ok_or_else(|| AppError::Unauthorized("session ended".to_string()))?;

        let access = Zeroizing::new(self.tokens.issue_access(
            session.user_id,
            &session.session_id,
            &session.role,
            Utc::now(),
        )?);
        let access_token = envelope::seal_for(&session.rsa_public, access.as_bytes())?;

        self.revoke_presented(presented);
        let bind = self.bind.issue_pair(&session.session_id)?;

        tracing::debug!("✅ Access token refreshed for user {}", session.user_id);
        Ok(RefreshOutcome { access_token, bind })
    }

    /// Resolves the caller's identity from the session cookie and the sealed
    /// access token.
    pub async fn authenticate_access(
        &self,
        session_id: &str,
        sealed_access: &str,
    ) -> Result<AuthContext> {
        let session = self.session(session_id).await?;

        let access = Zeroizing::new(
            String::from_utf8(envelope::open_with(&session.rsa_private, sealed_access)?)
                .map_err(|_| AppError::Unauthorized("invalid access token".to_string()))?,
        );
        let claims = self.tokens.verify_access(&access)?;

        if claims.sid != session.session_id || claims.uid != session.user_id {
            return Err(AppError::Unauthorized("access token does not match session".to_string()));
        }

        Ok(AuthContext {
            user_id: session.user_id,
            session_id: session.session_id,
            role: session.role,
        })
    }

    /// Looks up the active session behind `session_id`.
    pub async fn session(&self, session_id: &str) -> Result<Session> {
        if session_id.is_empty() {
            return Err(AppError::Unauthorized("no session".to_string()));
        }
        let user = self
            .bounded("session lookup", self.users.find_by_session(session_id))
            .await?
            .ok_or_else(|| AppError::Unauthorized("no active session".to_string()))?;
        Session::from_user(&user).ok_or_else(|| AppError::Unauthorized("no active session".to_string()))
    }

    /// Read-only projection of an authenticated user.
    pub async fn profile(&self, user_id: Uuid) -> Result<Profile> {
        let user = self
            .bounded("user lookup", self.users.find_by_id(user_id))
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(Profile::from(&user))
    }

    fn revoke_presented(&self, presented: &PresentedBinds) {
        if let Some(token) = presented.csrf.as_deref() {
            self.bind.revoke(token, BindKind::Csrf);
        }
        if let Some(token) = presented.rsp.as_deref() {
            self.bind.revoke(token, BindKind::Rsp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::user::MemoryUserRepository;

    const EMAIL: &str = "host@magic899.com";
    const PASSWORD: &str = "on-air-at-8.99";

    fn authenticator() -> (SessionAuthenticator, MemoryUserRepository, Arc<BindTokenService>) {
        let repo = MemoryUserRepository::new();
        let hash = password::hash_password(PASSWORD).unwrap();
        repo.insert(User::new("host", EMAIL, hash, "admin"));

        let secret = random::random_bytes(32);
        let bind = Arc::new(BindTokenService::new(&secret, &random::random_bytes(32)));
        let auth = SessionAuthenticator::new(
            Arc::new(repo.clone()),
            SessionTokens::new(&secret, &random::random_bytes(32), "magic899"),
            bind.clone(),
            Duration::from_secs(3),
        );
        (auth, repo, bind)
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let (auth, _, _) = authenticator();

        let wrong = auth.login(EMAIL, "nope").await.err().unwrap();
        let unknown = auth.login("ghost@magic899.com", PASSWORD).await.err().unwrap();

        match (wrong, unknown) {
            (AppError::Unauthorized(a), AppError::Unauthorized(b)) => {
                assert_eq!(a, b);
                assert_eq!(a, INVALID_CREDENTIALS);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let (auth, repo, bind) = authenticator();

        let login = auth.login(EMAIL, PASSWORD).await.unwrap();
        assert_eq!(login.profile.email, EMAIL);
        assert!(login.profile.last_login_at.is_some());

        let stored = repo.find_by_email(EMAIL).await.unwrap().unwrap();
        assert_eq!(stored.session_id.as_deref(), Some(login.session_id.as_str()));
        assert!(stored.rsa_public.is_some());

        let ctx = auth
            .authenticate_access(&login.session_id, &login.access_token)
            .await
            .unwrap();
        assert_eq!(ctx.user_id, stored.id);
        assert_eq!(ctx.role, "admin");

        let presented = PresentedBinds {
            csrf: Some(login.bind.csrf.clone()),
            rsp: Some(login.bind.rsp.clone()),
        };
        let refreshed = auth
            .refresh(&login.refresh_token, &login.session_id, &presented)
            .await
            .unwrap();
        assert!(bind.registry(BindKind::Csrf).is_revoked(&login.bind.csrf));
        assert!(auth
            .authenticate_access(&login.session_id, &refreshed.access_token)
            .await
            .is_ok());

        auth.logout(Some(&login.session_id), &PresentedBinds::default())
            .await
            .unwrap();
        auth.logout(Some(&login.session_id), &PresentedBinds::default())
            .await
            .unwrap();
        auth.logout(None, &PresentedBinds::default()).await.unwrap();

        assert!(matches!(
            auth.refresh(&login.refresh_token, &login.session_id, &PresentedBinds::default())
                .await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            auth.authenticate_access(&login.session_id, &refreshed.access_token)
                .await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn second_login_reuses_keypair_and_replaces_session() {
        let (auth, repo, _) = authenticator();

        let first = auth.login(EMAIL, PASSWORD).await.unwrap();
        let key_after_first = repo.find_by_email(EMAIL).await.unwrap().unwrap().rsa_public;

        let second = auth.login(EMAIL, PASSWORD).await.unwrap();
        let key_after_second = repo.find_by_email(EMAIL).await.unwrap().unwrap().rsa_public;

        assert_ne!(first.session_id, second.session_id);
        assert_eq!(key_after_first, key_after_second);
        assert!(auth
            .authenticate_access(&first.session_id, &first.access_token)
            .await
            .is_err());
        assert!(auth
            .authenticate_access(&second.session_id, &first.access_token)
            .await
            .is_err());
    }
}
