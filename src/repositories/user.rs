use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::user::User,
};

/// Storage for user records and the session fields they carry.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Finds a user by email, compared case-insensitively.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Finds the user currently holding `session_id`.
    async fn find_by_session(&self, session_id: &str) -> Result<Option<User>>;

    /// Persists a keypair unless the user already has one, and returns the
    /// pair that is stored afterwards as `(public_pem, private_pem)`.
    async fn store_keypair(
        &self,
        user_id: Uuid,
        public_pem: &str,
        private_pem: &str,
    ) -> Result<(String, String)>;

    /// Records a new session on the user, replacing any previous one.
    async fn start_session(
        &self,
        user_id: Uuid,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Clears `session_id` wherever it is set. Returns whether a row changed.
    async fn end_session(&self, session_id: &str) -> Result<bool>;
}

/// Maps a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: row.try_get("role")?,
        avatar: row.try_get("avatar")?,
        is_verified: row.try_get("is_verified")?,
        rsa_public: row.try_get("rsa_public")?,
        rsa_private: row.try_get("rsa_private")?,
        session_id: row.try_get("session_id")?,
        last_login_at: row.try_get("last_login_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// `UserRepository` over the `users` table.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: Pool,
}

impl PgUserRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT *
                FROM users
                WHERE lower(email) = lower($1)
                "#,
                &[&email],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT *
                FROM users
                WHERE id = $1
                "#,
                &[&user_id],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT *
                FROM users
                WHERE session_id = $1
                "#,
                &[&session_id],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn store_keypair(
        &self,
        user_id: Uuid,
        public_pem: &str,
        private_pem: &str,
    ) -> Result<(String, String)> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                UPDATE users
                SET
                    rsa_public = COALESCE(rsa_public, $2),
                    rsa_private = COALESCE(rsa_private, $3),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING rsa_public, rsa_private
                "#,
                &[&user_id, &public_pem, &private_pem],
            )
            .await?
            .ok_or(AppError::NotFound)?;
        Ok((row.try_get("rsa_public")?, row.try_get("rsa_private")?))
    }

    async fn start_session(
        &self,
        user_id: Uuid,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                r#"
                UPDATE users
                SET
                    session_id = $2,
                    last_login_at = $3,
                    updated_at = NOW()
                WHERE id = $1
                "#,
                &[&user_id, &session_id, &at],
            )
            .await?;
        if updated == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn end_session(&self, session_id: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                r#"
                UPDATE users
                SET
                    session_id = NULL,
                    updated_at = NOW()
                WHERE session_id = $1
                "#,
                &[&session_id],
            )
            .await?;
        Ok(updated > 0)
    }
}

/// In-process `UserRepository`, used when no database is configured and in tests.
#[derive(Clone, Default)]
pub struct MemoryUserRepository {
    users: Arc<DashMap<Uuid, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        self.users.insert(user.id, user);
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .map(|u| u.value().clone()))
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.users.get(&user_id).map(|u| u.value().clone()))
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.session_id.as_deref() == Some(session_id))
            .map(|u| u.value().clone()))
    }

    async fn store_keypair(
        &self,
        user_id: Uuid,
        public_pem: &str,
        private_pem: &str,
    ) -> Result<(String, String)> {
        let mut user = self.users.get_mut(&user_id).ok_or(AppError::NotFound)?;
        if user.rsa_public.is_none() || user.rsa_private.is_none() {
            user.rsa_public = Some(public_pem.to_string());
            user.rsa_private = Some(private_pem.to_string());
            user.updated_at = Utc::now();
        }
        match (&user.rsa_public, &user.rsa_private) {
            (Some(public), Some(private)) => Ok((public.clone(), private.clone())),
            _ => Err(AppError::Internal("keypair not stored".to_string())),
        }
    }

    async fn start_session(
        &self,
        user_id: Uuid,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut user = self.users.get_mut(&user_id).ok_or(AppError::NotFound)?;
        user.session_id = Some(session_id.to_string());
        user.last_login_at = Some(at);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn end_session(&self, session_id: &str) -> Result<bool> {
        let mut changed = false;
        for mut user in self.users.iter_mut() {
            if user.session_id.as_deref() == Some(session_id) {
                user.session_id = None;
                user.updated_at = Utc::now();
                changed = true;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (MemoryUserRepository, User) {
        let repo = MemoryUserRepository::new();
        let user = User::new("host", "Host@Magic899.com", "hash".to_string(), "admin");
        repo.insert(user.clone());
        (repo, user)
    }

    #[tokio::test]
    async fn email_lookup_ignores_case() {
        let (repo, user) = seeded();
        let found = repo.find_by_email("HOST@magic899.com").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(repo.find_by_email("nobody@magic899.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keypair_is_stored_once() {
        let (repo, user) = seeded();
        let first = repo.store_keypair(user.id, "pub-1", "priv-1").await.unwrap();
        let second = repo.store_keypair(user.id, "pub-2", "priv-2").await.unwrap();
        assert_eq!(first, ("pub-1".to_string(), "priv-1".to_string()));
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let (repo, user) = seeded();
        repo.start_session(user.id, "sid-1", Utc::now()).await.unwrap();
        assert_eq!(
            repo.find_by_session("sid-1").await.unwrap().map(|u| u.id),
            Some(user.id)
        );

        repo.start_session(user.id, "sid-2", Utc::now()).await.unwrap();
        assert!(repo.find_by_session("sid-1").await.unwrap().is_none());

        assert!(repo.end_session("sid-2").await.unwrap());
        assert!(!repo.end_session("sid-2").await.unwrap());
        assert!(repo.find_by_id(user.id).await.unwrap().unwrap().session_id.is_none());
    }
}
