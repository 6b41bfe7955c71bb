use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A user record as stored in the `users` table.
#[derive(Clone, Debug)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub role: String,
    pub avatar: Option<String>,
    pub is_verified: bool,
    /// SPKI PEM, provisioned on first login.
    pub rsa_public: Option<String>,
    /// PKCS#1 PEM, provisioned on first login.
    pub rsa_private: Option<String>,
    /// Set while a session is active, unset on logout.
    pub session_id: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A freshly registered, unverified user with no keypair and no session.
    pub fn new(username: &str, email: &str, password_hash: String, role: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_lowercase(),
            password_hash,
            role: role.to_string(),
            avatar: None,
            is_verified: false,
            rsa_public: None,
            rsa_private: None,
            session_id: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The read-only projection of a user handed back to clients.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
    pub avatar: Option<String>,
    pub is_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&User> for Profile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            avatar: user.avatar.clone(),
            is_verified: user.is_verified,
            last_login_at: user.last_login_at,
        }
    }
}
