use chrono::{DateTime, Utc};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::models::user::User;

/// An active session, projected from the user record that owns it.
///
/// The session identifier is an unguessable random value; it is not
/// encrypted at rest because nothing derives from it beyond lookup.
#[derive(Clone, Debug)]
pub struct Session {
    pub session_id: String,
    pub user_id: Uuid,
    pub role: String,
    pub rsa_public: String,
    pub rsa_private: Zeroizing<String>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Builds the projection, or `None` when the user has no active session
    /// or no keypair yet.
    pub fn from_user(user: &User) -> Option<Self> {
        Some(Self {
            session_id: user.session_id.clone()?,
            user_id: user.id,
            role: user.role.clone(),
            rsa_public: user.rsa_public.clone()?,
            rsa_private: Zeroizing::new(user.rsa_private.clone()?),
            last_login_at: user.last_login_at,
        })
    }
}

/// Identity installed on the request by the access middleware.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub session_id: String,
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_requires_session_and_keys() {
        let mut user = User::new("dj", "dj@magic899.com", "hash".into(), "user");
        assert!(Session::from_user(&user).is_none());

        user.rsa_public = Some("pub".into());
        user.rsa_private = Some("priv".into());
        assert!(Session::from_user(&user).is_none());

        user.session_id = Some("sid".into());
        let session = Session::from_user(&user).unwrap();
        assert_eq!(session.session_id, "sid");
        assert_eq!(session.user_id, user.id);
        assert_eq!(session.rsa_private.as_str(), "priv");
    }
}
