use garde::Validate;
use serde::Deserialize;

use crate::error::{AppError, Result};

/// The request payload for user login.
///
/// Only the shape is checked here. Whether the account exists is never
/// revealed by validation.
#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[garde(email, length(max = 254))]
    pub email: String,
    #[garde(length(min = 1, max = 128))]
    pub password: String,
}

/// Validates a login payload.
///
/// # Arguments
///
/// * `payload` - The credentials to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the credentials can be checked.
pub fn validate_login(payload: &LoginRequest) -> Result<()> {
    payload
        .validate()
        .map_err(|report| AppError::BadRequest(report.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn emails() {
        assert!(validate_login(&login("host@magic899.com", "x")).is_ok());
        assert!(validate_login(&login("", "x")).is_err());
        assert!(validate_login(&login("host", "x")).is_err());
        assert!(validate_login(&login("@magic899.com", "x")).is_err());
        assert!(validate_login(&login("host @magic899.com", "x")).is_err());
    }

    #[test]
    fn passwords() {
        assert!(validate_login(&login("host@magic899.com", "")).is_err());
        assert!(validate_login(&login("host@magic899.com", &"x".repeat(129))).is_err());
    }
}
