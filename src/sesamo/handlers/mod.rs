pub mod health;
pub use self::health::health;

pub mod start;
pub use self::start::start;

pub mod verify;
pub use self::verify::verify;

pub mod refresh;
pub use self::refresh::refresh;

pub mod google;
pub use self::google::google;

pub mod jwks;
pub use self::jwks::jwks;

pub mod types;

// common functions for the handlers
use axum::{Json, http::StatusCode};
use regex::Regex;
use serde_json::{Value, json};
use tracing::error;

use crate::idp::IdpError;

pub fn valid_phone_number(phone: &str) -> bool {
    // E.164: leading +, non-zero country code, 7 to 15 digits total
    Regex::new(r"^\+[1-9]\d{6,14}$").is_ok_and(|re| re.is_match(phone))
}

pub fn normalize_phone(phone: &str) -> &str {
    phone.trim()
}

pub fn error_json(message: &str) -> Json<Value> {
    Json(json!({ "error": message }))
}

/// Map flow errors onto the wire: validation 400, authentication 401,
/// missing configuration 500, upstream failures 502.
pub fn idp_error_response(err: &IdpError) -> (StatusCode, Json<Value>) {
    match err {
        IdpError::Validation(message) => (StatusCode::BAD_REQUEST, error_json(message)),
        IdpError::NotAuthorized(message) => (StatusCode::UNAUTHORIZED, error_json(message)),
        IdpError::ExpiredCode => (
            StatusCode::UNAUTHORIZED,
            error_json("One-time passcode expired"),
        ),
        IdpError::Configuration(message) => {
            error!("Configuration error: {message}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_json("Server misconfiguration"),
            )
        }
        IdpError::Transport(source) => {
            error!("Upstream failure: {source:#}");
            (StatusCode::BAD_GATEWAY, error_json("Upstream failure"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_validation_is_e164() {
        for phone in ["+15551230001", "+447911123456", "+861012345678"] {
            assert!(valid_phone_number(phone), "{phone} should be valid");
        }
        for phone in [
            "",
            "15551230001",
            "+05551230001",
            "+1555",
            "+1555123000123456",
            "+1 555 123 0001",
            "phone",
        ] {
            assert!(!valid_phone_number(phone), "{phone} should be invalid");
        }
    }

    #[test]
    fn normalization_only_trims() {
        assert_eq!(normalize_phone(" +15551230001\n"), "+15551230001");
        assert_eq!(normalize_phone("+15551230001"), "+15551230001");
    }

    #[test]
    fn error_statuses_follow_the_taxonomy() {
        let (status, _) = idp_error_response(&IdpError::Validation("bad".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = idp_error_response(&IdpError::NotAuthorized("no".to_string()));
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = idp_error_response(&IdpError::ExpiredCode);
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = idp_error_response(&IdpError::Configuration("key".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, _) = idp_error_response(&IdpError::Transport(anyhow::anyhow!("down")));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
