//! Identity-provider client: the user directory, the sealed session tokens
//! that carry challenge state between invocations, and the flow driver that
//! runs the Define/Create/Verify loop to completion.

pub mod flow;
pub mod session;
pub mod storage;

use thiserror::Error;
use uuid::Uuid;

use crate::challenge::ChallengeError;

pub use flow::{ChallengeOutcome, CustomAuth, StartedChallenge};
pub use session::{SessionSealer, SessionState};

/// User lifecycle states mirrored from the directory.
pub const STATUS_CONFIRMED: &str = "CONFIRMED";
pub const STATUS_UNCONFIRMED: &str = "UNCONFIRMED";

/// One user record in the directory.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub phone_number: Option<String>,
    pub phone_number_verified: bool,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
    pub status: String,
}

/// Desired attribute values for create/reconcile. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAttributes {
    pub phone_number: Option<String>,
    pub phone_number_verified: Option<bool>,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
}

impl UserAttributes {
    /// Keep only the fields that differ from `record`, so reconciliation
    /// writes nothing when the directory is already up to date.
    #[must_use]
    pub fn diff(mut self, record: &UserRecord) -> Self {
        if self.phone_number == record.phone_number {
            self.phone_number = None;
        }
        if self.phone_number_verified == Some(record.phone_number_verified) {
            self.phone_number_verified = None;
        }
        if self.email == record.email {
            self.email = None;
        }
        if self.email_verified == Some(record.email_verified) {
            self.email_verified = None;
        }
        if self.name == record.name {
            self.name = None;
        }
        if self.given_name == record.given_name {
            self.given_name = None;
        }
        if self.family_name == record.family_name {
            self.family_name = None;
        }
        if self.picture == record.picture {
            self.picture = None;
        }
        self
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.phone_number.is_none()
            && self.phone_number_verified.is_none()
            && self.email.is_none()
            && self.email_verified.is_none()
            && self.name.is_none()
            && self.given_name.is_none()
            && self.family_name.is_none()
            && self.picture.is_none()
    }
}

/// Failure taxonomy for the identity-provider surface. Handlers map these to
/// HTTP statuses: validation 400, authentication 401, transport 502,
/// configuration 500.
#[derive(Debug, Error)]
pub enum IdpError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotAuthorized(String),
    #[error("one-time passcode expired")]
    ExpiredCode,
    #[error("missing configuration: {0}")]
    Configuration(String),
    #[error("upstream failure: {0}")]
    Transport(#[source] anyhow::Error),
}

impl From<ChallengeError> for IdpError {
    fn from(err: ChallengeError) -> Self {
        match err {
            ChallengeError::MissingPhone => Self::Validation(err.to_string()),
            ChallengeError::Delivery(source) => Self::Transport(source),
        }
    }
}

impl From<sqlx::Error> for IdpError {
    fn from(err: sqlx::Error) -> Self {
        Self::Transport(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            username: "+15551230001".to_string(),
            phone_number: Some("+15551230001".to_string()),
            phone_number_verified: true,
            email: None,
            email_verified: false,
            name: Some("Alice".to_string()),
            given_name: None,
            family_name: None,
            picture: None,
            status: STATUS_CONFIRMED.to_string(),
        }
    }

    #[test]
    fn diff_drops_already_matching_fields() {
        let desired = UserAttributes {
            phone_number: Some("+15551230001".to_string()),
            phone_number_verified: Some(true),
            name: Some("Alice B".to_string()),
            ..UserAttributes::default()
        };
        let diff = desired.diff(&record());
        assert_eq!(diff.phone_number, None);
        assert_eq!(diff.phone_number_verified, None);
        assert_eq!(diff.name.as_deref(), Some("Alice B"));
        assert!(!diff.is_empty());
    }

    #[test]
    fn diff_of_identical_attributes_is_empty() {
        let desired = UserAttributes {
            phone_number: Some("+15551230001".to_string()),
            phone_number_verified: Some(true),
            ..UserAttributes::default()
        };
        assert!(desired.diff(&record()).is_empty());
    }

    #[test]
    fn challenge_errors_map_into_the_taxonomy() {
        assert!(matches!(
            IdpError::from(ChallengeError::MissingPhone),
            IdpError::Validation(_)
        ));
        assert!(matches!(
            IdpError::from(ChallengeError::Delivery(anyhow::anyhow!("down"))),
            IdpError::Transport(_)
        ));
    }
}
