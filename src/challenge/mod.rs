//! Custom authentication challenge protocol.
//!
//! A login flow is a sequence of Define -> Create -> Verify rounds. The only
//! state that travels between rounds is the session history: an append-only
//! list of [`AttemptRecord`]s supplied whole by the orchestrator on every
//! invocation. Nothing here persists anything; each stage is a pure function
//! of its inputs plus the configured limits.

pub mod create;
pub mod define;
pub mod metadata;
pub mod otp;
pub mod verify;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Challenge name announced to clients while the flow continues.
pub const CHALLENGE_NAME: &str = "CUSTOM_CHALLENGE";

/// Pre-shared answer used by the federated bridge instead of a delivered OTP.
///
/// Federated logins short-circuit generation and delivery but still flow
/// through the same Define/Verify checks, so the bridge answers its own
/// challenge with this constant.
pub const FEDERATED_CHALLENGE_ANSWER: &str = "GOOGLE_LOGIN_OK";

/// One entry of the session history, most recent last.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    /// Opaque string produced by the issuer; only the metadata codec may
    /// look inside.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_metadata: Option<String>,
    /// Verdict of the verify stage for this attempt, absent until verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_result: Option<bool>,
}

/// Terminal or continuing verdict of the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Terminal success: the last attempt was answered correctly.
    IssueTokens,
    /// Issue (another) challenge.
    Continue,
    /// Terminal failure: attempts exhausted or challenge expired.
    Fail,
}

/// How the expected answer for a challenge is produced.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStrategy {
    /// Generate a one-time passcode and deliver it over SMS.
    SmsOtp,
    /// Use [`FEDERATED_CHALLENGE_ANSWER`]; no generation, no delivery.
    Federated,
}

/// Limits and toggles for the challenge protocol.
#[derive(Debug, Clone)]
pub struct ChallengeConfig {
    /// Seconds before an issued challenge expires.
    pub ttl_seconds: i64,
    /// Maximum number of attempts before the flow fails terminally.
    pub max_attempts: u32,
    /// Number of digits in a generated passcode.
    pub otp_length: u32,
    /// Echo the plaintext passcode in the public parameters. Never enable
    /// outside of development.
    pub dev_echo: bool,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            max_attempts: 5,
            otp_length: otp::DEFAULT_OTP_LENGTH,
            dev_echo: false,
        }
    }
}

/// Secret material carried by the orchestrator between Create and Verify.
/// Never exposed to the calling client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PrivateChallengeParameters {
    pub answer: String,
    pub exp: String,
    pub attempt: String,
}

/// How the secret reaches the user.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMedium {
    #[serde(rename = "SMS")]
    Sms,
    /// Federated challenges deliver nothing.
    #[serde(rename = "NONE")]
    None,
}

/// Parameters exposed to the calling client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicChallengeParameters {
    pub delivery_medium: DeliveryMedium,
    /// Plaintext passcode, present only when dev echo is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_otp: Option<String>,
}

#[derive(Debug, Error)]
pub enum ChallengeError {
    /// The target phone number is absent or empty after trimming. Checked
    /// before any secret is generated so no undeliverable challenge leaks.
    #[error("phone number missing for user")]
    MissingPhone,
    /// The delivery channel failed; the challenge is not considered issued.
    #[error("failed to deliver one-time passcode")]
    Delivery(#[source] anyhow::Error),
}
