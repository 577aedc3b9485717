//! Verify stage: constant-time answer comparison honoring expiry.

use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::{metadata::ChallengeMetadata, PrivateChallengeParameters};

/// Check a client-supplied answer against the expected secret.
///
/// Pure and idempotent; the default verdict is "incorrect". The expiry comes
/// from the private parameters, falling back to the challenge metadata when
/// the private slot carries none. An expired challenge is never satisfiable,
/// regardless of answer correctness.
#[must_use]
pub fn check(
    private: Option<&PrivateChallengeParameters>,
    challenge_metadata: Option<&str>,
    answer: Option<&str>,
    now: i64,
) -> bool {
    let Some(private) = private else {
        warn!("Missing expected OTP in private parameters");
        return false;
    };

    if private.answer.is_empty() {
        warn!("Empty expected OTP in private parameters");
        return false;
    }

    let expires_at = if private.exp.is_empty() {
        ChallengeMetadata::decode(challenge_metadata).exp
    } else {
        // A present but unparseable expiry disables the check rather than
        // failing the whole stage; the Define stage still has its own copy.
        private.exp.trim().parse::<i64>().ok()
    };

    if let Some(expires_at) = expires_at {
        if now > expires_at {
            debug!(expires_at, now, "OTP expired");
            return false;
        }
    }

    let Some(answer) = answer else {
        debug!("No OTP provided by client");
        return false;
    };

    answer.as_bytes().ct_eq(private.answer.as_bytes()).into()
}
