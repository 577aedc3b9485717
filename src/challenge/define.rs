//! Define stage: decide whether to continue, succeed or fail.

use serde::{Deserialize, Serialize};

use super::{metadata::ChallengeMetadata, AttemptRecord, Decision, CHALLENGE_NAME};

/// Wire shape of a Define verdict.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DefineResponse {
    pub issue_tokens: bool,
    pub fail_authentication: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_name: Option<String>,
}

impl From<Decision> for DefineResponse {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::IssueTokens => Self {
                issue_tokens: true,
                ..Self::default()
            },
            Decision::Fail => Self {
                fail_authentication: true,
                ..Self::default()
            },
            Decision::Continue => Self {
                challenge_name: Some(CHALLENGE_NAME.to_string()),
                ..Self::default()
            },
        }
    }
}

/// Evaluate the session history.
///
/// Guard order is a policy, not an accident: a correct answer is honored
/// before the attempt ceiling and the expiry window are consulted, so a
/// correct answer on the final permitted attempt still succeeds.
#[must_use]
pub fn evaluate(session: &[AttemptRecord], max_attempts: u32, now: i64) -> Decision {
    let Some(last) = session.last() else {
        // Empty history: first round, issue the initial challenge.
        return Decision::Continue;
    };

    if last.challenge_result == Some(true) {
        return Decision::IssueTokens;
    }

    let metadata = ChallengeMetadata::decode(last.challenge_metadata.as_deref());

    // Missing or zero counters fall back to the history length so malformed
    // metadata cannot lock a user out early.
    let attempt = metadata
        .attempt
        .filter(|&attempt| attempt != 0)
        .unwrap_or_else(|| u32::try_from(session.len()).unwrap_or(u32::MAX));

    if attempt >= max_attempts {
        return Decision::Fail;
    }

    if metadata.expired(now) {
        return Decision::Fail;
    }

    Decision::Continue
}
