//! Custom authentication flow driver.
//!
//! Plays the orchestrator role of the challenge protocol: Define decides,
//! Create issues, Verify judges, and the loop continues until Define emits a
//! terminal decision. Nothing is stored between calls; each invocation is a
//! pure function of the sealed session supplied by the client.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use super::{IdpError, SessionSealer, SessionState, UserRecord};
use crate::challenge::{
    create, define,
    metadata::ChallengeMetadata,
    verify, AttemptRecord, ChallengeConfig, ChallengeStrategy, Decision,
    PublicChallengeParameters, CHALLENGE_NAME,
};
use crate::sms::SmsSender;
use crate::token::{IdentityClaims, TokenSet, TokenSigner};

/// A pending challenge handed back to the client.
#[derive(Debug, Clone)]
pub struct StartedChallenge {
    /// Sealed session token to present on the next call.
    pub session: String,
    pub challenge_name: &'static str,
    pub public_parameters: PublicChallengeParameters,
}

/// Result of answering a challenge.
#[derive(Debug, Clone)]
pub enum ChallengeOutcome {
    /// Terminal success with freshly minted token material.
    Tokens(TokenSet),
    /// Wrong answer with attempts to spare: a fresh challenge was issued.
    Retry {
        session: String,
        public_parameters: PublicChallengeParameters,
    },
}

pub struct CustomAuth {
    config: ChallengeConfig,
    signer: Arc<TokenSigner>,
    sealer: SessionSealer,
    sms: Arc<dyn SmsSender>,
}

impl CustomAuth {
    #[must_use]
    pub fn new(
        config: ChallengeConfig,
        signer: Arc<TokenSigner>,
        sealer: SessionSealer,
        sms: Arc<dyn SmsSender>,
    ) -> Self {
        Self {
            config,
            signer,
            sealer,
            sms,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ChallengeConfig {
        &self.config
    }

    /// Start a flow for `user`: run Define on the empty session, issue the
    /// first challenge and seal the initial state.
    ///
    /// # Errors
    ///
    /// Propagates issuance failures (missing phone, delivery) and seal
    /// failures.
    pub fn initiate_auth(
        &self,
        user: &UserRecord,
        strategy: ChallengeStrategy,
    ) -> Result<StartedChallenge, IdpError> {
        let now = Utc::now().timestamp();

        match define::evaluate(&[], self.config.max_attempts, now) {
            Decision::Continue => {}
            Decision::IssueTokens | Decision::Fail => {
                return Err(IdpError::NotAuthorized(
                    "Authentication cannot start".to_string(),
                ));
            }
        }

        let issued = create::issue(
            &ChallengeMetadata::default(),
            strategy,
            &self.config,
            user.phone_number.as_deref(),
            self.sms.as_ref(),
            now,
        )?;

        let state = SessionState {
            username: user.username.clone(),
            strategy,
            session: Vec::new(),
            private_parameters: Some(issued.private_parameters),
            challenge_metadata: Some(issued.challenge_metadata),
        };

        let session = self.sealer.seal(&state).map_err(IdpError::Transport)?;
        debug!(username = %user.username, "Issued initial challenge");

        Ok(StartedChallenge {
            session,
            challenge_name: CHALLENGE_NAME,
            public_parameters: issued.public_parameters,
        })
    }

    /// Answer the pending challenge of a flow: Verify the answer, append the
    /// attempt record, and let Define pick the next transition.
    ///
    /// # Errors
    ///
    /// `NotAuthorized` for unopenable or foreign sessions and exhausted
    /// attempts, `ExpiredCode` for expired challenges, `Transport` for
    /// signing/delivery failures.
    pub fn respond_to_challenge(
        &self,
        user: &UserRecord,
        session_token: &str,
        answer: &str,
    ) -> Result<ChallengeOutcome, IdpError> {
        let now = Utc::now().timestamp();

        let mut state = self.sealer.open(session_token).map_err(|err| {
            debug!("Unusable session token: {err:#}");
            IdpError::NotAuthorized("Invalid or expired session".to_string())
        })?;

        if state.username != user.username {
            return Err(IdpError::NotAuthorized(
                "Session does not belong to this user".to_string(),
            ));
        }

        let correct = verify::check(
            state.private_parameters.as_ref(),
            state.challenge_metadata.as_deref(),
            Some(answer),
            now,
        );

        let answered_metadata = state.challenge_metadata.take();
        state.private_parameters = None;
        state.session.push(AttemptRecord {
            challenge_metadata: answered_metadata.clone(),
            challenge_result: Some(correct),
        });

        match define::evaluate(&state.session, self.config.max_attempts, now) {
            Decision::IssueTokens => {
                info!(username = %user.username, "Authentication succeeded");
                let tokens = self
                    .signer
                    .issue_token_set(&user.id.to_string(), &identity_claims(user))
                    .map_err(|err| IdpError::Transport(err.into()))?;
                Ok(ChallengeOutcome::Tokens(tokens))
            }
            Decision::Fail => {
                let metadata = ChallengeMetadata::decode(answered_metadata.as_deref());
                if metadata.expired(now) {
                    Err(IdpError::ExpiredCode)
                } else {
                    Err(IdpError::NotAuthorized(
                        "Too many failed attempts".to_string(),
                    ))
                }
            }
            Decision::Continue => {
                let prior = ChallengeMetadata::decode(answered_metadata.as_deref());
                let issued = create::issue(
                    &prior,
                    state.strategy,
                    &self.config,
                    user.phone_number.as_deref(),
                    self.sms.as_ref(),
                    now,
                )?;

                state.private_parameters = Some(issued.private_parameters);
                state.challenge_metadata = Some(issued.challenge_metadata);

                let session = self.sealer.seal(&state).map_err(IdpError::Transport)?;
                Ok(ChallengeOutcome::Retry {
                    session,
                    public_parameters: issued.public_parameters,
                })
            }
        }
    }
}

/// Identity attributes a user record contributes to its tokens.
#[must_use]
pub fn identity_claims(user: &UserRecord) -> IdentityClaims {
    IdentityClaims {
        username: user.username.clone(),
        phone_number: user.phone_number.clone(),
        email: user.email.clone(),
        name: user.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::FEDERATED_CHALLENGE_ANSWER;
    use crate::sms::testing::RecordingSender;
    use crate::token::test_keys::TEST_PRIVATE_KEY_PEM;
    use crate::token::TokenUse;
    use uuid::Uuid;

    struct Fixture {
        flow: CustomAuth,
        sender: Arc<RecordingSender>,
        signer: Arc<TokenSigner>,
    }

    fn fixture(config: ChallengeConfig) -> Fixture {
        let signer = Arc::new(
            TokenSigner::from_pem(TEST_PRIVATE_KEY_PEM.as_bytes(), "sesamo", "app").unwrap(),
        );
        let sender = Arc::new(RecordingSender::default());
        let flow = CustomAuth::new(
            config,
            Arc::clone(&signer),
            SessionSealer::ephemeral(),
            Arc::clone(&sender) as Arc<dyn SmsSender>,
        );
        Fixture {
            flow,
            sender,
            signer,
        }
    }

    fn user() -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            username: "+15551230001".to_string(),
            phone_number: Some("+15551230001".to_string()),
            phone_number_verified: true,
            email: None,
            email_verified: false,
            name: None,
            given_name: None,
            family_name: None,
            picture: None,
            status: "CONFIRMED".to_string(),
        }
    }

    fn last_otp(sender: &RecordingSender) -> String {
        let body = sender.last_body().expect("an SMS was sent");
        body.rsplit(' ').next().unwrap().to_string()
    }

    #[test]
    fn otp_happy_path_issues_tokens() {
        let fixture = fixture(ChallengeConfig::default());
        let user = user();

        let started = fixture.flow.initiate_auth(&user, ChallengeStrategy::SmsOtp).unwrap();
        assert_eq!(started.challenge_name, "CUSTOM_CHALLENGE");
        assert_eq!(fixture.sender.count(), 1);

        let otp = last_otp(&fixture.sender);
        assert_eq!(otp.len(), 6);

        let outcome = fixture
            .flow
            .respond_to_challenge(&user, &started.session, &otp)
            .unwrap();
        let ChallengeOutcome::Tokens(tokens) = outcome else {
            panic!("expected tokens");
        };

        let claims = fixture
            .signer
            .verify_refresh(tokens.refresh_token.as_deref().unwrap(), Utc::now().timestamp())
            .unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.token_use, TokenUse::Refresh);
    }

    #[test]
    fn wrong_answer_gets_a_fresh_challenge() {
        let fixture = fixture(ChallengeConfig::default());
        let user = user();

        let started = fixture.flow.initiate_auth(&user, ChallengeStrategy::SmsOtp).unwrap();

        let outcome = fixture
            .flow
            .respond_to_challenge(&user, &started.session, "000000")
            .unwrap();
        let ChallengeOutcome::Retry { session, .. } = outcome else {
            panic!("expected retry");
        };

        // A second challenge was delivered and the first one is dead.
        assert_eq!(fixture.sender.count(), 2);
        let second_otp = last_otp(&fixture.sender);

        let outcome = fixture
            .flow
            .respond_to_challenge(&user, &session, &second_otp)
            .unwrap();
        assert!(matches!(outcome, ChallengeOutcome::Tokens(_)));
    }

    #[test]
    fn replaying_the_old_session_rejects_the_new_code() {
        let fixture = fixture(ChallengeConfig::default());
        let user = user();

        let started = fixture.flow.initiate_auth(&user, ChallengeStrategy::SmsOtp).unwrap();
        let ChallengeOutcome::Retry { .. } = fixture
            .flow
            .respond_to_challenge(&user, &started.session, "000000")
            .unwrap()
        else {
            panic!("expected retry");
        };

        let second_otp = last_otp(&fixture.sender);
        // Old session still carries the first answer; the new code fails it.
        let outcome = fixture
            .flow
            .respond_to_challenge(&user, &started.session, &second_otp)
            .unwrap();
        assert!(matches!(outcome, ChallengeOutcome::Retry { .. }));
    }

    #[test]
    fn attempts_exhaust_on_the_configured_ceiling() {
        let fixture = fixture(ChallengeConfig::default());
        let user = user();

        let started = fixture.flow.initiate_auth(&user, ChallengeStrategy::SmsOtp).unwrap();
        let mut session = started.session;

        for round in 1..=5 {
            match fixture.flow.respond_to_challenge(&user, &session, "000000") {
                Ok(ChallengeOutcome::Retry { session: next, .. }) => {
                    assert!(round < 5, "round {round} should have failed");
                    session = next;
                }
                Err(IdpError::NotAuthorized(_)) => {
                    assert_eq!(round, 5, "failed early at round {round}");
                    return;
                }
                other => panic!("unexpected outcome at round {round}: {other:?}"),
            }
        }
        panic!("flow never failed");
    }

    #[test]
    fn expired_challenge_rejects_the_correct_answer() {
        let config = ChallengeConfig {
            ttl_seconds: -1,
            ..ChallengeConfig::default()
        };
        let fixture = fixture(config);
        let user = user();

        let started = fixture.flow.initiate_auth(&user, ChallengeStrategy::SmsOtp).unwrap();
        let otp = last_otp(&fixture.sender);

        let err = fixture
            .flow
            .respond_to_challenge(&user, &started.session, &otp)
            .unwrap_err();
        assert!(matches!(err, IdpError::ExpiredCode));
    }

    #[test]
    fn federated_flow_uses_the_preset_answer_and_no_sms() {
        let fixture = fixture(ChallengeConfig::default());
        let mut user = user();
        user.username = "google:108234".to_string();
        user.phone_number = None;

        let started = fixture
            .flow
            .initiate_auth(&user, ChallengeStrategy::Federated)
            .unwrap();
        assert_eq!(fixture.sender.count(), 0);

        let outcome = fixture
            .flow
            .respond_to_challenge(&user, &started.session, FEDERATED_CHALLENGE_ANSWER)
            .unwrap();
        assert!(matches!(outcome, ChallengeOutcome::Tokens(_)));
    }

    #[test]
    fn federated_flow_rejects_other_answers() {
        let fixture = fixture(ChallengeConfig::default());
        let mut user = user();
        user.username = "google:108234".to_string();
        user.phone_number = None;

        let started = fixture
            .flow
            .initiate_auth(&user, ChallengeStrategy::Federated)
            .unwrap();
        let outcome = fixture
            .flow
            .respond_to_challenge(&user, &started.session, "123456")
            .unwrap();
        assert!(matches!(outcome, ChallengeOutcome::Retry { .. }));
    }

    #[test]
    fn foreign_session_tokens_are_not_authorized() {
        let fixture = fixture(ChallengeConfig::default());
        let user = user();

        for token in ["", "garbage", "AAAA_AAAA"] {
            let err = fixture
                .flow
                .respond_to_challenge(&user, token, "123456")
                .unwrap_err();
            assert!(matches!(err, IdpError::NotAuthorized(_)));
        }
    }

    #[test]
    fn session_is_bound_to_its_user() {
        let fixture = fixture(ChallengeConfig::default());
        let user = user();
        let started = fixture.flow.initiate_auth(&user, ChallengeStrategy::SmsOtp).unwrap();
        let otp = last_otp(&fixture.sender);

        let mut other = self::user();
        other.username = "+15559990000".to_string();

        let err = fixture
            .flow
            .respond_to_challenge(&other, &started.session, &otp)
            .unwrap_err();
        assert!(matches!(err, IdpError::NotAuthorized(_)));
    }

    #[test]
    fn missing_phone_surfaces_as_validation() {
        let fixture = fixture(ChallengeConfig::default());
        let mut user = user();
        user.phone_number = None;

        let err = fixture
            .flow
            .initiate_auth(&user, ChallengeStrategy::SmsOtp)
            .unwrap_err();
        assert!(matches!(err, IdpError::Validation(_)));
    }
}
