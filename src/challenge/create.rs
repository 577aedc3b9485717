//! Create stage: mint and dispatch a new challenge.

use tracing::{error, info};

use super::{
    metadata::ChallengeMetadata, otp, ChallengeConfig, ChallengeError, ChallengeStrategy,
    DeliveryMedium, PrivateChallengeParameters, PublicChallengeParameters,
    FEDERATED_CHALLENGE_ANSWER,
};
use crate::sms::SmsSender;

/// Everything a freshly issued challenge produces: the secret material for
/// the orchestrator, the opaque metadata for the session history, and the
/// client-visible parameters.
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub private_parameters: PrivateChallengeParameters,
    pub challenge_metadata: String,
    pub public_parameters: PublicChallengeParameters,
}

/// Issue the next challenge of a flow.
///
/// The attempt number continues from the prior attempt's metadata (or starts
/// at 1). For the SMS strategy the phone number is checked before any secret
/// is generated, and a delivery failure fails the whole operation - nothing
/// was persisted, so there is no partial state to roll back.
///
/// # Errors
///
/// [`ChallengeError::MissingPhone`] when the SMS strategy has no usable
/// target, [`ChallengeError::Delivery`] when dispatch fails.
pub fn issue(
    prior: &ChallengeMetadata,
    strategy: ChallengeStrategy,
    config: &ChallengeConfig,
    phone_number: Option<&str>,
    sms: &dyn SmsSender,
    now: i64,
) -> Result<IssuedChallenge, ChallengeError> {
    let attempt = prior.attempt.unwrap_or(0) + 1;
    let expires_at = now + config.ttl_seconds;

    let (answer, delivery) = match strategy {
        ChallengeStrategy::SmsOtp => {
            let phone = phone_number
                .map(str::trim)
                .filter(|phone| !phone.is_empty())
                .ok_or(ChallengeError::MissingPhone)?;
            (otp::generate(config.otp_length), Some(phone))
        }
        ChallengeStrategy::Federated => (FEDERATED_CHALLENGE_ANSWER.to_string(), None),
    };

    let private_parameters = PrivateChallengeParameters {
        answer: answer.clone(),
        exp: expires_at.to_string(),
        attempt: attempt.to_string(),
    };

    let challenge_metadata = ChallengeMetadata::new(expires_at, attempt).encode();

    let public_parameters = match strategy {
        ChallengeStrategy::SmsOtp => PublicChallengeParameters {
            delivery_medium: DeliveryMedium::Sms,
            dev_otp: config.dev_echo.then(|| answer.clone()),
        },
        // The pre-shared federated answer is never echoed.
        ChallengeStrategy::Federated => PublicChallengeParameters {
            delivery_medium: DeliveryMedium::None,
            dev_otp: None,
        },
    };

    if let Some(phone) = delivery {
        let message = format!("Your Sesamo login code is {answer}");
        sms.send(phone, &message).map_err(|err| {
            error!(to = %phone, "Failed to deliver OTP: {err:#}");
            ChallengeError::Delivery(err)
        })?;
        info!(to = %phone, attempt, "OTP issued");
    }

    Ok(IssuedChallenge {
        private_parameters,
        challenge_metadata,
        public_parameters,
    })
}
