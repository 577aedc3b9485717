use crate::cli::actions::Action;
use crate::challenge::ChallengeConfig;
use crate::google::GoogleVerifier;
use crate::idp::{CustomAuth, SessionSealer};
use crate::sesamo::{self, AuthState};
use crate::sms::{LogSmsSender, SmsSender};
use crate::token::TokenSigner;
use anyhow::{anyhow, Context, Result};
use base64ct::{Base64, Encoding};
use secrecy::{ExposeSecret, SecretString};
use std::fs;
use std::sync::Arc;
use tracing::warn;

/// Handle the server action
/// # Errors
/// Returns an error if the key material is unusable or the server fails
pub async fn handle(action: Action) -> Result<()> {
    let Action::Server {
        port,
        dsn,
        token_key,
        token_issuer,
        token_audience,
        session_key,
        google_client_id,
        otp_ttl,
        otp_max_attempts,
        otp_length,
        sms_dev_echo,
    } = action;

    let key_material = fs::read(&token_key)
        .with_context(|| format!("Failed to read token key: {token_key}"))?;

    let signer = Arc::new(
        TokenSigner::from_pem(&key_material, token_issuer, token_audience)
            .context("Failed to parse token signing key")?,
    );

    let sealer = match session_key {
        Some(secret) => session_sealer(&secret)?,
        None => {
            warn!("No session key configured, using an ephemeral key, restarts invalidate in-flight logins");
            SessionSealer::ephemeral()
        }
    };

    let config = ChallengeConfig {
        ttl_seconds: otp_ttl,
        max_attempts: otp_max_attempts,
        otp_length,
        dev_echo: sms_dev_echo,
    };

    if sms_dev_echo {
        warn!("SMS dev echo enabled, one-time passcodes are returned in API responses");
    }

    let sms: Arc<dyn SmsSender> = Arc::new(LogSmsSender);
    let flow = CustomAuth::new(config, Arc::clone(&signer), sealer, sms);

    let state = Arc::new(AuthState {
        flow,
        signer,
        google: google_client_id.map(GoogleVerifier::new),
    });

    sesamo::new(port, dsn, state).await?;

    Ok(())
}

fn session_sealer(secret: &SecretString) -> Result<SessionSealer> {
    let decoded = Base64::decode_vec(secret.expose_secret())
        .map_err(|_| anyhow!("Session key is not valid base64"))?;

    let key: [u8; 32] = decoded
        .try_into()
        .map_err(|_| anyhow!("Session key must decode to exactly 32 bytes"))?;

    Ok(SessionSealer::new(key))
}
