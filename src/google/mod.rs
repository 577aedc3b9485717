//! Google id token verification.
//!
//! Federated sign-in hands us a Google-issued RS256 id token. We verify it
//! against Google's published JWKS and our own claim policy (issuer
//! allow-list, client id as audience, expiry), then surface the profile
//! claims the directory cares about.

use serde::{Deserialize, Deserializer};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::token::jwt;
use crate::token::Jwks;

/// Issuer values Google uses across token variants.
pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Google's JWKS endpoint. Keys rotate, so responses are cached briefly.
pub const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

const JWKS_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum GoogleTokenError {
    /// The token failed verification; callers answer 401.
    #[error("invalid Google token: {0}")]
    Invalid(String),
    /// Google's key directory could not be fetched; callers answer 502.
    #[error("failed to fetch Google keys: {0}")]
    Jwks(#[source] anyhow::Error),
}

/// Claims we read out of a Google id token.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub exp: i64,
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub email_verified: bool,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
}

// Google has shipped email_verified both as a bool and as "true"/"false".
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Str(String),
    }

    Ok(match Option::<BoolOrString>::deserialize(deserializer)? {
        Some(BoolOrString::Bool(b)) => b,
        Some(BoolOrString::Str(s)) => s.eq_ignore_ascii_case("true"),
        None => false,
    })
}

/// Verify a Google id token against an already fetched key set.
///
/// The issuer is checked before anything that needs the keys, so a token
/// from the wrong authority never drives a signature check.
///
/// # Errors
///
/// Returns [`GoogleTokenError::Invalid`] for any token that fails the
/// policy: bad structure, bad signature, foreign issuer, wrong audience or
/// past expiry.
pub fn verify_with_jwks(
    token: &str,
    jwks: &Jwks,
    audience: &str,
    now: i64,
) -> Result<GoogleClaims, GoogleTokenError> {
    let claims: GoogleClaims = jwt::verify_signature(token, jwks)
        .map_err(|err| GoogleTokenError::Invalid(err.to_string()))?;

    if !GOOGLE_ISSUERS.contains(&claims.iss.as_str()) {
        return Err(GoogleTokenError::Invalid(format!(
            "untrusted issuer: {}",
            claims.iss
        )));
    }
    if claims.aud != audience {
        return Err(GoogleTokenError::Invalid("audience mismatch".to_string()));
    }
    if claims.exp <= now {
        return Err(GoogleTokenError::Invalid("token expired".to_string()));
    }

    Ok(claims)
}

struct CachedJwks {
    jwks: Jwks,
    fetched_at: Instant,
}

/// Verifies Google id tokens for a configured OAuth client id, caching the
/// JWKS between calls.
pub struct GoogleVerifier {
    client: reqwest::Client,
    client_id: String,
    jwks_url: String,
    cache: RwLock<Option<CachedJwks>>,
}

impl GoogleVerifier {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self::with_jwks_url(client_id, GOOGLE_JWKS_URL)
    }

    #[must_use]
    pub fn with_jwks_url(client_id: impl Into<String>, jwks_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: client_id.into(),
            jwks_url: jwks_url.into(),
            cache: RwLock::new(None),
        }
    }

    /// Verify a Google id token end to end.
    ///
    /// # Errors
    ///
    /// [`GoogleTokenError::Jwks`] when the key directory is unreachable,
    /// [`GoogleTokenError::Invalid`] when the token fails the policy.
    pub async fn verify(&self, token: &str, now: i64) -> Result<GoogleClaims, GoogleTokenError> {
        let jwks = self.jwks().await?;
        verify_with_jwks(token, &jwks, &self.client_id, now)
    }

    async fn jwks(&self) -> Result<Jwks, GoogleTokenError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < JWKS_CACHE_TTL {
                    return Ok(cached.jwks.clone());
                }
            }
        }

        debug!(url = %self.jwks_url, "Fetching Google JWKS");
        let jwks: Jwks = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|err| GoogleTokenError::Jwks(err.into()))?
            .error_for_status()
            .map_err(|err| GoogleTokenError::Jwks(err.into()))?
            .json()
            .await
            .map_err(|err| GoogleTokenError::Jwks(err.into()))?;

        let mut cache = self.cache.write().await;
        *cache = Some(CachedJwks {
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });

        Ok(jwks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::jwks::{key_id, Jwk};
    use crate::token::test_keys::test_private_key;
    use rsa::{RsaPrivateKey, RsaPublicKey};
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;
    const CLIENT_ID: &str = "12345.apps.googleusercontent.com";

    fn test_jwks(key: &RsaPrivateKey) -> (Jwks, String) {
        let public = RsaPublicKey::from(key);
        let kid = key_id(&public);
        let jwks = Jwks {
            keys: vec![Jwk::from_rsa_public_key(&public, kid.clone())],
        };
        (jwks, kid)
    }

    fn sign(key: &RsaPrivateKey, kid: &str, claims: &serde_json::Value) -> String {
        jwt::sign_rs256(key, kid, claims).unwrap()
    }

    fn google_claims(exp: i64) -> serde_json::Value {
        json!({
            "iss": "https://accounts.google.com",
            "aud": CLIENT_ID,
            "sub": "108234567890",
            "exp": exp,
            "email": "alice@example.com",
            "email_verified": true,
            "name": "Alice Example",
            "picture": "https://example.com/alice.png",
        })
    }

    #[test]
    fn accepts_a_valid_token() {
        let key = test_private_key();
        let (jwks, kid) = test_jwks(&key);
        let token = sign(&key, &kid, &google_claims(NOW + 300));

        let claims = verify_with_jwks(&token, &jwks, CLIENT_ID, NOW).unwrap();
        assert_eq!(claims.sub, "108234567890");
        assert_eq!(claims.email.as_deref(), Some("alice@example.com"));
        assert!(claims.email_verified);
    }

    #[test]
    fn accepts_the_bare_issuer_variant() {
        let key = test_private_key();
        let (jwks, kid) = test_jwks(&key);
        let mut claims = google_claims(NOW + 300);
        claims["iss"] = json!("accounts.google.com");
        let token = sign(&key, &kid, &claims);

        assert!(verify_with_jwks(&token, &jwks, CLIENT_ID, NOW).is_ok());
    }

    #[test]
    fn rejects_untrusted_issuers() {
        let key = test_private_key();
        let (jwks, kid) = test_jwks(&key);
        let mut claims = google_claims(NOW + 300);
        claims["iss"] = json!("https://evil.example.com");
        let token = sign(&key, &kid, &claims);

        let err = verify_with_jwks(&token, &jwks, CLIENT_ID, NOW).unwrap_err();
        assert!(matches!(err, GoogleTokenError::Invalid(_)));
    }

    #[test]
    fn rejects_a_foreign_audience() {
        let key = test_private_key();
        let (jwks, kid) = test_jwks(&key);
        let mut claims = google_claims(NOW + 300);
        claims["aud"] = json!("someone-else.apps.googleusercontent.com");
        let token = sign(&key, &kid, &claims);

        let err = verify_with_jwks(&token, &jwks, CLIENT_ID, NOW).unwrap_err();
        assert!(matches!(err, GoogleTokenError::Invalid(_)));
    }

    #[test]
    fn rejects_an_expired_token() {
        let key = test_private_key();
        let (jwks, kid) = test_jwks(&key);
        let token = sign(&key, &kid, &google_claims(NOW));

        let err = verify_with_jwks(&token, &jwks, CLIENT_ID, NOW).unwrap_err();
        assert!(matches!(err, GoogleTokenError::Invalid(_)));
    }

    #[test]
    fn rejects_a_bad_signature() {
        let key = test_private_key();
        let (jwks, kid) = test_jwks(&key);
        let token = sign(&key, &kid, &google_claims(NOW + 300));
        let tampered = format!("{}x", token);

        assert!(verify_with_jwks(&tampered, &jwks, CLIENT_ID, NOW).is_err());
    }

    #[test]
    fn email_verified_accepts_the_string_form() {
        let key = test_private_key();
        let (jwks, kid) = test_jwks(&key);
        let mut claims = google_claims(NOW + 300);
        claims["email_verified"] = json!("true");
        let token = sign(&key, &kid, &claims);

        let claims = verify_with_jwks(&token, &jwks, CLIENT_ID, NOW).unwrap();
        assert!(claims.email_verified);
    }

    #[test]
    fn missing_email_fields_default_off() {
        let key = test_private_key();
        let (jwks, kid) = test_jwks(&key);
        let claims = json!({
            "iss": "https://accounts.google.com",
            "aud": CLIENT_ID,
            "sub": "108234567890",
            "exp": NOW + 300,
        });
        let token = sign(&key, &kid, &claims);

        let claims = verify_with_jwks(&token, &jwks, CLIENT_ID, NOW).unwrap();
        assert_eq!(claims.email, None);
        assert!(!claims.email_verified);
    }
}
