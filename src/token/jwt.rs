//! RS256 JWT signing and verification.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{errors::Error as RsaError, RsaPrivateKey};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use super::jwks::Jwks;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    pub alg: String,
    pub typ: String,
    pub kid: String,
}

impl Header {
    fn rs256(kid: impl Into<String>) -> Self {
        Self {
            alg: "RS256".to_string(),
            typ: "JWT".to_string(),
            kid: kid.into(),
        }
    }
}

/// What a token is good for. Verifiers must check this matches the slot the
/// token arrived in; an access token must never pass as a refresh token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Id,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub token_use: TokenUse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("failed to parse RSA key")]
    KeyParse,
    #[error("rsa error")]
    Rsa(#[from] RsaError),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid audience")]
    InvalidAudience,
    #[error("invalid token use")]
    InvalidTokenUse,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: DeserializeOwned>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Parse an RSA private key from PKCS#8 or PKCS#1, PEM or DER.
///
/// # Errors
///
/// Returns [`Error::KeyParse`] when no format matches.
pub fn decode_private_key(pem_or_der: &[u8]) -> Result<RsaPrivateKey, Error> {
    if pem_or_der.starts_with(b"-----BEGIN") {
        let s = std::str::from_utf8(pem_or_der).map_err(|_| Error::KeyParse)?;
        if let Ok(k) = RsaPrivateKey::from_pkcs8_pem(s) {
            return Ok(k);
        }
        if let Ok(k) = RsaPrivateKey::from_pkcs1_pem(s) {
            return Ok(k);
        }
        return Err(Error::KeyParse);
    }

    if let Ok(k) = RsaPrivateKey::from_pkcs8_der(pem_or_der) {
        return Ok(k);
    }
    if let Ok(k) = RsaPrivateKey::from_pkcs1_der(pem_or_der) {
        return Ok(k);
    }
    Err(Error::KeyParse)
}

/// Create an RS256 signed JWT from arbitrary serializable claims.
///
/// # Errors
///
/// Returns an error if claims/header JSON cannot be encoded or signing fails.
pub fn sign_rs256<T: Serialize>(
    private_key: &RsaPrivateKey,
    kid: impl Into<String>,
    claims: &T,
) -> Result<String, Error> {
    let header = Header::rs256(kid);
    let header_b64 = b64e_json(&header)?;
    let claims_b64 = b64e_json(claims)?;
    let signing_input = format!("{header_b64}.{claims_b64}");

    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let signature: Signature = signing_key.sign(signing_input.as_bytes());
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature.to_vec());

    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Verify structure, algorithm, key id and RS256 signature, then decode the
/// claims. Claim policy (issuer, audience, expiry, token use) is the
/// caller's job; this seam is shared with the federated bridge, which
/// applies a different policy over the same mechanics.
///
/// # Errors
///
/// Returns an error for malformed tokens, unknown `kid`s, unsupported
/// algorithms or bad signatures.
pub fn verify_signature<T: DeserializeOwned>(token: &str, jwks: &Jwks) -> Result<T, Error> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let claims_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let sig_b64 = parts.next().ok_or(Error::TokenFormat)?;
    if parts.next().is_some() {
        return Err(Error::TokenFormat);
    }

    let header: Header = b64d_json(header_b64)?;
    if header.alg != "RS256" {
        return Err(Error::UnsupportedAlg(header.alg));
    }

    let jwk = jwks
        .find_by_kid(&header.kid)
        .ok_or_else(|| Error::UnknownKid(header.kid.clone()))?;

    let public_key = jwk.to_rsa_public_key()?;
    let verifying_key = VerifyingKey::<Sha256>::new(public_key);
    let signing_input = format!("{header_b64}.{claims_b64}");
    let signature_bytes = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::Base64)?;
    let signature =
        Signature::try_from(signature_bytes.as_slice()).map_err(|_| Error::InvalidSignature)?;
    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| Error::InvalidSignature)?;

    b64d_json(claims_b64)
}

/// Verify an RS256 token end to end and return its decoded claims.
///
/// # Errors
///
/// Returns an error if the signature check fails or the claims fail
/// validation (`iss`, `aud`, `exp`).
pub fn verify_rs256(
    token: &str,
    jwks: &Jwks,
    expected_issuer: &str,
    expected_audience: &str,
    now_unix_seconds: i64,
) -> Result<Claims, Error> {
    let claims: Claims = verify_signature(token, jwks)?;

    if claims.iss != expected_issuer {
        return Err(Error::InvalidIssuer);
    }
    if claims.aud != expected_audience {
        return Err(Error::InvalidAudience);
    }
    if claims.exp <= now_unix_seconds {
        return Err(Error::Expired);
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::jwks::{key_id, Jwk};
    use crate::token::test_keys::test_private_key;
    use rsa::RsaPublicKey;

    const NOW: i64 = 1_700_000_000;

    fn test_jwks(key: &RsaPrivateKey, kid: &str) -> Jwks {
        let public = RsaPublicKey::from(key);
        Jwks {
            keys: vec![Jwk::from_rsa_public_key(&public, kid)],
        }
    }

    fn claims(exp: i64) -> Claims {
        Claims {
            iss: "sesamo".to_string(),
            aud: "app".to_string(),
            sub: "user-1".to_string(),
            exp,
            iat: NOW,
            jti: "01J00000000000000000000000".to_string(),
            token_use: TokenUse::Access,
            username: Some("+15551230001".to_string()),
            phone_number: None,
            email: None,
            name: None,
        }
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let key = test_private_key();
        let kid = key_id(&RsaPublicKey::from(&key));
        let token = sign_rs256(&key, &kid, &claims(NOW + 60)).unwrap();

        let verified =
            verify_rs256(&token, &test_jwks(&key, &kid), "sesamo", "app", NOW).unwrap();
        assert_eq!(verified, claims(NOW + 60));
    }

    #[test]
    fn expired_token_is_rejected() {
        let key = test_private_key();
        let token = sign_rs256(&key, "kid-1", &claims(NOW)).unwrap();
        let err = verify_rs256(&token, &test_jwks(&key, "kid-1"), "sesamo", "app", NOW)
            .unwrap_err();
        assert!(matches!(err, Error::Expired));
    }

    #[test]
    fn wrong_issuer_and_audience_are_rejected() {
        let key = test_private_key();
        let token = sign_rs256(&key, "kid-1", &claims(NOW + 60)).unwrap();
        let jwks = test_jwks(&key, "kid-1");

        assert!(matches!(
            verify_rs256(&token, &jwks, "other", "app", NOW),
            Err(Error::InvalidIssuer)
        ));
        assert!(matches!(
            verify_rs256(&token, &jwks, "sesamo", "other", NOW),
            Err(Error::InvalidAudience)
        ));
    }

    #[test]
    fn unknown_kid_is_rejected() {
        let key = test_private_key();
        let token = sign_rs256(&key, "kid-unknown", &claims(NOW + 60)).unwrap();
        let err = verify_rs256(&token, &test_jwks(&key, "kid-1"), "sesamo", "app", NOW)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownKid(_)));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let key = test_private_key();
        let token = sign_rs256(&key, "kid-1", &claims(NOW + 60)).unwrap();
        let jwks = test_jwks(&key, "kid-1");

        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = b64e_json(&claims(NOW + 9999)).unwrap();
        parts[1] = &forged;
        let tampered = parts.join(".");

        assert!(matches!(
            verify_rs256(&tampered, &jwks, "sesamo", "app", NOW),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let key = test_private_key();
        let jwks = test_jwks(&key, "kid-1");
        for token in ["", "a.b", "a.b.c.d", "!.!.!"] {
            assert!(verify_rs256(token, &jwks, "sesamo", "app", NOW).is_err());
        }
    }

    #[test]
    fn token_use_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(TokenUse::Refresh).unwrap(),
            serde_json::Value::String("refresh".to_string())
        );
    }
}
