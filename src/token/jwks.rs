//! JWK/JWKS value types for RSA keys.
//!
//! Used both for the keys we publish on `/jwks.json` and for remote key sets
//! (the Google bridge fetches and parses the provider's JWKS into the same
//! type).

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::jwt::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Parse a JWKS from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` is not valid JSON or doesn't match the
    /// expected JWKS shape.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Find a key by `kid` (Key ID).
    #[must_use]
    pub fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    pub kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    pub kid: String,
    pub n: String,
    pub e: String,
}

impl Jwk {
    /// Build a JWK from an RSA public key.
    #[must_use]
    pub fn from_rsa_public_key(public_key: &RsaPublicKey, kid: impl Into<String>) -> Self {
        Self {
            kty: "RSA".to_string(),
            alg: Some("RS256".to_string()),
            key_use: Some("sig".to_string()),
            kid: kid.into(),
            n: Base64UrlUnpadded::encode_string(&public_key.n().to_bytes_be()),
            e: Base64UrlUnpadded::encode_string(&public_key.e().to_bytes_be()),
        }
    }

    /// Reconstruct the RSA public key from the `n`/`e` members.
    ///
    /// # Errors
    ///
    /// Returns an error for non-RSA keys or undecodable members.
    pub fn to_rsa_public_key(&self) -> Result<RsaPublicKey, Error> {
        if self.kty != "RSA" {
            return Err(Error::KeyParse);
        }
        let n = Base64UrlUnpadded::decode_vec(&self.n).map_err(|_| Error::Base64)?;
        let e = Base64UrlUnpadded::decode_vec(&self.e).map_err(|_| Error::Base64)?;
        RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
            .map_err(|_| Error::KeyParse)
    }
}

/// Deterministic key id: truncated SHA-256 over the public modulus.
#[must_use]
pub fn key_id(public_key: &RsaPublicKey) -> String {
    let digest = Sha256::digest(public_key.n().to_bytes_be());
    let mut kid = Base64UrlUnpadded::encode_string(&digest);
    kid.truncate(16);
    kid
}
