//! Sealed session tokens.
//!
//! The protocol is stateless server-side: the whole challenge state,
//! including the expected answer, travels to the client and back inside the
//! session token. That makes confidentiality and integrity mandatory, so the
//! state is sealed with ChaCha20-Poly1305 under a server key and encoded as
//! base64url `nonce (12 bytes) || ciphertext`.

use anyhow::{anyhow, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::challenge::{AttemptRecord, ChallengeStrategy, PrivateChallengeParameters};

// Binds ciphertexts to this purpose; bump on layout changes.
const SESSION_AAD: &[u8] = b"sesamo.session.v1";
const NONCE_LEN: usize = 12;

/// Challenge state carried between invocations.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub username: String,
    pub strategy: ChallengeStrategy,
    /// Session history, most recent attempt last.
    pub session: Vec<AttemptRecord>,
    /// Secret material of the currently pending challenge.
    pub private_parameters: Option<PrivateChallengeParameters>,
    /// Encoded metadata of the currently pending challenge.
    pub challenge_metadata: Option<String>,
}

/// Seals and opens session tokens under a fixed 32-byte key.
#[derive(Clone)]
pub struct SessionSealer {
    key: [u8; 32],
}

impl SessionSealer {
    #[must_use]
    pub const fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Ephemeral key for deployments without a configured one. Restarting
    /// the process invalidates all in-flight logins.
    #[must_use]
    pub fn ephemeral() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    /// Seal `state` into an opaque token.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or encryption fails.
    pub fn seal(&self, state: &SessionState) -> Result<String> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let plaintext = serde_json::to_vec(state)?;
        let payload = Payload {
            msg: &plaintext,
            aad: SESSION_AAD,
        };

        let ciphertext = cipher
            .encrypt(nonce, payload)
            .map_err(|e| anyhow!("Session seal failure: {e}"))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(Base64UrlUnpadded::encode_string(&sealed))
    }

    /// Open a token produced by [`seal`](Self::seal).
    ///
    /// # Errors
    ///
    /// Returns an error for undecodable, truncated, tampered or
    /// foreign-keyed tokens. Callers treat every failure as
    /// "not authorized" - the input is attacker-reachable.
    pub fn open(&self, token: &str) -> Result<SessionState> {
        let sealed = Base64UrlUnpadded::decode_vec(token)
            .map_err(|_| anyhow!("Invalid session token encoding"))?;

        if sealed.len() < NONCE_LEN {
            return Err(anyhow!("Session token too short"));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let payload = Payload {
            msg: ciphertext,
            aad: SESSION_AAD,
        };

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), payload)
            .map_err(|e| anyhow!("Session open failure: {e}"))?;

        Ok(serde_json::from_slice(&plaintext)?)
    }
}
