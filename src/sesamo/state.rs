use std::sync::Arc;

use crate::google::GoogleVerifier;
use crate::idp::CustomAuth;
use crate::token::TokenSigner;

/// Shared per-process authentication state, injected into handlers as an
/// axum `Extension<Arc<AuthState>>`.
pub struct AuthState {
    /// Drives the challenge loop.
    pub flow: CustomAuth,
    /// Mints and verifies our own tokens.
    pub signer: Arc<TokenSigner>,
    /// Verifies Google id tokens; `None` when no client id is configured.
    pub google: Option<GoogleVerifier>,
}
