use axum::{Json, extract::Extension, response::IntoResponse};
use std::sync::Arc;

use crate::sesamo::AuthState;

#[utoipa::path(
    get,
    path= "/jwks.json",
    responses (
        (status = 200, description = "JWKS public keys", body = String, content_type = "application/json"),
    ),
    tag= "jwks"
)]
pub async fn jwks(state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    Json(state.signer.jwks().clone())
}
