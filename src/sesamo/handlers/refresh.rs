use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error};

use super::types::{ErrorResponse, RefreshRequest};
use super::{error_json, idp_error_response};
use crate::idp::{flow::identity_claims, storage};
use crate::sesamo::AuthState;
use crate::token::TokenSet;

#[utoipa::path(
    post,
    path= "/auth/refresh",
    request_body = RefreshRequest,
    responses (
        (status = 200, description = "Fresh access and id tokens; the refresh token is not rotated", body = TokenSet),
        (status = 400, description = "Missing payload", body = ErrorResponse),
        (status = 401, description = "Invalid or expired refresh token", body = ErrorResponse),
    ),
    tag= "auth"
)]
// axum handler for refreshing tokens
pub async fn refresh(
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, error_json("Missing payload")).into_response();
    };

    let now = Utc::now().timestamp();
    let claims = match state.signer.verify_refresh(&request.refresh_token, now) {
        Ok(claims) => claims,
        Err(err) => {
            debug!("Refresh token rejected: {err}");

            return (StatusCode::UNAUTHORIZED, error_json("Unauthorized")).into_response();
        }
    };

    // Re-read the directory so reissued id tokens carry current attributes.
    let Some(username) = claims.username else {
        return (StatusCode::UNAUTHORIZED, error_json("Unauthorized")).into_response();
    };

    let user = match storage::lookup_user(&pool, &username).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            debug!("Refresh for unknown user");

            return (StatusCode::UNAUTHORIZED, error_json("Unauthorized")).into_response();
        }
        Err(err) => {
            let (status, body) = idp_error_response(&err.into());
            return (status, body).into_response();
        }
    };

    match state.signer.reissue(&claims.sub, &identity_claims(&user)) {
        Ok(tokens) => (StatusCode::OK, Json(tokens)).into_response(),
        Err(err) => {
            error!("Failed to reissue tokens: {err}");

            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_json("Failed to issue tokens"),
            )
                .into_response()
        }
    }
}
