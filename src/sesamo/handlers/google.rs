use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error};

use super::types::{ErrorResponse, GoogleRequest};
use super::{error_json, idp_error_response};
use crate::challenge::{ChallengeStrategy, FEDERATED_CHALLENGE_ANSWER};
use crate::google::GoogleTokenError;
use crate::idp::{ChallengeOutcome, UserAttributes, storage};
use crate::sesamo::AuthState;
use crate::token::TokenSet;

#[utoipa::path(
    post,
    path= "/auth/google",
    request_body = GoogleRequest,
    responses (
        (status = 200, description = "Google sign-in successful", body = TokenSet),
        (status = 400, description = "Missing id token or Google account without email", body = ErrorResponse),
        (status = 401, description = "Google token failed verification", body = ErrorResponse),
        (status = 502, description = "Google key directory unreachable", body = ErrorResponse),
    ),
    tag= "auth"
)]
// axum handler for Google sign-in
pub async fn google(
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<GoogleRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, error_json("Missing payload")).into_response();
    };

    if request.id_token.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, error_json("Missing id token")).into_response();
    }

    let Some(verifier) = state.google.as_ref() else {
        error!("Google sign-in requested but no client id is configured");

        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_json("Google sign-in is not configured"),
        )
            .into_response();
    };

    let now = Utc::now().timestamp();
    let claims = match verifier.verify(&request.id_token, now).await {
        Ok(claims) => claims,
        Err(GoogleTokenError::Invalid(reason)) => {
            debug!("Google token rejected: {reason}");

            return (StatusCode::UNAUTHORIZED, error_json("Unauthorized")).into_response();
        }
        Err(GoogleTokenError::Jwks(source)) => {
            error!("Failed to fetch Google keys: {source:#}");

            return (StatusCode::BAD_GATEWAY, error_json("Upstream failure")).into_response();
        }
    };

    if claims.sub.trim().is_empty() {
        return (StatusCode::UNAUTHORIZED, error_json("Unauthorized")).into_response();
    }

    let Some(email) = claims.email.clone().filter(|email| !email.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            error_json("Google account email is required"),
        )
            .into_response();
    };

    // Federated subjects get their own namespace so a Google `sub` can never
    // collide with a phone number.
    let username = format!("google:{}", claims.sub);
    let desired = UserAttributes {
        email: Some(email),
        email_verified: Some(claims.email_verified),
        name: claims.name.clone(),
        given_name: claims.given_name.clone(),
        family_name: claims.family_name.clone(),
        picture: claims.picture.clone(),
        ..UserAttributes::default()
    };

    let user = match storage::ensure_user(&pool, &username, desired).await {
        Ok(user) => user,
        Err(err) => {
            let (status, body) = idp_error_response(&err);
            return (status, body).into_response();
        }
    };

    // The federated strategy still walks the challenge loop, answered
    // immediately with the fixed marker.
    let outcome = state
        .flow
        .initiate_auth(&user, ChallengeStrategy::Federated)
        .and_then(|started| {
            state
                .flow
                .respond_to_challenge(&user, &started.session, FEDERATED_CHALLENGE_ANSWER)
        });

    match outcome {
        Ok(ChallengeOutcome::Tokens(tokens)) => (StatusCode::OK, Json(tokens)).into_response(),
        Ok(ChallengeOutcome::Retry { .. }) => {
            error!("Federated challenge did not settle on the first answer");

            (StatusCode::UNAUTHORIZED, error_json("Unauthorized")).into_response()
        }
        Err(err) => {
            let (status, body) = idp_error_response(&err);
            (status, body).into_response()
        }
    }
}
