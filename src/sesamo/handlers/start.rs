use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error};

use super::types::{ErrorResponse, StartRequest, StartResponse};
use super::{error_json, idp_error_response, normalize_phone, valid_phone_number};
use crate::challenge::ChallengeStrategy;
use crate::idp::{UserAttributes, storage};
use crate::sesamo::AuthState;

#[utoipa::path(
    post,
    path= "/auth/start",
    request_body = StartRequest,
    responses (
        (status = 200, description = "Challenge issued, OTP sent via SMS", body = StartResponse),
        (status = 400, description = "Invalid phone number", body = ErrorResponse),
        (status = 502, description = "SMS delivery or database failure", body = ErrorResponse),
    ),
    tag= "auth"
)]
// axum handler for starting an OTP login
pub async fn start(
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<StartRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, error_json("Missing payload")).into_response();
    };

    let phone = normalize_phone(&request.phone);
    if !valid_phone_number(phone) {
        error!("Invalid phone number");

        return (StatusCode::BAD_REQUEST, error_json("Invalid phone number")).into_response();
    }

    // The phone number is the username; the record is created on first login.
    let desired = UserAttributes {
        phone_number: Some(phone.to_string()),
        phone_number_verified: Some(true),
        ..UserAttributes::default()
    };

    let user = match storage::ensure_user(&pool, phone, desired).await {
        Ok(user) => user,
        Err(err) => {
            let (status, body) = idp_error_response(&err);
            return (status, body).into_response();
        }
    };

    match state.flow.initiate_auth(&user, ChallengeStrategy::SmsOtp) {
        Ok(started) => {
            debug!("Challenge issued");

            (
                StatusCode::OK,
                Json(StartResponse {
                    session: started.session,
                    phone: phone.to_string(),
                    dev_otp: started.public_parameters.dev_otp,
                }),
            )
                .into_response()
        }
        Err(err) => {
            let (status, body) = idp_error_response(&err);
            (status, body).into_response()
        }
    }
}
