use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error};

use super::types::{ErrorResponse, VerifyRequest};
use super::{error_json, idp_error_response, normalize_phone, valid_phone_number};
use crate::idp::{ChallengeOutcome, storage};
use crate::sesamo::AuthState;
use crate::token::TokenSet;

fn valid_otp(otp: &str, length: u32) -> bool {
    otp.len() == length as usize && otp.bytes().all(|b| b.is_ascii_digit())
}

#[utoipa::path(
    post,
    path= "/auth/verify",
    request_body = VerifyRequest,
    responses (
        (status = 200, description = "Authentication successful", body = TokenSet),
        (status = 400, description = "Malformed phone number or passcode", body = ErrorResponse),
        (status = 401, description = "Wrong or expired passcode; a fresh session is included while attempts remain", body = ErrorResponse),
    ),
    tag= "auth"
)]
// axum handler for answering an OTP challenge
pub async fn verify(
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, error_json("Missing payload")).into_response();
    };

    let phone = normalize_phone(&request.phone);
    if !valid_phone_number(phone) {
        error!("Invalid phone number");

        return (StatusCode::BAD_REQUEST, error_json("Invalid phone number")).into_response();
    }

    if !valid_otp(&request.otp, state.flow.config().otp_length) {
        error!("Malformed passcode");

        return (StatusCode::BAD_REQUEST, error_json("Invalid OTP")).into_response();
    }

    let user = match storage::lookup_user(&pool, phone).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            debug!("Unknown user");

            return (StatusCode::UNAUTHORIZED, error_json("Unauthorized")).into_response();
        }
        Err(err) => {
            let (status, body) = idp_error_response(&err.into());
            return (status, body).into_response();
        }
    };

    match state
        .flow
        .respond_to_challenge(&user, &request.session, &request.otp)
    {
        Ok(ChallengeOutcome::Tokens(tokens)) => {
            debug!("Login successful");

            (StatusCode::OK, Json(tokens)).into_response()
        }
        Ok(ChallengeOutcome::Retry {
            session,
            public_parameters,
        }) => {
            debug!("Wrong passcode, retry allowed");

            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid OTP".to_string(),
                    session: Some(session),
                    dev_otp: public_parameters.dev_otp,
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

#[cfg(test)]
mod tests {
    use super::valid_otp;

    #[test]
    fn otp_shape_is_checked() {
        assert!(valid_otp("123456", 6));
        assert!(valid_otp("000000", 6));
        assert!(!valid_otp("12345", 6));
        assert!(!valid_otp("1234567", 6));
        assert!(!valid_otp("12345a", 6));
        assert!(!valid_otp("", 6));
        assert!(valid_otp("1234", 4));
    }
}
