//! Wire types for the auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct StartRequest {
    /// Phone number in E.164 format.
    pub phone: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct StartResponse {
    /// Opaque session token; echo it back on `/auth/verify`.
    pub session: String,
    pub phone: String,
    /// Present only when SMS dev echo is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_otp: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyRequest {
    pub phone: String,
    pub otp: String,
    pub session: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct GoogleRequest {
    /// Google-issued id token from the client-side sign-in flow.
    pub id_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    /// Fresh session token when a retry is still possible.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_otp: Option<String>,
}
