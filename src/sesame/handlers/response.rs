//! `{code, msg, data}` response envelope and error rendering.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use crate::auth::AuthError;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub code: u16,
    pub msg: String,
    pub data: T,
}

/// 200 with `msg = "success"`.
pub fn success<T: Serialize>(data: T) -> Response {
    let body = Envelope {
        code: StatusCode::OK.as_u16(),
        msg: "success".to_string(),
        data,
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Error envelope whose `code` mirrors the HTTP status.
pub fn failure(status: StatusCode, msg: impl Into<String>) -> Response {
    let body = Envelope {
        code: status.as_u16(),
        msg: msg.into(),
        data: Value::Null,
    };
    (status, Json(body)).into_response()
}

/// Status and client-facing message for an error kind.
#[must_use]
pub fn status_and_message(err: &AuthError) -> (StatusCode, String) {
    match err {
        AuthError::Validation(detail) => (StatusCode::BAD_REQUEST, detail.clone()),
        AuthError::NotFound(detail) => (StatusCode::NOT_FOUND, detail.clone()),
        AuthError::Conflict(detail) => (StatusCode::CONFLICT, detail.clone()),
        AuthError::CredentialMismatch(detail) => (StatusCode::UNAUTHORIZED, detail.clone()),
        AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "token expired".to_string()),
        AuthError::MissingToken
        | AuthError::TokenMalformed
        | AuthError::TokenNotYetValid
        | AuthError::TokenInvalid => (StatusCode::UNAUTHORIZED, "not logged in".to_string()),
        AuthError::Delivery(_) => (
            StatusCode::BAD_GATEWAY,
            "verification email could not be delivered".to_string(),
        ),
        AuthError::Unavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "service temporarily unavailable".to_string(),
        ),
        AuthError::Infrastructure(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
        ),
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::Infrastructure(detail) => error!("Request failed: {detail}"),
            AuthError::Unavailable(detail) | AuthError::Delivery(detail) => {
                warn!("Request failed: {detail}");
            }
            _ => {}
        }
        let (status, msg) = status_and_message(&self);
        failure(status, msg)
    }
}
