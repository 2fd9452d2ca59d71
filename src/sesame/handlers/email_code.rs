use axum::{
    extract::{Extension, Query},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;
use utoipa::IntoParams;

use super::response::success;
use crate::sesame::state::AppState;

#[derive(Deserialize, IntoParams, Debug)]
pub struct EmailQuery {
    /// Address the verification code is sent to.
    #[serde(default)]
    email: String,
}

#[utoipa::path(
    post,
    path= "/v1/account/send_email_code",
    params(EmailQuery),
    responses (
        (status = 200, description = "Verification code sent"),
        (status = 400, description = "Invalid email address"),
        (status = 502, description = "The email could not be delivered"),
    ),
    tag= "account"
)]
#[instrument(skip_all)]
pub async fn send_email_code(
    state: Extension<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> Response {
    match state.accounts().send_verification_email(&query.email).await {
        Ok(()) => success(Value::Null),
        Err(err) => err.into_response(),
    }
}
