use axum::{
    extract::Extension,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::instrument;

use super::{response::success, Payload};
use crate::sesame::{
    account::{RegisterForm, RegisteredUser},
    state::AppState,
};

#[utoipa::path(
    post,
    path= "/v1/account/register",
    request_body(content = RegisterForm, description = "JSON or urlencoded form"),
    responses (
        (status = 200, description = "User created", body = RegisteredUser, content_type = "application/json"),
        (status = 400, description = "Invalid form fields"),
        (status = 401, description = "Email verification code is wrong or expired"),
        (status = 409, description = "User name or email already registered"),
    ),
    tag= "account"
)]
#[instrument(skip_all)]
pub async fn register(
    state: Extension<Arc<AppState>>,
    Payload(form): Payload<RegisterForm>,
) -> Response {
    match state.accounts().register(form).await {
        Ok(user) => success(user),
        Err(err) => err.into_response(),
    }
}
