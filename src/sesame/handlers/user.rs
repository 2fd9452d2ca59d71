use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::{request_token, response::success};
use crate::sesame::{account::WhoAmI, state::AppState};

#[utoipa::path(
    get,
    path= "/v1/account/user",
    responses (
        (status = 200, description = "Principal named by the session token", body = WhoAmI, content_type = "application/json"),
        (status = 401, description = "Missing, invalid or expired token"),
    ),
    security(("bearer" = []), ("cookie" = [])),
    tag= "account"
)]
pub async fn user(state: Extension<Arc<AppState>>, headers: HeaderMap) -> Response {
    match request_token(&state, &headers).and_then(|token| state.accounts().who_am_i(&token)) {
        Ok(who) => success(who),
        Err(err) => err.into_response(),
    }
}
