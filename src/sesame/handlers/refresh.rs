use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::instrument;

use super::{request_token, response::success};
use crate::sesame::{account::RefreshedToken, state::AppState};

#[utoipa::path(
    post,
    path= "/v1/account/refresh_token",
    responses (
        (status = 200, description = "Token re-signed with a new expiry, even if it had expired", body = RefreshedToken, content_type = "application/json"),
        (status = 401, description = "Missing, malformed, not yet valid or wrongly signed token"),
    ),
    security(("bearer" = []), ("cookie" = [])),
    tag= "account"
)]
#[instrument(skip_all)]
pub async fn refresh_token(state: Extension<Arc<AppState>>, headers: HeaderMap) -> Response {
    match request_token(&state, &headers).and_then(|token| state.accounts().refresh(&token)) {
        Ok(refreshed) => success(refreshed),
        Err(err) => err.into_response(),
    }
}
