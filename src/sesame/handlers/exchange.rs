use axum::{
    extract::{Extension, Query},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::IntoParams;

use super::{request_token, response::success};
use crate::sesame::{account::RedeemedSession, state::AppState};

#[derive(Deserialize, IntoParams, Debug)]
pub struct CodeQuery {
    /// Authorization code returned by `create_code`.
    #[serde(default)]
    code: String,
}

#[utoipa::path(
    post,
    path= "/v1/account/create_code",
    responses (
        (status = 200, description = "Single-use authorization code bound to the caller's token", body = String, content_type = "application/json"),
        (status = 401, description = "No token in the request"),
    ),
    security(("bearer" = []), ("cookie" = [])),
    tag= "account"
)]
#[instrument(skip_all)]
pub async fn create_code(state: Extension<Arc<AppState>>, headers: HeaderMap) -> Response {
    let token = match request_token(&state, &headers) {
        Ok(token) => token,
        Err(err) => return err.into_response(),
    };
    match state.accounts().issue_exchange_code(&token).await {
        Ok(code) => success(code),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path= "/v1/account/get_token_by_code",
    params(CodeQuery),
    responses (
        (status = 200, description = "Token the code was bound to, with its principal", body = RedeemedSession, content_type = "application/json"),
        (status = 400, description = "Empty code"),
        (status = 401, description = "The bound token is no longer valid"),
        (status = 404, description = "Unknown, expired or already redeemed code"),
    ),
    tag= "account"
)]
#[instrument(skip_all)]
pub async fn get_token_by_code(
    state: Extension<Arc<AppState>>,
    Query(query): Query<CodeQuery>,
) -> Response {
    match state.accounts().redeem_exchange_code(&query.code).await {
        Ok(session) => success(session),
        Err(err) => err.into_response(),
    }
}
