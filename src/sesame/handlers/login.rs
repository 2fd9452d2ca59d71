use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, SET_COOKIE},
        HeaderValue,
    },
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{error, instrument};

use super::{response::success, Payload};
use crate::sesame::{
    account::{LoginForm, LoginOutcome},
    state::{AppState, AuthConfig},
};

#[utoipa::path(
    post,
    path= "/v1/account/login",
    request_body(content = LoginForm, description = "JSON or urlencoded form; name may be a user name or an email"),
    responses (
        (status = 200, description = "Logged in; the token is also set as a cookie", body = LoginOutcome, content_type = "application/json"),
        (status = 400, description = "Invalid form fields"),
        (status = 401, description = "Wrong password"),
        (status = 404, description = "User is not registered"),
    ),
    tag= "account"
)]
#[instrument(skip_all)]
pub async fn login(state: Extension<Arc<AppState>>, Payload(form): Payload<LoginForm>) -> Response {
    let outcome = match state.accounts().login(form).await {
        Ok(outcome) => outcome,
        Err(err) => return err.into_response(),
    };

    let cookie = session_cookie(state.config(), &outcome.token);
    let mut response = success(outcome);
    match cookie {
        Ok(cookie) => {
            response.headers_mut().insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }
    response
}

/// `HttpOnly` cookie carrying the session token for cookie-based extraction.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.cookie_name();
    let max_age = config.session_ttl().as_secs();
    let mut cookie = format!("{name}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}
