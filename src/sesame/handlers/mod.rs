pub mod health;
pub use self::health::health;

pub mod register;
pub use self::register::register;

pub mod login;
pub use self::login::login;

pub mod user;
pub use self::user::user;

pub mod exchange;
pub use self::exchange::{create_code, get_token_by_code};

pub mod email_code;
pub use self::email_code::send_email_code;

pub mod refresh;
pub use self::refresh::refresh_token;

pub mod response;

// common functions for the handlers
use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::{header::CONTENT_TYPE, HeaderMap},
    Form, Json,
};
use serde::de::DeserializeOwned;

use super::state::AppState;
use crate::auth::AuthError;

/// Request body accepted as JSON or as an urlencoded form, chosen by
/// `Content-Type`.
#[derive(Debug, Clone)]
pub struct Payload<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Payload<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|rejection| AuthError::Validation(rejection.body_text()))?;
            Ok(Self(value))
        } else {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|rejection| AuthError::Validation(rejection.body_text()))?;
            Ok(Self(value))
        }
    }
}

/// The session token carried by the request, from the first configured
/// source that has one.
pub(crate) fn request_token(state: &AppState, headers: &HeaderMap) -> Result<String, AuthError> {
    state
        .extractors()
        .extract(headers)
        .ok_or(AuthError::MissingToken)
}
