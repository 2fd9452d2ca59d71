use super::{
    account::{
        LoginForm, LoginOutcome, RedeemedSession, RefreshedToken, RegisterForm, RegisteredUser,
        UserInfo, WhoAmI,
    },
    handlers::{self, health::Health},
    state::AuthConfig,
};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::email_code::send_email_code,
        handlers::register::register,
        handlers::login::login,
        handlers::user::user,
        handlers::exchange::create_code,
        handlers::exchange::get_token_by_code,
        handlers::refresh::refresh_token,
    ),
    components(schemas(
        Health,
        RegisterForm,
        RegisteredUser,
        LoginForm,
        LoginOutcome,
        UserInfo,
        WhoAmI,
        RedeemedSession,
        RefreshedToken,
    )),
    modifiers(&TokenSecurity),
    tags(
        (name = "account", description = "Registration, login and token handoff"),
        (name = "health", description = "Build and version information"),
    )
)]
struct ApiDoc;

/// Documents the two places a session token can travel.
struct TokenSecurity;

impl Modify for TokenSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components.add_security_scheme(
            "cookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(
                crate::auth::extract::DEFAULT_COOKIE_NAME,
            ))),
        );
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc.info.description = Some(env!("CARGO_PKG_DESCRIPTION").to_string());
    doc
}

/// Same document, with the cookie scheme renamed to the configured cookie.
#[must_use]
pub fn openapi_for(config: &AuthConfig) -> utoipa::openapi::OpenApi {
    let mut doc = openapi();
    if let Some(components) = doc.components.as_mut() {
        components.add_security_scheme(
            "cookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(config.cookie_name()))),
        );
    }
    doc
}
