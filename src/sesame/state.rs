//! Service configuration and shared handler state.

use secrecy::SecretString;
use std::{fmt, sync::Arc, time::Duration};

use super::account::{AccountService, DEFAULT_AVATAR_URL};
use crate::{
    auth::{
        email_code::DEFAULT_EMAIL_CODE_TTL,
        exchange::DEFAULT_EXCHANGE_CODE_TTL,
        extract::{UnknownTokenSource, DEFAULT_COOKIE_NAME},
        token::DEFAULT_ISSUER,
        Clock, CodeExchange, EmailCodeConfig, EmailCodes, TokenConfig, TokenExtractors,
        TokenService,
    },
    email::{EmailSender, DEFAULT_FROM},
    store::{CodeStore, DEFAULT_STORE_TIMEOUT},
    users::UserStore,
};

const DEFAULT_SESSION_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: u64 = 60 * 60;
const DEFAULT_TOKEN_SOURCES: &str = "bearer,cookie";

#[derive(Clone)]
pub struct AuthConfig {
    signing_key: SecretString,
    issuer: String,
    session_ttl: Duration,
    refresh_ttl: Duration,
    exchange_code_ttl: Duration,
    email_code_ttl: Duration,
    email_code_single_use: bool,
    store_timeout: Duration,
    token_sources: String,
    cookie_name: String,
    default_avatar_url: String,
    frontend_origin: Option<String>,
    email_from: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(signing_key: SecretString) -> Self {
        Self {
            signing_key,
            issuer: DEFAULT_ISSUER.to_string(),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS),
            refresh_ttl: Duration::from_secs(DEFAULT_REFRESH_TTL_SECONDS),
            exchange_code_ttl: DEFAULT_EXCHANGE_CODE_TTL,
            email_code_ttl: DEFAULT_EMAIL_CODE_TTL,
            email_code_single_use: false,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            token_sources: DEFAULT_TOKEN_SOURCES.to_string(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            default_avatar_url: DEFAULT_AVATAR_URL.to_string(),
            frontend_origin: None,
            email_from: DEFAULT_FROM.to_string(),
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: u64) -> Self {
        self.refresh_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_exchange_code_ttl_seconds(mut self, seconds: u64) -> Self {
        self.exchange_code_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_email_code_ttl_seconds(mut self, seconds: u64) -> Self {
        self.email_code_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_email_code_single_use(mut self, single_use: bool) -> Self {
        self.email_code_single_use = single_use;
        self
    }

    #[must_use]
    pub fn with_store_timeout_ms(mut self, millis: u64) -> Self {
        self.store_timeout = Duration::from_millis(millis);
        self
    }

    #[must_use]
    pub fn with_token_sources(mut self, sources: String) -> Self {
        self.token_sources = sources;
        self
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: String) -> Self {
        self.cookie_name = name;
        self
    }

    #[must_use]
    pub fn with_default_avatar_url(mut self, url: String) -> Self {
        self.default_avatar_url = url;
        self
    }

    #[must_use]
    pub fn with_frontend_origin(mut self, origin: Option<String>) -> Self {
        self.frontend_origin = origin;
        self
    }

    #[must_use]
    pub fn with_email_from(mut self, from: String) -> Self {
        self.email_from = from;
        self
    }

    #[must_use]
    pub fn frontend_origin(&self) -> Option<&str> {
        self.frontend_origin.as_deref()
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.frontend_origin
            .as_deref()
            .is_some_and(|origin| origin.starts_with("https://"))
    }

    #[must_use]
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig::new(self.signing_key.clone())
            .with_issuer(self.issuer.clone())
            .with_session_ttl(self.session_ttl)
            .with_refresh_ttl(self.refresh_ttl)
    }

    #[must_use]
    pub fn email_code_config(&self) -> EmailCodeConfig {
        EmailCodeConfig::new()
            .with_ttl(self.email_code_ttl)
            .with_consume_on_success(self.email_code_single_use)
            .with_from(self.email_from.clone())
            .with_store_timeout(self.store_timeout)
    }

    /// # Errors
    ///
    /// Returns an error for an unknown entry in the token source list.
    pub fn extractors(&self) -> Result<TokenExtractors, UnknownTokenSource> {
        TokenExtractors::parse(&self.token_sources, &self.cookie_name)
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("signing_key", &"***")
            .field("issuer", &self.issuer)
            .field("session_ttl", &self.session_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("exchange_code_ttl", &self.exchange_code_ttl)
            .field("email_code_ttl", &self.email_code_ttl)
            .field("email_code_single_use", &self.email_code_single_use)
            .field("store_timeout", &self.store_timeout)
            .field("token_sources", &self.token_sources)
            .field("cookie_name", &self.cookie_name)
            .field("default_avatar_url", &self.default_avatar_url)
            .field("frontend_origin", &self.frontend_origin)
            .field("email_from", &self.email_from)
            .finish()
    }
}

/// Collaborators the account service is assembled from.
pub struct Backends {
    pub users: Arc<dyn UserStore>,
    pub codes: Arc<dyn CodeStore>,
    pub sender: Arc<dyn EmailSender>,
    pub clock: Arc<dyn Clock>,
}

/// State shared by every handler.
pub struct AppState {
    accounts: AccountService,
    extractors: TokenExtractors,
    config: AuthConfig,
}

impl AppState {
    /// # Errors
    ///
    /// Returns an error for an unknown entry in the token source list.
    pub fn new(config: AuthConfig, backends: Backends) -> Result<Self, UnknownTokenSource> {
        let extractors = config.extractors()?;

        let tokens = TokenService::new(config.token_config(), backends.clock.clone());
        let exchange = CodeExchange::new(backends.codes.clone())
            .with_ttl(config.exchange_code_ttl)
            .with_store_timeout(config.store_timeout);
        let email_codes = EmailCodes::new(
            backends.codes,
            backends.sender,
            config.email_code_config(),
        );
        let accounts = AccountService::new(
            tokens,
            exchange,
            email_codes,
            backends.users,
            backends.clock,
        )
        .with_default_avatar_url(config.default_avatar_url.clone());

        Ok(Self {
            accounts,
            extractors,
            config,
        })
    }

    #[must_use]
    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }

    #[must_use]
    pub fn extractors(&self) -> &TokenExtractors {
        &self.extractors
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}
