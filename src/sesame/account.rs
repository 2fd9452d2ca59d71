//! Account operations composed from the auth core and the user store.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    auth::{
        hash_password, verify_password, AuthError, Clock, CodeExchange, EmailCodes,
        SessionClaims, TokenService,
    },
    users::{is_email, normalize_email, NewUser, UserStore},
};

pub const DEFAULT_AVATAR_URL: &str = "https://sesame.dev/static/img/head_default.png";

const NAME_CHARS: (usize, usize) = (2, 20);
const PASSWORD_CHARS: (usize, usize) = (6, 20);
const EMAIL_CODE_CHARS: usize = 6;

#[derive(ToSchema, Deserialize, Debug, Clone)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub code: String,
    pub password: String,
}

#[derive(ToSchema, Deserialize, Debug, Clone)]
pub struct LoginForm {
    /// User name or email address.
    pub name: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegisteredUser {
    pub user_id: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub head_url: String,
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub user_id: i64,
    pub username: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WhoAmI {
    #[serde(rename = "userInfo")]
    pub user_info: UserInfo,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RedeemedSession {
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub username: String,
    pub head_url: String,
    pub token: String,
    #[serde(rename = "expirein_time")]
    pub expires_at: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub token: String,
}

fn check_chars(field: &str, value: &str, (min, max): (usize, usize)) -> Result<(), AuthError> {
    let count = value.chars().count();
    if (min..=max).contains(&count) {
        Ok(())
    } else {
        Err(AuthError::Validation(format!(
            "{field} must be between {min} and {max} characters"
        )))
    }
}

fn check_email(email: &str) -> Result<(), AuthError> {
    if is_email(&normalize_email(email)) {
        Ok(())
    } else {
        Err(AuthError::Validation("invalid email address".to_string()))
    }
}

impl RegisterForm {
    /// # Errors
    ///
    /// `AuthError::Validation` naming the first field out of bounds.
    pub fn validate(&self) -> Result<(), AuthError> {
        check_chars("name", &self.name, NAME_CHARS)?;
        // login looks up email-shaped input by email only
        if is_email(&normalize_email(&self.name)) {
            return Err(AuthError::Validation(
                "name must not be an email address".to_string(),
            ));
        }
        check_email(&self.email)?;
        if self.code.chars().count() != EMAIL_CODE_CHARS {
            return Err(AuthError::Validation(format!(
                "code must be {EMAIL_CODE_CHARS} characters"
            )));
        }
        check_chars("password", &self.password, PASSWORD_CHARS)
    }
}

impl LoginForm {
    /// # Errors
    ///
    /// `AuthError::Validation` naming the first field out of bounds.
    pub fn validate(&self) -> Result<(), AuthError> {
        check_chars("name", &self.name, NAME_CHARS)?;
        check_chars("password", &self.password, PASSWORD_CHARS)
    }
}

pub struct AccountService {
    tokens: TokenService,
    exchange: CodeExchange,
    email_codes: EmailCodes,
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    default_avatar_url: String,
}

impl AccountService {
    #[must_use]
    pub fn new(
        tokens: TokenService,
        exchange: CodeExchange,
        email_codes: EmailCodes,
        users: Arc<dyn UserStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tokens,
            exchange,
            email_codes,
            users,
            clock,
            default_avatar_url: DEFAULT_AVATAR_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_default_avatar_url(mut self, url: String) -> Self {
        self.default_avatar_url = url;
        self
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Mail a verification code to `email`.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed address, otherwise whatever issuing fails with.
    #[instrument(skip_all)]
    pub async fn send_verification_email(&self, email: &str) -> Result<(), AuthError> {
        check_email(email)?;
        self.email_codes.issue_code(email.trim()).await?;
        Ok(())
    }

    /// Create an account once the emailed code checks out.
    ///
    /// # Errors
    ///
    /// `Validation`, `CredentialMismatch` for a wrong or missing code,
    /// `Conflict` when the name or email is taken.
    #[instrument(skip_all, fields(name = %form.name))]
    pub async fn register(&self, form: RegisterForm) -> Result<RegisteredUser, AuthError> {
        form.validate()?;

        let email = normalize_email(&form.email);
        self.email_codes.verify_code(&email, &form.code).await?;

        if self.users.exists(&email).await? {
            return Err(AuthError::Conflict("email already exists".to_string()));
        }
        if self.users.exists(&form.name).await? {
            return Err(AuthError::Conflict("user name already exists".to_string()));
        }

        let password_hash = hash_password(&form.password)?;
        let user = self
            .users
            .create(NewUser {
                name: form.name,
                email: email.clone(),
                password_hash,
                email_verified_at: Some(self.clock.now()),
            })
            .await?;

        // the account exists now, a stale code only lingers until its ttl
        if self.email_codes.config().consume_on_success() {
            if let Err(err) = self.email_codes.consume(&email).await {
                warn!(user_id = user.id, "Failed to consume email code: {err}");
            }
        }

        info!(user_id = user.id, "user registered");
        Ok(RegisteredUser { user_id: user.id })
    }

    /// Check credentials and mint a session token.
    ///
    /// # Errors
    ///
    /// `Validation`, `NotFound` for an unknown user, `CredentialMismatch` for
    /// a wrong password.
    #[instrument(skip_all, fields(login = %form.name))]
    pub async fn login(&self, form: LoginForm) -> Result<LoginOutcome, AuthError> {
        form.validate()?;

        let user = self
            .users
            .find_by_login(&form.name)
            .await?
            .ok_or_else(|| AuthError::NotFound("user is not registered".to_string()))?;

        if !verify_password(&user.password_hash, &form.password) {
            debug!(user_id = user.id, "password mismatch");
            return Err(AuthError::CredentialMismatch(
                "password verification failed".to_string(),
            ));
        }

        let head_url = if user.head_url.is_empty() {
            self.default_avatar_url.clone()
        } else {
            user.head_url
        };

        let claims = self
            .tokens
            .claims_for(user.id, &user.name, &user.email, &head_url);
        let token = self.tokens.create_token(&claims)?;

        info!(user_id = user.id, "user logged in");
        Ok(LoginOutcome {
            id: user.id,
            username: user.name,
            email: user.email,
            head_url,
            token,
        })
    }

    /// Resolve a token into the principal it names.
    ///
    /// # Errors
    ///
    /// The token error kind, unchanged.
    pub fn who_am_i(&self, token: &str) -> Result<WhoAmI, AuthError> {
        let claims = self.tokens.parse_token(token)?;
        Ok(WhoAmI {
            user_info: UserInfo {
                user_id: claims.sub,
                username: claims.name,
                email: claims.email,
            },
        })
    }

    /// Wrap `token` behind a single-use authorization code.
    ///
    /// # Errors
    ///
    /// Store failures only; the token is not inspected.
    pub async fn issue_exchange_code(&self, token: &str) -> Result<String, AuthError> {
        Ok(self.exchange.create_code(token).await?)
    }

    /// Redeem an authorization code and describe the session it carried.
    ///
    /// The code is spent even when the carried token turns out to be invalid.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown, spent or expired code, or the token error kind.
    pub async fn redeem_exchange_code(&self, code: &str) -> Result<RedeemedSession, AuthError> {
        if code.is_empty() {
            return Err(AuthError::Validation("code must not be empty".to_string()));
        }
        let token = self.exchange.redeem_code(code).await?;
        let SessionClaims {
            sub,
            name,
            avatar,
            exp,
            ..
        } = self.tokens.parse_token(&token)?;
        Ok(RedeemedSession {
            user_id: sub,
            username: name,
            head_url: avatar,
            token,
            expires_at: exp,
        })
    }

    /// Re-sign a token, expired or not, with a fresh refresh window.
    ///
    /// # Errors
    ///
    /// Any token error other than expiry.
    pub fn refresh(&self, token: &str) -> Result<RefreshedToken, AuthError> {
        Ok(RefreshedToken {
            token: self.tokens.refresh_token(token)?,
        })
    }
}
