use crate::{store::StoreError, users::UserStoreError};
use thiserror::Error;

/// Signed token failures. Callers render expiry differently from the rest,
/// so every kind stays distinct.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token is expired")]
    Expired,
    #[error("token is not valid yet")]
    NotYetValid,
    #[error("token is invalid")]
    Invalid,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("authorization code not found")]
    CodeNotFound,
    #[error("failed to generate authorization code: {0}")]
    Entropy(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum EmailCodeError {
    #[error("no verification code was issued for this address")]
    Missing,
    #[error("verification code does not match")]
    Mismatch,
    #[error("verification email could not be delivered: {0}")]
    Delivery(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
#[error("failed to hash password: {0}")]
pub struct PasswordError(pub String);

/// Outcome kinds of the account operations exposed to handlers.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    CredentialMismatch(String),
    #[error("missing token")]
    MissingToken,
    #[error("token is malformed")]
    TokenMalformed,
    #[error("token is expired")]
    TokenExpired,
    #[error("token is not valid yet")]
    TokenNotYetValid,
    #[error("token is invalid")]
    TokenInvalid,
    #[error("{0}")]
    Delivery(String),
    /// Infrastructure that did not answer within its deadline.
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Infrastructure(String),
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed => Self::TokenMalformed,
            TokenError::Expired => Self::TokenExpired,
            TokenError::NotYetValid => Self::TokenNotYetValid,
            TokenError::Invalid => Self::TokenInvalid,
            TokenError::Signing(message) => Self::Infrastructure(message),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout(_) => Self::Unavailable(err.to_string()),
            StoreError::Backend(_) => Self::Infrastructure(err.to_string()),
        }
    }
}

impl From<ExchangeError> for AuthError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::CodeNotFound => Self::NotFound(err.to_string()),
            ExchangeError::Entropy(_) => Self::Infrastructure(err.to_string()),
            ExchangeError::Store(err) => err.into(),
        }
    }
}

impl From<EmailCodeError> for AuthError {
    fn from(err: EmailCodeError) -> Self {
        match err {
            EmailCodeError::Missing | EmailCodeError::Mismatch => {
                Self::CredentialMismatch("invalid email verification code".to_string())
            }
            EmailCodeError::Delivery(_) => Self::Delivery(err.to_string()),
            EmailCodeError::Store(err) => err.into(),
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        Self::Infrastructure(err.to_string())
    }
}

impl From<UserStoreError> for AuthError {
    fn from(err: UserStoreError) -> Self {
        match err {
            UserStoreError::Conflict(message) => Self::Conflict(message),
            UserStoreError::Backend(_) => Self::Infrastructure(err.to_string()),
        }
    }
}
