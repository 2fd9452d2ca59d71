//! User records: lookup by name or email, and creation.

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

mod memory;
mod postgres;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// Unix seconds; `None` until the address has been confirmed.
    pub email_verified_at: Option<i64>,
    pub password_hash: String,
    /// Avatar URL, empty when the user never set one.
    pub head_url: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub email_verified_at: Option<i64>,
}

#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("{0}")]
    Conflict(String),
    #[error("user store failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find a user by email when `login` looks like an address, by name
    /// otherwise.
    async fn find_by_login(&self, login: &str) -> Result<Option<UserRecord>, UserStoreError>;

    /// Whether `login` (name or email, same rule as `find_by_login`) is taken.
    async fn exists(&self, login: &str) -> Result<bool, UserStoreError>;

    /// Insert a user. Name and email must both be unused.
    async fn create(&self, user: NewUser) -> Result<UserRecord, UserStoreError>;
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn is_email(login: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(login))
}
