//! Ephemeral key/value storage with per-entry expiry.
//!
//! Authorization codes and email verification codes both live here. The only
//! mutation with a correctness requirement beyond last-write-wins is
//! [`CodeStore::take`], which must hand a value to at most one caller.
//!
//! Backends:
//! - [`MemoryCodeStore`]: single process, used in dev mode and tests.
//! - [`PgCodeStore`]: shared across instances through the `ephemeral_codes` table.

use async_trait::async_trait;
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error};

mod memory;
mod postgres;

pub use memory::MemoryCodeStore;
pub use postgres::PgCodeStore;

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("code store did not answer within {0:?}")]
    Timeout(Duration),
    #[error("code store failure: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Store `value` under `key` for `ttl`, replacing any previous entry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Read a live entry without removing it.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Remove an entry and return its value if it was still live.
    ///
    /// Concurrent calls for the same key return `Some` to at most one caller.
    async fn take(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Remove an entry. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Drop every expired entry and return how many were removed.
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

/// Run a store call with a deadline. Expiry becomes [`StoreError::Timeout`],
/// never an empty result.
///
/// # Errors
///
/// The call's own error, or `StoreError::Timeout`.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}

/// Periodically purge expired entries until the task is aborted.
pub fn spawn_sweeper(store: Arc<dyn CodeStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match bounded(DEFAULT_STORE_TIMEOUT, store.purge_expired()).await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "purged expired codes"),
                Err(err) => error!("Failed to purge expired codes: {err}"),
            }
        }
    })
}

/// Whole seconds covering `ttl`, rounded up.
pub(crate) fn ttl_seconds(ttl: Duration) -> i64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    i64::try_from(secs).unwrap_or(i64::MAX)
}
