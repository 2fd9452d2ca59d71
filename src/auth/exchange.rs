//! Authorization codes: a short opaque handle standing in for a session token
//! while it moves between clients.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use std::{sync::Arc, time::Duration};
use tracing::{debug, instrument};

use super::error::ExchangeError;
use crate::store::{bounded, CodeStore, DEFAULT_STORE_TIMEOUT};

pub const DEFAULT_EXCHANGE_CODE_TTL: Duration = Duration::from_secs(60);
const KEY_PREFIX: &str = "AuthCode:";
const CODE_BYTES: usize = 32;

pub struct CodeExchange {
    store: Arc<dyn CodeStore>,
    ttl: Duration,
    store_timeout: Duration,
}

impl CodeExchange {
    #[must_use]
    pub fn new(store: Arc<dyn CodeStore>) -> Self {
        Self {
            store,
            ttl: DEFAULT_EXCHANGE_CODE_TTL,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Bind a fresh code to `token`. The token itself is not inspected.
    ///
    /// # Errors
    ///
    /// `Entropy` if the OS RNG fails, `Store` if the code cannot be saved.
    #[instrument(skip_all)]
    pub async fn create_code(&self, token: &str) -> Result<String, ExchangeError> {
        let code = generate_code()?;
        bounded(
            self.store_timeout,
            self.store.set(&storage_key(&code), token, self.ttl),
        )
        .await?;
        debug!(ttl = ?self.ttl, "authorization code issued");
        Ok(code)
    }

    /// Return the token bound to `code` and remove the binding.
    ///
    /// # Errors
    ///
    /// `CodeNotFound` if the code was never issued, was already redeemed or
    /// has expired. `Store` on store failure or timeout.
    #[instrument(skip_all)]
    pub async fn redeem_code(&self, code: &str) -> Result<String, ExchangeError> {
        bounded(self.store_timeout, self.store.take(&storage_key(code)))
            .await?
            .ok_or(ExchangeError::CodeNotFound)
    }
}

fn storage_key(code: &str) -> String {
    format!("{KEY_PREFIX}{code}")
}

fn generate_code() -> Result<String, ExchangeError> {
    let mut bytes = [0u8; CODE_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| ExchangeError::Entropy(e.to_string()))?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}
