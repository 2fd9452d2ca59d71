//! Six digit email verification codes gating registration.
//!
//! One active code per address: issuing again overwrites the previous one.
//! Verification only reads; the code stays usable until it expires unless the
//! caller removes it with [`EmailCodes::consume`].

use rand::{rngs::OsRng, Rng};
use std::{sync::Arc, time::Duration};
use tracing::{info, instrument, warn};

use super::error::EmailCodeError;
use crate::{
    email::{verification_message, EmailSender, DEFAULT_FROM},
    store::{bounded, CodeStore, DEFAULT_STORE_TIMEOUT},
    users::normalize_email,
};

pub const DEFAULT_EMAIL_CODE_TTL: Duration = Duration::from_secs(5 * 60);
const KEY_PREFIX: &str = "EmailCode:";

#[derive(Clone, Debug)]
pub struct EmailCodeConfig {
    ttl: Duration,
    consume_on_success: bool,
    from: String,
    store_timeout: Duration,
}

impl EmailCodeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ttl: DEFAULT_EMAIL_CODE_TTL,
            consume_on_success: false,
            from: DEFAULT_FROM.to_string(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_consume_on_success(mut self, consume: bool) -> Self {
        self.consume_on_success = consume;
        self
    }

    #[must_use]
    pub fn with_from(mut self, from: String) -> Self {
        self.from = from;
        self
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn consume_on_success(&self) -> bool {
        self.consume_on_success
    }
}

impl Default for EmailCodeConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EmailCodes {
    store: Arc<dyn CodeStore>,
    sender: Arc<dyn EmailSender>,
    config: EmailCodeConfig,
}

impl EmailCodes {
    #[must_use]
    pub fn new(
        store: Arc<dyn CodeStore>,
        sender: Arc<dyn EmailSender>,
        config: EmailCodeConfig,
    ) -> Self {
        Self {
            store,
            sender,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EmailCodeConfig {
        &self.config
    }

    /// Generate a code for `email`, store it, then mail it.
    ///
    /// The code is stored before delivery and is not rolled back if delivery
    /// fails, so a retry simply overwrites it.
    ///
    /// # Errors
    ///
    /// `Store` if the code cannot be saved, `Delivery` if the sender fails.
    #[instrument(skip_all)]
    pub async fn issue_code(&self, email: &str) -> Result<String, EmailCodeError> {
        let code = generate_code();
        bounded(
            self.config.store_timeout,
            self.store.set(&storage_key(email), &code, self.config.ttl),
        )
        .await?;

        let message = verification_message(&self.config.from, email, &code, self.config.ttl);
        if let Err(err) = self.sender.send(&message).await {
            warn!("Failed to deliver verification email: {err:#}");
            return Err(EmailCodeError::Delivery(err.to_string()));
        }

        info!("verification code sent");
        Ok(code)
    }

    /// Compare `candidate` with the stored code. Never removes the code.
    ///
    /// # Errors
    ///
    /// `Missing` when no live code exists, `Mismatch` when it differs.
    #[instrument(skip_all)]
    pub async fn verify_code(&self, email: &str, candidate: &str) -> Result<(), EmailCodeError> {
        let stored = bounded(self.config.store_timeout, self.store.get(&storage_key(email)))
            .await?
            .ok_or(EmailCodeError::Missing)?;
        if stored == candidate {
            Ok(())
        } else {
            Err(EmailCodeError::Mismatch)
        }
    }

    /// Remove the code for `email`, if any.
    ///
    /// # Errors
    ///
    /// `Store` on store failure or timeout.
    pub async fn consume(&self, email: &str) -> Result<(), EmailCodeError> {
        bounded(
            self.config.store_timeout,
            self.store.delete(&storage_key(email)),
        )
        .await?;
        Ok(())
    }
}

fn storage_key(email: &str) -> String {
    format!("{KEY_PREFIX}{}", normalize_email(email))
}

fn generate_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000u32))
}
