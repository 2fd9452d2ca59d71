//! Email delivery abstractions.
//!
//! The default sender for local dev is [`LogEmailSender`], which logs the
//! recipient and subject and returns `Ok(())`. [`RelayEmailSender`] posts the
//! message as JSON to an HTTP mail relay.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

use crate::APP_USER_AGENT;

pub const DEFAULT_FROM: &str = "Sesame <no-reply@localhost>";
const RELAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return why it could not be delivered.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs instead of sending real email.
///
/// The body is not logged since it carries the verification code.
#[derive(Clone, Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "email send stub"
        );
        Ok(())
    }
}

pub struct RelayEmailSender {
    client: reqwest::Client,
    endpoint: Url,
    token: Option<SecretString>,
}

impl RelayEmailSender {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: Url, token: Option<SecretString>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(RELAY_TIMEOUT)
            .build()
            .context("failed to build email relay client")?;
        Ok(Self {
            client,
            endpoint,
            token,
        })
    }
}

impl std::fmt::Debug for RelayEmailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayEmailSender")
            .field("endpoint", &self.endpoint.as_str())
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EmailSender for RelayEmailSender {
    #[instrument(skip_all, fields(to = %message.to))]
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let mut request = self.client.post(self.endpoint.clone()).json(message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .context("failed to reach email relay")?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(anyhow!("email relay answered {status}"))
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// The message carrying an email verification code.
#[must_use]
pub fn verification_message(from: &str, to: &str, code: &str, ttl: Duration) -> EmailMessage {
    let minutes = ttl.as_secs().div_ceil(60);
    let html = format!(
        "<p>Hello {},</p>\
         <p>Your verification code is <strong>{}</strong>.</p>\
         <p>The code is valid for {minutes} minutes. If you did not request it, ignore this email.</p>",
        escape_html(to),
        escape_html(code),
    );
    EmailMessage {
        from: from.to_string(),
        to: to.to_string(),
        subject: "Your verification code".to_string(),
        html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_message_names_recipient_code_and_validity() {
        let message = verification_message(
            DEFAULT_FROM,
            "alice@example.com",
            "042137",
            Duration::from_secs(300),
        );
        assert_eq!(message.to, "alice@example.com");
        assert_eq!(message.from, DEFAULT_FROM);
        assert!(message.html.contains("alice@example.com"));
        assert!(message.html.contains("042137"));
        assert!(message.html.contains("5 minutes"));
    }

    #[test]
    fn recipient_markup_is_escaped() {
        let to = "<b>\"x\"@y.io</b>";
        let message = verification_message(DEFAULT_FROM, to, "123456", Duration::from_secs(60));
        assert_eq!(message.to, to);
        assert!(!message.html.contains("<b>"));
        assert!(message
            .html
            .contains("Hello &lt;b&gt;&quot;x&quot;@y.io&lt;/b&gt;,"));
        assert!(message.html.contains("<strong>123456</strong>"));
    }

    #[test]
    fn message_serializes_as_relay_payload() -> Result<()> {
        let message = verification_message("a@x.io", "b@x.io", "123456", Duration::from_secs(60));
        let value = serde_json::to_value(&message)?;
        for field in ["from", "to", "subject", "html"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn log_sender_always_succeeds() {
        let message = verification_message("a@x.io", "b@x.io", "123456", Duration::from_secs(60));
        assert!(LogEmailSender.send(&message).await.is_ok());
    }

    #[test]
    fn relay_debug_hides_token() -> Result<()> {
        let sender = RelayEmailSender::new(
            Url::parse("https://relay.example.com/send")?,
            Some(SecretString::from("relay-secret".to_string())),
        )?;
        let rendered = format!("{sender:?}");
        assert!(!rendered.contains("relay-secret"));
        Ok(())
    }
}
