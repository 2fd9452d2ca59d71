use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

use crate::email::DEFAULT_FROM;

pub const ARG_EMAIL_RELAY_URL: &str = "email-relay-url";
pub const ARG_EMAIL_RELAY_TOKEN: &str = "email-relay-token";
pub const ARG_EMAIL_FROM: &str = "email-from";

#[derive(Debug)]
pub struct Options {
    pub relay_url: Option<Url>,
    pub relay_token: Option<SecretString>,
    pub from: String,
}

impl Options {
    /// # Errors
    /// Returns an error if the relay URL does not parse.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let relay_url = matches
            .get_one::<String>(ARG_EMAIL_RELAY_URL)
            .filter(|v| !v.trim().is_empty())
            .map(|v| Url::parse(v).with_context(|| format!("invalid --{ARG_EMAIL_RELAY_URL}: {v}")))
            .transpose()?;
        let relay_token = matches
            .get_one::<String>(ARG_EMAIL_RELAY_TOKEN)
            .filter(|v| !v.trim().is_empty())
            .map(|v| SecretString::from(v.clone()));
        let from = matches
            .get_one::<String>(ARG_EMAIL_FROM)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FROM.to_string());

        Ok(Self {
            relay_url,
            relay_token,
            from,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_EMAIL_RELAY_URL)
                .long(ARG_EMAIL_RELAY_URL)
                .help("HTTP mail relay that receives verification emails as JSON")
                .long_help(
                    "HTTP mail relay that receives verification emails as JSON. Without it messages are only logged.",
                )
                .env("SESAME_EMAIL_RELAY_URL"),
        )
        .arg(
            Arg::new(ARG_EMAIL_RELAY_TOKEN)
                .long(ARG_EMAIL_RELAY_TOKEN)
                .help("Bearer token sent to the mail relay")
                .env("SESAME_EMAIL_RELAY_TOKEN")
                .hide_env_values(true)
                .requires(ARG_EMAIL_RELAY_URL),
        )
        .arg(
            Arg::new(ARG_EMAIL_FROM)
                .long(ARG_EMAIL_FROM)
                .help("Sender address of verification emails")
                .env("SESAME_EMAIL_FROM")
                .default_value(DEFAULT_FROM),
        )
}
