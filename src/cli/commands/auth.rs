use anyhow::{bail, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::{ExposeSecret, SecretString};

use crate::sesame::account::DEFAULT_AVATAR_URL;

pub const ARG_SIGNING_KEY: &str = "signing-key";
pub const ARG_ISSUER: &str = "issuer";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_REFRESH_TTL_SECONDS: &str = "refresh-ttl-seconds";
pub const ARG_EXCHANGE_CODE_TTL_SECONDS: &str = "exchange-code-ttl-seconds";
pub const ARG_EMAIL_CODE_TTL_SECONDS: &str = "email-code-ttl-seconds";
pub const ARG_EMAIL_CODE_SINGLE_USE: &str = "email-code-single-use";
pub const ARG_STORE_TIMEOUT_MS: &str = "store-timeout-ms";
pub const ARG_TOKEN_SOURCES: &str = "token-sources";
pub const ARG_COOKIE_NAME: &str = "cookie-name";
pub const ARG_DEFAULT_AVATAR_URL: &str = "default-avatar-url";
pub const ARG_FRONTEND_ORIGIN: &str = "frontend-origin";

const MIN_SIGNING_KEY_BYTES: usize = 32;

#[derive(Debug)]
pub struct Options {
    pub signing_key: SecretString,
    pub issuer: String,
    pub session_ttl_seconds: u64,
    pub refresh_ttl_seconds: u64,
    pub exchange_code_ttl_seconds: u64,
    pub email_code_ttl_seconds: u64,
    pub email_code_single_use: bool,
    pub store_timeout_ms: u64,
    pub token_sources: String,
    pub cookie_name: String,
    pub default_avatar_url: String,
    pub frontend_origin: Option<String>,
}

impl Options {
    /// Parse token and code arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the signing key is missing or shorter than 32 bytes.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let signing_key = match matches.get_one::<String>(ARG_SIGNING_KEY) {
            Some(key) if !key.trim().is_empty() => SecretString::from(key.clone()),
            _ => bail!("missing required argument: --{ARG_SIGNING_KEY}"),
        };
        if signing_key.expose_secret().len() < MIN_SIGNING_KEY_BYTES {
            bail!("--{ARG_SIGNING_KEY} must be at least {MIN_SIGNING_KEY_BYTES} bytes");
        }

        let string = |id: &str| matches.get_one::<String>(id).cloned().unwrap_or_default();
        let seconds = |id: &str| matches.get_one::<u64>(id).copied().unwrap_or_default();

        Ok(Self {
            signing_key,
            issuer: string(ARG_ISSUER),
            session_ttl_seconds: seconds(ARG_SESSION_TTL_SECONDS),
            refresh_ttl_seconds: seconds(ARG_REFRESH_TTL_SECONDS),
            exchange_code_ttl_seconds: seconds(ARG_EXCHANGE_CODE_TTL_SECONDS),
            email_code_ttl_seconds: seconds(ARG_EMAIL_CODE_TTL_SECONDS),
            email_code_single_use: matches.get_flag(ARG_EMAIL_CODE_SINGLE_USE),
            store_timeout_ms: seconds(ARG_STORE_TIMEOUT_MS),
            token_sources: string(ARG_TOKEN_SOURCES),
            cookie_name: string(ARG_COOKIE_NAME),
            default_avatar_url: string(ARG_DEFAULT_AVATAR_URL),
            frontend_origin: matches
                .get_one::<String>(ARG_FRONTEND_ORIGIN)
                .cloned()
                .filter(|v| !v.trim().is_empty()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_code_args(command);
    with_transport_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SIGNING_KEY)
                .long(ARG_SIGNING_KEY)
                .help("HMAC key used to sign session tokens (at least 32 bytes)")
                .env("SESAME_SIGNING_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_ISSUER)
                .long(ARG_ISSUER)
                .help("Issuer written into session tokens")
                .env("SESAME_ISSUER")
                .default_value("sesame"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session token lifetime in seconds")
                .env("SESAME_SESSION_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL_SECONDS)
                .long(ARG_REFRESH_TTL_SECONDS)
                .help("Lifetime in seconds of a refreshed session token")
                .env("SESAME_REFRESH_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

fn with_code_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_EXCHANGE_CODE_TTL_SECONDS)
                .long(ARG_EXCHANGE_CODE_TTL_SECONDS)
                .help("Authorization code lifetime in seconds")
                .env("SESAME_EXCHANGE_CODE_TTL_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_EMAIL_CODE_TTL_SECONDS)
                .long(ARG_EMAIL_CODE_TTL_SECONDS)
                .help("Email verification code lifetime in seconds")
                .env("SESAME_EMAIL_CODE_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_EMAIL_CODE_SINGLE_USE)
                .long(ARG_EMAIL_CODE_SINGLE_USE)
                .help("Delete an email verification code once registration succeeds")
                .env("SESAME_EMAIL_CODE_SINGLE_USE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_MS)
                .long(ARG_STORE_TIMEOUT_MS)
                .help("Deadline in milliseconds for each code store call")
                .env("SESAME_STORE_TIMEOUT_MS")
                .default_value("2000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

fn with_transport_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_SOURCES)
                .long(ARG_TOKEN_SOURCES)
                .help("Where to look for the session token, in order: bearer, cookie")
                .env("SESAME_TOKEN_SOURCES")
                .default_value("bearer,cookie"),
        )
        .arg(
            Arg::new(ARG_COOKIE_NAME)
                .long(ARG_COOKIE_NAME)
                .help("Name of the session token cookie")
                .env("SESAME_COOKIE_NAME")
                .default_value("token"),
        )
        .arg(
            Arg::new(ARG_DEFAULT_AVATAR_URL)
                .long(ARG_DEFAULT_AVATAR_URL)
                .help("Avatar URL returned for users without one")
                .env("SESAME_DEFAULT_AVATAR_URL")
                .default_value(DEFAULT_AVATAR_URL),
        )
        .arg(
            Arg::new(ARG_FRONTEND_ORIGIN)
                .long(ARG_FRONTEND_ORIGIN)
                .help("Frontend origin allowed for CORS; https also marks the cookie Secure")
                .env("SESAME_FRONTEND_ORIGIN"),
        )
}
