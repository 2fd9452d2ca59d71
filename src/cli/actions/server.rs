use crate::{
    auth::{Clock, SystemClock},
    cli::commands::{auth, email},
    email::{EmailSender, LogEmailSender, RelayEmailSender},
    sesame::{self, AppState, AuthConfig, Backends},
    store::{self, CodeStore, MemoryCodeStore, PgCodeStore},
    users::{MemoryUserStore, PgUserStore, UserStore},
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

const SWEEP_EVERY: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<SecretString>,
    pub auth: auth::Options,
    pub email: email::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the configuration is
/// inconsistent, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let config = auth_config(args.auth, &args.email.from);

    let (users, codes): (Arc<dyn UserStore>, Arc<dyn CodeStore>) = match &args.dsn {
        Some(dsn) => {
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(dsn.expose_secret())
                .await
                .context("Failed to connect to database")?;

            sesame::apply_schema(&pool).await?;

            (
                Arc::new(PgUserStore::new(pool.clone())),
                Arc::new(PgCodeStore::new(pool)),
            )
        }
        None => {
            warn!("No DSN configured, users and codes are kept in memory");
            (
                Arc::new(MemoryUserStore::new(clock.clone())),
                Arc::new(MemoryCodeStore::new(clock.clone())),
            )
        }
    };

    let sender: Arc<dyn EmailSender> = match args.email.relay_url {
        Some(url) => Arc::new(RelayEmailSender::new(url, args.email.relay_token)?),
        None => Arc::new(LogEmailSender),
    };

    let sweeper = store::spawn_sweeper(codes.clone(), SWEEP_EVERY);

    let state = AppState::new(
        config,
        Backends {
            users,
            codes,
            sender,
            clock,
        },
    )
    .context("Invalid token sources")?;

    let result = sesame::new(args.port, Arc::new(state)).await;
    sweeper.abort();
    result
}

fn auth_config(options: auth::Options, email_from: &str) -> AuthConfig {
    AuthConfig::new(options.signing_key)
        .with_issuer(options.issuer)
        .with_session_ttl_seconds(options.session_ttl_seconds)
        .with_refresh_ttl_seconds(options.refresh_ttl_seconds)
        .with_exchange_code_ttl_seconds(options.exchange_code_ttl_seconds)
        .with_email_code_ttl_seconds(options.email_code_ttl_seconds)
        .with_email_code_single_use(options.email_code_single_use)
        .with_store_timeout_ms(options.store_timeout_ms)
        .with_token_sources(options.token_sources)
        .with_cookie_name(options.cookie_name)
        .with_default_avatar_url(options.default_avatar_url)
        .with_frontend_origin(options.frontend_origin)
        .with_email_from(email_from.to_string())
}

fn log_startup_args(args: &Args) {
    let storage = if args.dsn.is_some() {
        "postgres"
    } else {
        "memory"
    };
    let delivery = if args.email.relay_url.is_some() {
        "relay"
    } else {
        "log"
    };
    info!(
        port = args.port,
        storage,
        delivery,
        issuer = %args.auth.issuer,
        token_sources = %args.auth.token_sources,
        "Starting sesame"
    );
    debug!("Startup args: {:?}", args);
}
