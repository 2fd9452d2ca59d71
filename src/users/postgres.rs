use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;

use super::{is_email, normalize_email, NewUser, UserRecord, UserStore, UserStoreError};

const USER_COLUMNS: &str = r"
    id, name, email,
    EXTRACT(EPOCH FROM email_verified_at)::BIGINT AS email_verified_at,
    password, head_url,
    EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at,
    EXTRACT(EPOCH FROM updated_at)::BIGINT AS updated_at
";

#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl From<sqlx::Error> for UserStoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().is_some_and(|code| code.as_ref() == "23505") {
                let message = match db_err.constraint() {
                    Some("users_name_key") => "user name already exists",
                    Some("users_email_key") => "email already exists",
                    _ => "user already exists",
                };
                return Self::Conflict(message.to_string());
            }
        }
        Self::Backend(err.to_string())
    }
}

fn user_from_row(row: &PgRow) -> Result<UserRecord, sqlx::Error> {
    Ok(UserRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        email_verified_at: row.try_get("email_verified_at")?,
        password_hash: row.try_get("password")?,
        head_url: row.try_get("head_url")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Column and value a login string is matched against.
fn login_filter(login: &str) -> (&'static str, String) {
    if is_email(login) {
        ("email", normalize_email(login))
    } else {
        ("name", login.to_string())
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_login(&self, login: &str) -> Result<Option<UserRecord>, UserStoreError> {
        let (column, value) = login_filter(login);
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn exists(&self, login: &str) -> Result<bool, UserStoreError> {
        let (column, value) = login_filter(login);
        let query = format!("SELECT EXISTS (SELECT 1 FROM users WHERE {column} = $1) AS found");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.try_get("found")?)
    }

    async fn create(&self, user: NewUser) -> Result<UserRecord, UserStoreError> {
        let query = format!(
            r"
            INSERT INTO users (name, email, password, email_verified_at)
            VALUES ($1, $2, $3, to_timestamp($4::BIGINT))
            RETURNING {USER_COLUMNS}
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(&user.name)
            .bind(normalize_email(&user.email))
            .bind(&user.password_hash)
            .bind(user.email_verified_at)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;

        Ok(user_from_row(&row)?)
    }
}
