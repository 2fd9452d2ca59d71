//! Runs against a real database when `SESAME_TEST_DSN` is set, otherwise
//! every test returns early.

use anyhow::Result;
use sesame::{
    sesame::apply_schema,
    store::{CodeStore, PgCodeStore},
    users::{NewUser, PgUserStore, UserStore, UserStoreError},
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use ulid::Ulid;

async fn pool() -> Result<Option<PgPool>> {
    let Ok(dsn) = std::env::var("SESAME_TEST_DSN") else {
        return Ok(None);
    };
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&dsn)
        .await?;
    apply_schema(&pool).await?;
    Ok(Some(pool))
}

fn unique(prefix: &str) -> String {
    format!("{prefix}{}", Ulid::new().to_string().to_lowercase())
}

#[tokio::test]
async fn code_store_set_get_take() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let store = PgCodeStore::new(pool);
    let key = unique("test:");

    store.set(&key, "one", Duration::from_secs(60)).await?;
    store.set(&key, "two", Duration::from_secs(60)).await?;
    assert_eq!(store.get(&key).await?.as_deref(), Some("two"));

    assert_eq!(store.take(&key).await?.as_deref(), Some("two"));
    assert_eq!(store.take(&key).await?, None);
    assert_eq!(store.get(&key).await?, None);

    store.delete(&key).await?;
    Ok(())
}

#[tokio::test]
async fn code_store_hides_expired_entries() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let store = PgCodeStore::new(pool);
    let key = unique("test:");

    store.set(&key, "soon gone", Duration::from_secs(1)).await?;
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert_eq!(store.get(&key).await?, None);
    assert_eq!(store.take(&key).await?, None);
    store.purge_expired().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn code_store_take_has_one_winner() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let store = Arc::new(PgCodeStore::new(pool));
    let key = unique("test:");
    store.set(&key, "prize", Duration::from_secs(60)).await?;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move { store.take(&key).await }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await??.is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    Ok(())
}

#[tokio::test]
async fn user_store_round_trip_and_conflicts() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let store = PgUserStore::new(pool);
    let name = unique("u");
    let email = format!("{name}@example.com");

    let created = store
        .create(NewUser {
            name: name.clone(),
            email: email.to_uppercase(),
            password_hash: "$argon2id$fake".to_string(),
            email_verified_at: Some(1_700_000_000),
        })
        .await?;
    assert_eq!(created.email, email);
    assert_eq!(created.email_verified_at, Some(1_700_000_000));

    assert!(store.exists(&name).await?);
    assert!(store.exists(&email).await?);
    let by_email = store.find_by_login(&email).await?;
    assert_eq!(by_email.map(|user| user.id), Some(created.id));

    let duplicate = store
        .create(NewUser {
            name: name.clone(),
            email: format!("other-{email}"),
            password_hash: "$argon2id$fake".to_string(),
            email_verified_at: None,
        })
        .await;
    assert!(matches!(duplicate, Err(UserStoreError::Conflict(_))));
    Ok(())
}
