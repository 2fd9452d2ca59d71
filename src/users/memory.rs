use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{is_email, normalize_email, NewUser, UserRecord, UserStore, UserStoreError};
use crate::auth::clock::{Clock, SystemClock};

/// In-process user table for dev mode and tests.
#[derive(Debug)]
pub struct MemoryUserStore {
    users: Mutex<Vec<UserRecord>>,
    clock: Arc<dyn Clock>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            users: Mutex::new(Vec::new()),
            clock,
        }
    }

    /// Seed a record as-is, bypassing uniqueness checks.
    pub async fn insert(&self, record: UserRecord) {
        self.users.lock().await.push(record);
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

fn matches_login(user: &UserRecord, login: &str) -> bool {
    if is_email(login) {
        user.email == normalize_email(login)
    } else {
        user.name == login
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_login(&self, login: &str) -> Result<Option<UserRecord>, UserStoreError> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|user| matches_login(user, login)).cloned())
    }

    async fn exists(&self, login: &str) -> Result<bool, UserStoreError> {
        let users = self.users.lock().await;
        Ok(users.iter().any(|user| matches_login(user, login)))
    }

    async fn create(&self, user: NewUser) -> Result<UserRecord, UserStoreError> {
        let email = normalize_email(&user.email);
        let mut users = self.users.lock().await;

        if users.iter().any(|existing| existing.name == user.name) {
            return Err(UserStoreError::Conflict("user name already exists".to_string()));
        }
        if users.iter().any(|existing| existing.email == email) {
            return Err(UserStoreError::Conflict("email already exists".to_string()));
        }

        let now = self.clock.now();
        let id = users.iter().map(|existing| existing.id).max().unwrap_or(0) + 1;
        let record = UserRecord {
            id,
            name: user.name,
            email,
            email_verified_at: user.email_verified_at,
            password_hash: user.password_hash,
            head_url: String::new(),
            created_at: now,
            updated_at: now,
        };
        users.push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str, email: &str) -> NewUser {
        NewUser {
            name: name.to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            email_verified_at: Some(1),
        }
    }

    #[tokio::test]
    async fn create_assigns_ids_and_normalizes_email() -> Result<(), UserStoreError> {
        let store = MemoryUserStore::default();
        let first = store.create(new_user("alice", " Alice@Example.com")).await?;
        let second = store.create(new_user("bob", "bob@example.com")).await?;
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.email, "alice@example.com");
        assert!(first.head_url.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn find_by_name_or_email() -> Result<(), UserStoreError> {
        let store = MemoryUserStore::default();
        store.create(new_user("alice", "alice@example.com")).await?;

        let by_name = store.find_by_login("alice").await?;
        let by_email = store.find_by_login("ALICE@example.com").await?;
        assert_eq!(by_name.map(|u| u.id), Some(1));
        assert_eq!(by_email.map(|u| u.id), Some(1));
        assert!(store.find_by_login("carol").await?.is_none());
        assert!(store.exists("alice@example.com").await?);
        assert!(!store.exists("bob").await?);
        Ok(())
    }

    #[tokio::test]
    async fn duplicates_conflict() -> Result<(), UserStoreError> {
        let store = MemoryUserStore::default();
        store.create(new_user("alice", "alice@example.com")).await?;

        let same_name = store.create(new_user("alice", "other@example.com")).await;
        assert!(matches!(same_name, Err(UserStoreError::Conflict(_))));

        let same_email = store.create(new_user("alice2", "alice@example.com")).await;
        assert!(matches!(same_email, Err(UserStoreError::Conflict(_))));
        Ok(())
    }
}
