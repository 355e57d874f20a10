use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::UserId;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// The user half of the auth collaborator: credential verification yields a
/// user id, and this store resolves it to `{username, email}`.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user; fails with `Conflict` when the email is taken.
    async fn create(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<UserRecord, StoreError>;

    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<UserId, UserRecord>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<UserRecord, StoreError> {
        let normalized = email.trim().to_ascii_lowercase();
        if self
            .users
            .iter()
            .any(|entry| entry.value().email == normalized)
        {
            return Err(StoreError::Conflict(normalized));
        }

        let record = UserRecord {
            id: UserId::new(Uuid::new_v4().to_string()),
            email: normalized,
            username: username.trim().to_owned(),
            password_hash: password_hash.to_owned(),
            created_at: Utc::now(),
        };
        self.users.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let normalized = email.trim().to_ascii_lowercase();
        Ok(self
            .users
            .iter()
            .find(|entry| entry.value().email == normalized)
            .map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_lookup_by_id_and_email() {
        let store = MemoryUserStore::new();
        let user = store
            .create("Ada@Example.com", "ada", "hash")
            .await
            .unwrap();

        assert_eq!(user.email, "ada@example.com");
        let by_id = store.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "ada");

        let by_email = store.find_by_email("ada@example.com").await.unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(user.id));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_regardless_of_case() {
        let store = MemoryUserStore::new();
        store.create("ada@example.com", "ada", "hash").await.unwrap();

        let err = store
            .create("ADA@example.com", "other", "hash")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
