use async_trait::async_trait;
use dashmap::DashMap;

use crate::document::DocumentRecord;
use crate::ids::{DocId, UserId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(String),
    #[error("record {0} already exists")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Adapter over the durable document store. The store itself is an external
/// collaborator; the hot edit path only ever uses `get_by_id` and `save`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_by_id(&self, id: &DocId) -> Result<Option<DocumentRecord>, StoreError>;

    /// Persist content, version and history in one atomic replace with
    /// respect to concurrent saves of the same id.
    async fn save(&self, record: DocumentRecord) -> Result<(), StoreError>;

    async fn create(&self, record: DocumentRecord) -> Result<(), StoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: &DocId) -> Result<bool, StoreError>;

    /// Documents the user owns or appears in the share table of. Not on the
    /// hot edit path.
    async fn find_shared_or_owned(&self, user_id: &UserId)
        -> Result<Vec<DocumentRecord>, StoreError>;
}

/// In-process store used for development and tests.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: DashMap<DocId, DocumentRecord>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_by_id(&self, id: &DocId) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self.docs.get(id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, record: DocumentRecord) -> Result<(), StoreError> {
        self.docs.insert(record.id.clone(), record);
        Ok(())
    }

    async fn create(&self, record: DocumentRecord) -> Result<(), StoreError> {
        match self.docs.entry(record.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StoreError::Conflict(record.id.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn delete(&self, id: &DocId) -> Result<bool, StoreError> {
        Ok(self.docs.remove(id).is_some())
    }

    async fn find_shared_or_owned(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<DocumentRecord>, StoreError> {
        let mut records: Vec<DocumentRecord> = self
            .docs
            .iter()
            .filter(|entry| {
                entry.value().owner == *user_id || entry.value().shares.contains_key(user_id)
            })
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::ShareRole;

    fn doc(id: &str, owner: &str) -> DocumentRecord {
        DocumentRecord::new(DocId::from(id), format!("Doc {id}"), UserId::from(owner))
    }

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let store = MemoryDocumentStore::new();
        store.create(doc("d1", "alice")).await.unwrap();

        let err = store.create(doc("d1", "bob")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn save_replaces_the_whole_record() {
        let store = MemoryDocumentStore::new();
        store.create(doc("d1", "alice")).await.unwrap();

        let mut updated = store.get_by_id(&DocId::from("d1")).await.unwrap().unwrap();
        updated.content = "hello".into();
        updated.version = 2;
        store.save(updated).await.unwrap();

        let loaded = store.get_by_id(&DocId::from("d1")).await.unwrap().unwrap();
        assert_eq!(loaded.content, "hello");
        assert_eq!(loaded.version, 2);
    }

    #[tokio::test]
    async fn find_shared_or_owned_covers_both_paths() {
        let store = MemoryDocumentStore::new();
        store.create(doc("owned", "alice")).await.unwrap();

        let mut shared = doc("shared", "bob");
        shared
            .shares
            .insert(UserId::from("alice"), ShareRole::Viewer);
        store.create(shared).await.unwrap();
        store.create(doc("other", "bob")).await.unwrap();

        let mut ids: Vec<String> = store
            .find_shared_or_owned(&UserId::from("alice"))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["owned", "shared"]);
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = MemoryDocumentStore::new();
        store.create(doc("d1", "alice")).await.unwrap();
        assert!(store.delete(&DocId::from("d1")).await.unwrap());
        assert!(!store.delete(&DocId::from("d1")).await.unwrap());
    }
}
