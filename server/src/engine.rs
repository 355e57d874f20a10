use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use quillpad_core::buffer::OperationBuffer;
use quillpad_core::document::DocumentRecord;
use quillpad_core::ids::{DocId, UserId};
use quillpad_core::operation::Operation;
use quillpad_core::store::DocumentStore;

use crate::error::AppError;

/// An operation accepted by the engine: the (possibly transformed) op and
/// the version it produced. A noop result leaves the version untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedOperation {
    pub operation: Operation,
    pub version: u64,
}

struct DocSlot {
    buffer: Mutex<OperationBuffer>,
}

/// The OT engine. Holds one slot per locally active document; the slot's
/// mutex serializes the whole accept path (load, transform, apply, persist,
/// buffer append) against other writers of the same document.
#[derive(Clone)]
pub struct DocEngine {
    store: Arc<dyn DocumentStore>,
    docs: Arc<DashMap<DocId, Arc<DocSlot>>>,
}

impl DocEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            docs: Arc::new(DashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    fn slot(&self, doc_id: &DocId) -> Arc<DocSlot> {
        self.docs
            .entry(doc_id.clone())
            .or_insert_with(|| {
                Arc::new(DocSlot {
                    buffer: Mutex::new(OperationBuffer::new()),
                })
            })
            .clone()
    }

    /// Create the operation buffer for a document. Called on first local
    /// join; idempotent.
    pub fn ensure(&self, doc_id: &DocId) {
        let _ = self.slot(doc_id);
    }

    /// Drop the buffer for a document. Called when the last local user
    /// leaves the room.
    pub fn discard(&self, doc_id: &DocId) {
        self.docs.remove(doc_id);
    }

    pub fn is_tracked(&self, doc_id: &DocId) -> bool {
        self.docs.contains_key(doc_id)
    }

    pub fn tracked_docs(&self) -> usize {
        self.docs.len()
    }

    pub async fn buffered_len(&self, doc_id: &DocId) -> usize {
        match self.docs.get(doc_id) {
            Some(slot) => slot.buffer.lock().await.len(),
            None => 0,
        }
    }

    /// Accept one client operation against a document.
    ///
    /// Steps, all under the per-document lock: load the record, reject base
    /// versions ahead of the document, fold the transform over buffered
    /// operations newer than the base version, short-circuit on noop, push
    /// the pre-change snapshot into history, apply, bump the version,
    /// persist, append to the buffer.
    pub async fn process_operation(
        &self,
        doc_id: &DocId,
        mut op: Operation,
        user_id: &UserId,
    ) -> Result<AcceptedOperation, AppError> {
        let slot = self.slot(doc_id);
        let mut buffer = slot.buffer.lock().await;

        let mut record = self
            .store
            .get_by_id(doc_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::doc_not_found(doc_id.as_str()))?;

        let base_version = op.base_version();
        if base_version > record.version {
            return Err(AppError::invalid_base_version(base_version, record.version));
        }

        if base_version < record.version {
            for buffered in buffer.entries_after(base_version) {
                op = op.transform_against(&buffered.operation);
                if op.is_noop() {
                    break;
                }
            }
        }

        if op.is_noop() {
            debug!(doc_id = %doc_id, user_id = %user_id, "operation collapsed to noop");
            return Ok(AcceptedOperation {
                operation: Operation::Noop,
                version: record.version,
            });
        }

        record.push_history(user_id.clone());
        record.content = op.apply(&record.content);
        record.version += 1;
        record.updated_at = chrono::Utc::now();
        let new_version = record.version;

        self.store.save(record).await.map_err(AppError::from)?;
        buffer.push(new_version, op.clone());

        Ok(AcceptedOperation {
            operation: op,
            version: new_version,
        })
    }

    /// Restore a history snapshot as a new version, owner-gated by the
    /// caller. Runs under the same per-document lock as edits; the buffer
    /// is cleared because buffered operations no longer describe the path
    /// to the restored content, and live clients re-join.
    pub async fn restore_version(
        &self,
        doc_id: &DocId,
        version: u64,
        user_id: &UserId,
    ) -> Result<DocumentRecord, AppError> {
        let slot = self.slot(doc_id);
        let mut buffer = slot.buffer.lock().await;

        let mut record = self
            .store
            .get_by_id(doc_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::doc_not_found(doc_id.as_str()))?;

        let snapshot = record
            .history_entry(version)
            .map(|entry| entry.content_snapshot.clone())
            .ok_or_else(|| {
                AppError::not_found(format!(
                    "Version {version} is not in the history of document {doc_id}."
                ))
            })?;

        record.push_history(user_id.clone());
        record.content = snapshot;
        record.version += 1;
        record.updated_at = chrono::Utc::now();

        self.store.save(record.clone()).await.map_err(AppError::from)?;
        buffer.clear();

        Ok(record)
    }
}
