use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DocId, UserId};
use crate::roles::ShareRole;

/// Version snapshots retained per document; oldest dropped beyond this.
pub const HISTORY_LIMIT: usize = 50;

pub const MAX_TITLE_LENGTH: usize = 200;

/// Snapshot of the document content as it was *before* the edit that
/// produced the next version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub version: u64,
    pub content_snapshot: String,
    pub edited_by: UserId,
    pub timestamp: DateTime<Utc>,
}

/// The durable record for a document, as exchanged with the store adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: DocId,
    pub title: String,
    pub content: String,
    pub version: u64,
    pub owner: UserId,
    #[serde(default)]
    pub shares: HashMap<UserId, ShareRole>,
    #[serde(default)]
    pub history: VecDeque<VersionEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn new(id: DocId, title: impl Into<String>, owner: UserId) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            content: String::new(),
            version: 1,
            owner,
            shares: HashMap::new(),
            history: VecDeque::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the current content under the current version before an edit
    /// replaces it. Bounded at [`HISTORY_LIMIT`], oldest dropped.
    pub fn push_history(&mut self, edited_by: UserId) {
        self.history.push_back(VersionEntry {
            version: self.version,
            content_snapshot: self.content.clone(),
            edited_by,
            timestamp: Utc::now(),
        });
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
    }

    pub fn history_entry(&self, version: u64) -> Option<&VersionEntry> {
        self.history.iter().find(|entry| entry.version == version)
    }
}
