// Shared request/response types for the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quillpad_core::document::{DocumentRecord, VersionEntry};
use quillpad_core::ids::UserId;
use quillpad_core::roles::{Role, ShareRole};
use quillpad_core::user::UserRecord;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub id: UserId,
    pub email: String,
    pub username: String,
}

impl From<&UserRecord> for UserPayload {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            username: user.username.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub user: UserPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummaryPayload {
    pub id: String,
    pub title: String,
    pub version: u64,
    pub owner: UserId,
    pub role: Role,
    pub updated_at: DateTime<Utc>,
}

impl DocumentSummaryPayload {
    pub fn from_record(record: &DocumentRecord, role: Role) -> Self {
        Self {
            id: record.id.to_string(),
            title: record.title.clone(),
            version: record.version,
            owner: record.owner.clone(),
            role,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
    pub id: String,
    pub title: String,
    pub content: String,
    pub version: u64,
    pub owner: UserId,
    pub role: Role,
    pub shares: Vec<SharePayload>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentPayload {
    pub fn from_record(record: &DocumentRecord, role: Role) -> Self {
        let mut shares: Vec<SharePayload> = record
            .shares
            .iter()
            .map(|(user_id, share_role)| SharePayload {
                user_id: user_id.clone(),
                role: *share_role,
            })
            .collect();
        shares.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        Self {
            id: record.id.to_string(),
            title: record.title.clone(),
            content: record.content.clone(),
            version: record.version,
            owner: record.owner.clone(),
            role,
            shares,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharePayload {
    pub user_id: UserId,
    pub role: ShareRole,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    pub user_id: UserId,
    pub role: ShareRole,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntryPayload {
    pub version: u64,
    pub content_snapshot: String,
    pub edited_by: UserId,
    pub timestamp: DateTime<Utc>,
}

impl From<&VersionEntry> for HistoryEntryPayload {
    fn from(entry: &VersionEntry) -> Self {
        Self {
            version: entry.version,
            content_snapshot: entry.content_snapshot.clone(),
            edited_by: entry.edited_by.clone(),
            timestamp: entry.timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreRequest {
    pub version: u64,
}
