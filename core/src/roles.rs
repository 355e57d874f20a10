use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::DocumentRecord;
use crate::ids::{DocId, UserId};
use crate::store::{DocumentStore, StoreError};

/// Roles a document can be shared under. Ownership is not shareable; it
/// lives on the record itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareRole {
    Editor,
    Commenter,
    Viewer,
}

/// Resolved role of a user on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Editor,
    Commenter,
    Viewer,
    None,
}

impl From<ShareRole> for Role {
    fn from(role: ShareRole) -> Self {
        match role {
            ShareRole::Editor => Role::Editor,
            ShareRole::Commenter => Role::Commenter,
            ShareRole::Viewer => Role::Viewer,
        }
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Editor => "editor",
            Role::Commenter => "commenter",
            Role::Viewer => "viewer",
            Role::None => "none",
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        let is_owner = matches!(self, Role::Owner);
        Capabilities {
            can_read: !matches!(self, Role::None),
            can_edit: matches!(self, Role::Owner | Role::Editor),
            can_share: is_owner,
            can_delete: is_owner,
            can_restore: is_owner,
        }
    }

    pub fn satisfies(&self, level: AccessLevel) -> bool {
        let caps = self.capabilities();
        match level {
            AccessLevel::Read => caps.can_read,
            AccessLevel::Edit => caps.can_edit,
            AccessLevel::Owner => caps.can_share,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub can_read: bool,
    pub can_edit: bool,
    pub can_share: bool,
    pub can_delete: bool,
    pub can_restore: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Read,
    Edit,
    Owner,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AccessLevel::Read => "read",
            AccessLevel::Edit => "edit",
            AccessLevel::Owner => "own",
        };
        f.write_str(label)
    }
}

pub fn resolve_role(record: &DocumentRecord, user_id: &UserId) -> Role {
    if &record.owner == user_id {
        return Role::Owner;
    }
    record
        .shares
        .get(user_id)
        .copied()
        .map(Role::from)
        .unwrap_or(Role::None)
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("document {0} not found")]
    NotFound(DocId),
    #[error("{role} role may not {level} document {id}")]
    Forbidden {
        id: DocId,
        role: Role,
        level: AccessLevel,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Load a document and check the caller's role against `required`.
///
/// Consulted on every edit operation, not just at join, so mid-session role
/// revocations take effect on the next operation.
pub async fn get_document_with_access(
    store: &dyn DocumentStore,
    id: &DocId,
    user_id: &UserId,
    required: AccessLevel,
) -> Result<(DocumentRecord, Role), AccessError> {
    let record = store
        .get_by_id(id)
        .await?
        .ok_or_else(|| AccessError::NotFound(id.clone()))?;

    let role = resolve_role(&record, user_id);
    if role.satisfies(required) {
        Ok((record, role))
    } else {
        Err(AccessError::Forbidden {
            id: id.clone(),
            role,
            level: required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;

    fn record_with_shares() -> DocumentRecord {
        let mut doc =
            DocumentRecord::new(DocId::from("doc-1"), "Shared", UserId::from("u-owner"));
        doc.shares.insert(UserId::from("u-editor"), ShareRole::Editor);
        doc.shares
            .insert(UserId::from("u-commenter"), ShareRole::Commenter);
        doc.shares.insert(UserId::from("u-viewer"), ShareRole::Viewer);
        doc
    }

    #[test]
    fn owner_comes_from_the_record_not_the_share_table() {
        let doc = record_with_shares();
        assert_eq!(resolve_role(&doc, &UserId::from("u-owner")), Role::Owner);
        assert_eq!(resolve_role(&doc, &UserId::from("u-editor")), Role::Editor);
        assert_eq!(resolve_role(&doc, &UserId::from("u-stranger")), Role::None);
    }

    #[test]
    fn capability_ladder_matches_roles() {
        assert!(Role::Owner.capabilities().can_restore);
        assert!(Role::Editor.capabilities().can_edit);
        assert!(!Role::Editor.capabilities().can_share);
        assert!(Role::Commenter.capabilities().can_read);
        assert!(!Role::Commenter.capabilities().can_edit);
        assert!(Role::Viewer.capabilities().can_read);
        assert!(!Role::None.capabilities().can_read);
    }

    #[tokio::test]
    async fn access_check_distinguishes_not_found_and_forbidden() {
        let store = MemoryDocumentStore::new();
        store.create(record_with_shares()).await.unwrap();

        let missing = get_document_with_access(
            &store,
            &DocId::from("nope"),
            &UserId::from("u-owner"),
            AccessLevel::Read,
        )
        .await;
        assert!(matches!(missing, Err(AccessError::NotFound(_))));

        let viewer_edit = get_document_with_access(
            &store,
            &DocId::from("doc-1"),
            &UserId::from("u-viewer"),
            AccessLevel::Edit,
        )
        .await;
        assert!(matches!(viewer_edit, Err(AccessError::Forbidden { .. })));

        let (_, role) = get_document_with_access(
            &store,
            &DocId::from("doc-1"),
            &UserId::from("u-editor"),
            AccessLevel::Edit,
        )
        .await
        .unwrap();
        assert_eq!(role, Role::Editor);
    }
}
