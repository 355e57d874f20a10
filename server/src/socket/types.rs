use std::sync::{Arc, Mutex as StdMutex};

use serde::Serialize;

use quillpad_core::ids::{DocId, UserId};

use crate::error::AppError;

/// Identity resolved at the handshake; attached to the socket for the
/// lifetime of the connection.
#[derive(Clone)]
pub struct SocketUserContext {
    pub user_id: UserId,
    pub username: String,
}

/// The document this session is currently joined to, if any.
#[derive(Clone, Default)]
pub struct SessionDocState {
    current: Arc<StdMutex<Option<DocId>>>,
}

impl SessionDocState {
    pub fn current(&self) -> Option<DocId> {
        self.current.lock().expect("session state poisoned").clone()
    }

    pub fn replace(&self, doc_id: Option<DocId>) -> Option<DocId> {
        std::mem::replace(
            &mut *self.current.lock().expect("session state poisoned"),
            doc_id,
        )
    }
}

/// Payload for `error_message` events. Mirrors the HTTP error contract so
/// clients share one error decoder.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessagePayload {
    pub message: String,
    pub name: String,
    pub status: u16,
}

impl From<AppError> for ErrorMessagePayload {
    fn from(error: AppError) -> Self {
        let (status, payload) = error.into_payload();
        Self {
            message: payload.message,
            name: payload.name,
            status: status.as_u16(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_state_swaps_current_document() {
        let session = SessionDocState::default();
        assert!(session.current().is_none());

        let previous = session.replace(Some(DocId::from("d1")));
        assert!(previous.is_none());
        assert_eq!(session.current(), Some(DocId::from("d1")));

        let previous = session.replace(None);
        assert_eq!(previous, Some(DocId::from("d1")));
        assert!(session.current().is_none());
    }

    #[test]
    fn error_payload_keeps_name_and_status() {
        let payload = ErrorMessagePayload::from(AppError::doc_not_found("d9"));
        assert_eq!(payload.status, 404);
        assert_eq!(payload.name, "DOC_NOT_FOUND");
        assert!(payload.message.contains("d9"));
    }
}
