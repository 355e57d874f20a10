use chrono::Utc;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use socketioxide::{
    SocketIo,
    extract::{Extension, SocketRef, State, TryData},
    handler::ConnectHandler,
};
use tracing::{debug, warn};

use quillpad_core::ids::DocId;
use quillpad_core::operation::Operation;
use quillpad_core::roles::{AccessLevel, get_document_with_access};

use crate::{
    error::AppError,
    rooms::{
        CursorMovedPayload, DocumentStatePayload, OperationAckPayload, PresenceEntry,
        RemoteOperationPayload, RoomUser, UserLeftPayload, doc_channel, presence_channel,
    },
    socket::{
        auth::authenticate_socket,
        types::{ErrorMessagePayload, SessionDocState, SocketUserContext},
    },
    state::AppState,
};

pub(crate) fn register_namespace(io: &SocketIo) {
    let _ = io.ns("/", on_connect.with(authenticate_socket));
}

async fn on_connect(socket: SocketRef) {
    socket.on("join_document", handle_join_document);
    socket.on("leave_document", handle_leave_document);
    socket.on("operation", handle_operation);
    socket.on("cursor_move", handle_cursor_move);

    socket.on_disconnect(handle_disconnect);
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinDocumentRequest {
    document_id: DocId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationRequest {
    operation: Operation,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorMoveRequest {
    cursor: JsonValue,
}

fn emit_error(socket: &SocketRef, error: AppError) {
    let payload = ErrorMessagePayload::from(error);
    if let Err(err) = socket.emit("error_message", &payload) {
        warn!(?err, "failed to emit error message");
    }
}

async fn handle_join_document(
    socket: SocketRef,
    TryData(payload): TryData<JoinDocumentRequest>,
    State(state): State<AppState>,
    Extension(user): Extension<SocketUserContext>,
    Extension(session): Extension<SessionDocState>,
) {
    let payload = match payload {
        Ok(payload) => payload,
        Err(err) => {
            emit_error(
                &socket,
                AppError::invalid_operation(format!("malformed join_document payload: {err}")),
            );
            return;
        }
    };
    let doc_id = payload.document_id;

    let (record, role) = match get_document_with_access(
        state.document_store.as_ref(),
        &doc_id,
        &user.user_id,
        AccessLevel::Read,
    )
    .await
    {
        Ok(resolved) => resolved,
        Err(err) => {
            warn!(doc_id = %doc_id, user_id = %user.user_id, error = %err, "join denied");
            emit_error(&socket, err.into());
            return;
        }
    };

    // Switching documents leaves the old room first; re-joining the same
    // document just refreshes state (the fresh document_state is
    // authoritative for the client).
    if let Some(current) = session.current() {
        if current != doc_id {
            leave_room(&socket, &state, &user, &current).await;
            session.replace(None);
        }
    }

    let room_user = RoomUser {
        user_id: user.user_id.clone(),
        username: user.username.clone(),
        role,
        joined_at: Utc::now(),
    };
    let was_member = state.rooms.is_member(&doc_id, &user.user_id);
    state.rooms.register_local_user(&doc_id, room_user.clone());

    if let Err(err) = state.rooms.ensure_subscribed(&doc_id).await {
        warn!(doc_id = %doc_id, error = %err, "bus subscription failed on join");
        state.rooms.remove_local_user(&doc_id, &user.user_id).await;
        emit_error(
            &socket,
            AppError::transient("collaboration bus unavailable; try again"),
        );
        return;
    }

    let entry = PresenceEntry::from(&room_user);
    state.rooms.upsert_presence(&doc_id, &entry).await;

    socket.join(doc_channel(&doc_id));
    session.replace(Some(doc_id.clone()));

    let document_state = DocumentStatePayload {
        id: record.id.to_string(),
        title: record.title.clone(),
        content: record.content.clone(),
        version: record.version,
        owner: record.owner.clone(),
        role,
        active_users: state.rooms.active_users(&doc_id).await,
    };
    if let Err(err) = socket.emit("document_state", &document_state) {
        warn!(doc_id = %doc_id, ?err, "failed to emit document state");
    }

    if !was_member {
        if let Err(err) = socket
            .broadcast()
            .to(doc_channel(&doc_id))
            .emit("user_joined", &entry)
            .await
        {
            warn!(doc_id = %doc_id, ?err, "failed to broadcast user_joined");
        }
        state
            .rooms
            .publish(&presence_channel(&doc_id), "user_joined", &entry)
            .await;
    }

    debug!(doc_id = %doc_id, user_id = %user.user_id, "joined document");
}

async fn handle_leave_document(
    socket: SocketRef,
    State(state): State<AppState>,
    Extension(user): Extension<SocketUserContext>,
    Extension(session): Extension<SessionDocState>,
) {
    if let Some(doc_id) = session.replace(None) {
        leave_room(&socket, &state, &user, &doc_id).await;
    }
}

async fn handle_operation(
    socket: SocketRef,
    TryData(payload): TryData<OperationRequest>,
    State(state): State<AppState>,
    Extension(user): Extension<SocketUserContext>,
    Extension(session): Extension<SessionDocState>,
) {
    let payload = match payload {
        Ok(payload) => payload,
        Err(err) => {
            emit_error(
                &socket,
                AppError::invalid_operation(format!("malformed operation payload: {err}")),
            );
            return;
        }
    };

    let Some(doc_id) = session.current() else {
        emit_error(&socket, AppError::not_in_document());
        return;
    };

    if let Err(err) = payload.operation.validate() {
        emit_error(&socket, AppError::invalid_operation(err.to_string()));
        return;
    }

    // Roles can change mid-session; the edit capability is re-checked on
    // every operation against a freshly loaded record.
    if let Err(err) = get_document_with_access(
        state.document_store.as_ref(),
        &doc_id,
        &user.user_id,
        AccessLevel::Edit,
    )
    .await
    {
        warn!(doc_id = %doc_id, user_id = %user.user_id, error = %err, "operation rejected");
        emit_error(&socket, err.into());
        return;
    }

    let accepted = match state
        .engine
        .process_operation(&doc_id, payload.operation, &user.user_id)
        .await
    {
        Ok(accepted) => accepted,
        Err(err) => {
            emit_error(&socket, err);
            return;
        }
    };

    state.metrics.inc_operations_accepted();

    let ack = OperationAckPayload {
        operation: accepted.operation.clone(),
        version: accepted.version,
        user_id: user.user_id.clone(),
    };
    if let Err(err) = socket.emit("operation_ack", &ack) {
        warn!(doc_id = %doc_id, ?err, "failed to emit operation ack");
    }

    // A noop left the document untouched; nothing to fan out.
    if accepted.operation.is_noop() {
        return;
    }

    let remote = RemoteOperationPayload {
        operation: accepted.operation,
        version: accepted.version,
        user_id: user.user_id.clone(),
        username: user.username.clone(),
    };
    if let Err(err) = socket
        .broadcast()
        .to(doc_channel(&doc_id))
        .emit("remote_operation", &remote)
        .await
    {
        warn!(doc_id = %doc_id, ?err, "failed to broadcast remote operation");
    }
    state
        .rooms
        .publish(&doc_channel(&doc_id), "remote_operation", &remote)
        .await;
}

async fn handle_cursor_move(
    socket: SocketRef,
    TryData(payload): TryData<CursorMoveRequest>,
    State(state): State<AppState>,
    Extension(user): Extension<SocketUserContext>,
    Extension(session): Extension<SessionDocState>,
) {
    let payload = match payload {
        Ok(payload) => payload,
        Err(err) => {
            emit_error(
                &socket,
                AppError::invalid_operation(format!("malformed cursor_move payload: {err}")),
            );
            return;
        }
    };

    let Some(doc_id) = session.current() else {
        debug!(user_id = %user.user_id, "cursor_move outside a document dropped");
        return;
    };

    if !state.rooms.accept_cursor(&doc_id, &user.user_id) {
        state.metrics.inc_cursors_dropped();
        return;
    }

    let moved = CursorMovedPayload {
        user_id: user.user_id.clone(),
        username: user.username.clone(),
        cursor: payload.cursor.clone(),
    };
    if let Err(err) = socket
        .broadcast()
        .to(doc_channel(&doc_id))
        .emit("cursor_moved", &moved)
        .await
    {
        warn!(doc_id = %doc_id, ?err, "failed to broadcast cursor");
    }

    state
        .rooms
        .update_presence_cursor(&doc_id, &user.user_id, payload.cursor)
        .await;
}

async fn handle_disconnect(
    socket: SocketRef,
    State(state): State<AppState>,
    Extension(user): Extension<SocketUserContext>,
    Extension(session): Extension<SessionDocState>,
) {
    if let Some(doc_id) = session.replace(None) {
        leave_room(&socket, &state, &user, &doc_id).await;
    }
    state.metrics.dec_connections();
}

/// The shared Leave pathway: drop local membership and presence, tell the
/// room, and let the manager release fleet resources when the room empties.
async fn leave_room(
    socket: &SocketRef,
    state: &AppState,
    user: &SocketUserContext,
    doc_id: &DocId,
) {
    let removed = state.rooms.remove_local_user(doc_id, &user.user_id).await;
    state.rooms.delete_presence(doc_id, &user.user_id).await;

    if removed.is_some() {
        let payload = UserLeftPayload {
            user_id: user.user_id.clone(),
            username: user.username.clone(),
        };
        if let Err(err) = socket
            .broadcast()
            .to(doc_channel(doc_id))
            .emit("user_left", &payload)
            .await
        {
            warn!(doc_id = %doc_id, ?err, "failed to broadcast user_left");
        }
        state
            .rooms
            .publish(&presence_channel(doc_id), "user_left", &payload)
            .await;
    }

    socket.leave(doc_channel(doc_id));
    debug!(doc_id = %doc_id, user_id = %user.user_id, "left document");
}
