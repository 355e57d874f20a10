use serde_json::Value as JsonValue;
use socketioxide::{
    SocketIo,
    extract::{SocketRef, State, TryData},
    layer::SocketIoLayer,
};
use tracing::{info, warn};

use crate::{
    auth::authenticate_token,
    error::AppError,
    socket::{
        PING_INTERVAL, PING_TIMEOUT,
        types::{SessionDocState, SocketUserContext},
    },
    state::AppState,
};

pub(crate) fn build_socket(state: AppState) -> (SocketIoLayer, SocketIo) {
    SocketIo::builder()
        .with_state(state)
        .ping_interval(PING_INTERVAL)
        .ping_timeout(PING_TIMEOUT)
        .build_layer()
}

/// Connect middleware: resolve the handshake credential before any room
/// operation. Rejected connections never reach the event handlers.
pub(crate) async fn authenticate_socket(
    socket: SocketRef,
    TryData(auth): TryData<JsonValue>,
    State(state): State<AppState>,
) -> Result<(), AppError> {
    let auth = auth.ok();
    let token = token_from_handshake(auth.as_ref(), &socket)
        .ok_or_else(|| AppError::unauthorized("missing credential in handshake"))?;

    let user = match authenticate_token(&state, &token).await {
        Ok(user) => user,
        Err(err) => {
            warn!(socket_id = %socket.id, error = %err, "socket handshake refused");
            return Err(err);
        }
    };

    socket.extensions.insert(SocketUserContext {
        user_id: user.id.clone(),
        username: user.username.clone(),
    });
    socket.extensions.insert(SessionDocState::default());
    state.metrics.inc_connections();

    info!(socket_id = %socket.id, user_id = %user.id, "socket authenticated");
    Ok(())
}

/// The credential arrives either as `{ auth: { token } }` in the handshake
/// payload or as a `token` query parameter.
fn token_from_handshake(auth: Option<&JsonValue>, socket: &SocketRef) -> Option<String> {
    if let Some(value) = auth {
        if let Some(token) = value.get("token").and_then(JsonValue::as_str) {
            let trimmed = token.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_owned());
            }
        }
        if let Some(token) = value.as_str() {
            let trimmed = token.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_owned());
            }
        }
    }

    let query = socket.req_parts().uri.query()?;
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or_default();
        if key.eq_ignore_ascii_case("token") {
            let value = parts.next().unwrap_or_default().trim();
            if !value.is_empty() {
                return Some(value.to_owned());
            }
        }
    }
    None
}
