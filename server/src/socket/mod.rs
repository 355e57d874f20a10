mod auth;
mod events;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use socketioxide::{SocketIo, layer::SocketIoLayer};

use crate::state::AppState;

/// Engine-level keepalive: a ping every 25 s, sessions timing out after
/// 60 s without a pong, both terminating through the normal disconnect
/// pathway.
pub const PING_INTERVAL: Duration = Duration::from_secs(25);
pub const PING_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) fn build_socket_layer(state: AppState) -> (SocketIoLayer, Arc<SocketIo>) {
    let (layer, io) = auth::build_socket(state);
    events::register_namespace(&io);
    (layer, Arc::new(io))
}
