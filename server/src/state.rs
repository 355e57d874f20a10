use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use once_cell::sync::OnceCell;
use socketioxide::SocketIo;
use uuid::Uuid;

use quillpad_core::bus::{MemoryBus, PubSubBus};
use quillpad_core::config::AppConfig;
use quillpad_core::store::{DocumentStore, MemoryDocumentStore};
use quillpad_core::user::{MemoryUserStore, UserStore};

use crate::engine::DocEngine;
use crate::rooms::RoomManager;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Process-unique id stamped on every bus frame to suppress echo.
    pub server_id: String,
    pub document_store: Arc<dyn DocumentStore>,
    pub user_store: Arc<dyn UserStore>,
    pub bus: Arc<dyn PubSubBus>,
    pub engine: DocEngine,
    pub rooms: Arc<RoomManager>,
    pub socket_io: Arc<OnceCell<Arc<SocketIo>>>,
    pub metrics: Arc<SocketMetrics>,
}

/// Build a state backed by the in-process adapters.
pub fn build_state(config: AppConfig) -> AppState {
    build_state_with_adapters(
        config,
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(MemoryUserStore::new()),
        Arc::new(MemoryBus::new()),
    )
}

/// Build a state over explicit adapters. Tests use this to share one bus
/// between several states, modelling a multi-instance fleet.
pub fn build_state_with_adapters(
    config: AppConfig,
    document_store: Arc<dyn DocumentStore>,
    user_store: Arc<dyn UserStore>,
    bus: Arc<dyn PubSubBus>,
) -> AppState {
    let server_id = Uuid::new_v4().to_string();
    let socket_io = Arc::new(OnceCell::new());
    let engine = DocEngine::new(document_store.clone());
    let rooms = Arc::new(RoomManager::new(
        server_id.clone(),
        bus.clone(),
        engine.clone(),
        socket_io.clone(),
    ));

    AppState {
        config: Arc::new(config),
        server_id,
        document_store,
        user_store,
        bus,
        engine,
        rooms,
        socket_io,
        metrics: Arc::new(SocketMetrics::default()),
    }
}

#[derive(Default)]
pub struct SocketMetrics {
    connections: AtomicUsize,
    operations_accepted: AtomicUsize,
    cursors_dropped: AtomicUsize,
}

impl SocketMetrics {
    pub fn inc_connections(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_connections(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn inc_operations_accepted(&self) {
        self.operations_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cursors_dropped(&self) {
        self.cursors_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn operations_accepted(&self) -> usize {
        self.operations_accepted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_get_distinct_server_ids() {
        let a = build_state(AppConfig::default());
        let b = build_state(AppConfig::default());
        assert_ne!(a.server_id, b.server_id);
        assert_eq!(a.rooms.server_id(), a.server_id);
    }

    #[test]
    fn metrics_counters_move() {
        let metrics = SocketMetrics::default();
        metrics.inc_connections();
        metrics.inc_connections();
        metrics.dec_connections();
        metrics.inc_operations_accepted();
        assert_eq!(metrics.connections(), 1);
        assert_eq!(metrics.operations_accepted(), 1);
    }
}
