use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use socketioxide::SocketIo;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use quillpad_core::bus::{BusSubscription, PubSubBus};
use quillpad_core::ids::{DocId, UserId};
use quillpad_core::operation::Operation;
use quillpad_core::roles::Role;

use crate::engine::DocEngine;

/// Presence entries expire from the bus after this long without a refresh.
pub const PRESENCE_TTL: Duration = Duration::from_secs(300);

/// Minimum spacing between accepted cursor updates per user per document.
pub const CURSOR_THROTTLE: Duration = Duration::from_millis(50);

pub fn doc_channel(doc_id: &DocId) -> String {
    format!("doc:{doc_id}")
}

pub fn presence_channel(doc_id: &DocId) -> String {
    format!("presence:{doc_id}")
}

pub fn presence_entry_key(doc_id: &DocId, user_id: &UserId) -> String {
    format!("presence:{doc_id}:{user_id}")
}

/// A user currently joined to a room on this instance.
#[derive(Debug, Clone)]
pub struct RoomUser {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<JsonValue>,
}

impl From<&RoomUser> for PresenceEntry {
    fn from(user: &RoomUser) -> Self {
        Self {
            user_id: user.user_id.clone(),
            username: user.username.clone(),
            role: user.role,
            joined_at: user.joined_at,
            cursor: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStatePayload {
    pub id: String,
    pub title: String,
    pub content: String,
    pub version: u64,
    pub owner: UserId,
    pub role: Role,
    pub active_users: Vec<PresenceEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationAckPayload {
    pub operation: Operation,
    pub version: u64,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOperationPayload {
    pub operation: Operation,
    pub version: u64,
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeftPayload {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorMovedPayload {
    pub user_id: UserId,
    pub username: String,
    pub cursor: JsonValue,
}

/// Frame carried on bus channels. The `server_id` stamp suppresses echo:
/// each instance drops frames it published itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEnvelope {
    pub server_id: String,
    pub event: String,
    pub payload: JsonValue,
}

impl RemoteEnvelope {
    pub fn new(
        server_id: impl Into<String>,
        event: impl Into<String>,
        payload: &impl Serialize,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            server_id: server_id.into(),
            event: event.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    pub fn is_local(&self, server_id: &str) -> bool {
        self.server_id == server_id
    }
}

/// Per-instance room bookkeeping: which users are joined locally, which bus
/// channels are subscribed, and cursor throttling. Socket emission stays in
/// the socket layer; this type owns everything that must survive it.
pub struct RoomManager {
    server_id: String,
    bus: Arc<dyn PubSubBus>,
    engine: DocEngine,
    socket_io: Arc<OnceCell<Arc<SocketIo>>>,
    local_users: DashMap<DocId, HashMap<UserId, RoomUser>>,
    subscriptions: StdMutex<HashMap<DocId, Vec<JoinHandle<()>>>>,
    cursor_marks: DashMap<(DocId, UserId), Instant>,
}

impl RoomManager {
    pub fn new(
        server_id: String,
        bus: Arc<dyn PubSubBus>,
        engine: DocEngine,
        socket_io: Arc<OnceCell<Arc<SocketIo>>>,
    ) -> Self {
        Self {
            server_id,
            bus,
            engine,
            socket_io,
            local_users: DashMap::new(),
            subscriptions: StdMutex::new(HashMap::new()),
            cursor_marks: DashMap::new(),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn engine(&self) -> &DocEngine {
        &self.engine
    }

    /// Insert a user into the room's local map. Returns true when this is
    /// the first local user, i.e. the room was just created.
    pub fn register_local_user(&self, doc_id: &DocId, user: RoomUser) -> bool {
        let mut entry = self.local_users.entry(doc_id.clone()).or_default();
        let first = entry.is_empty();
        entry.insert(user.user_id.clone(), user);
        first
    }

    pub fn is_member(&self, doc_id: &DocId, user_id: &UserId) -> bool {
        self.local_users
            .get(doc_id)
            .map(|users| users.contains_key(user_id))
            .unwrap_or(false)
    }

    pub fn local_user_count(&self, doc_id: &DocId) -> usize {
        self.local_users
            .get(doc_id)
            .map(|users| users.len())
            .unwrap_or(0)
    }

    pub fn local_user(&self, doc_id: &DocId, user_id: &UserId) -> Option<RoomUser> {
        self.local_users
            .get(doc_id)
            .and_then(|users| users.get(user_id).cloned())
    }

    /// Subscribe to both bus channels for a document and start ingress
    /// pumps. Idempotent: a room already in the registry is left alone, so
    /// joining twice yields exactly one subscription per channel.
    pub async fn ensure_subscribed(&self, doc_id: &DocId) -> anyhow::Result<()> {
        if self.is_subscribed(doc_id) {
            return Ok(());
        }

        self.engine.ensure(doc_id);

        let doc_sub = self.bus.subscribe(&doc_channel(doc_id)).await?;
        let presence_sub = self.bus.subscribe(&presence_channel(doc_id)).await?;
        let handles = vec![
            self.spawn_ingress_pump(doc_id.clone(), doc_sub),
            self.spawn_ingress_pump(doc_id.clone(), presence_sub),
        ];

        let mut subscriptions = self
            .subscriptions
            .lock()
            .expect("subscription registry poisoned");
        match subscriptions.entry(doc_id.clone()) {
            std::collections::hash_map::Entry::Occupied(_) => {
                // Lost the race against a concurrent join; drop ours.
                for handle in handles {
                    handle.abort();
                }
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(handles);
            }
        }
        Ok(())
    }

    pub fn is_subscribed(&self, doc_id: &DocId) -> bool {
        self.subscriptions
            .lock()
            .expect("subscription registry poisoned")
            .contains_key(doc_id)
    }

    fn spawn_ingress_pump(&self, doc_id: DocId, mut sub: BusSubscription) -> JoinHandle<()> {
        let server_id = self.server_id.clone();
        let socket_io = self.socket_io.clone();
        let room = doc_channel(&doc_id);

        tokio::spawn(async move {
            while let Some(message) = sub.recv().await {
                let envelope: RemoteEnvelope = match serde_json::from_str(&message) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        warn!(doc_id = %doc_id, error = %err, "malformed bus frame dropped");
                        continue;
                    }
                };

                if envelope.is_local(&server_id) {
                    continue;
                }

                let Some(io) = socket_io.get() else {
                    continue;
                };
                if let Some(ns) = io.of("/") {
                    if let Err(err) = ns.to(room.clone()).emit(envelope.event, &envelope.payload).await
                    {
                        warn!(doc_id = %doc_id, ?err, "failed to fan out remote event");
                    }
                }
            }
            debug!(doc_id = %doc_id, "bus ingress pump stopped");
        })
    }

    /// Remove a user from the room. When the local map empties, the room is
    /// released: channels unsubscribed, pumps stopped, buffer discarded.
    pub async fn remove_local_user(&self, doc_id: &DocId, user_id: &UserId) -> Option<RoomUser> {
        let (removed, now_empty) = match self.local_users.get_mut(doc_id) {
            Some(mut entry) => {
                let removed = entry.remove(user_id);
                (removed, entry.is_empty())
            }
            None => (None, false),
        };

        if now_empty {
            self.local_users.remove(doc_id);
            self.release(doc_id).await;
        }
        removed
    }

    async fn release(&self, doc_id: &DocId) {
        let handles = {
            let mut subscriptions = self
                .subscriptions
                .lock()
                .expect("subscription registry poisoned");
            subscriptions.remove(doc_id)
        };
        if let Some(handles) = handles {
            for handle in handles {
                handle.abort();
            }
        }

        for channel in [doc_channel(doc_id), presence_channel(doc_id)] {
            if let Err(err) = self.bus.unsubscribe(&channel).await {
                warn!(%channel, error = %err, "failed to unsubscribe bus channel");
            }
        }

        self.engine.discard(doc_id);
        self.cursor_marks.retain(|(doc, _), _| doc != doc_id);
        debug!(doc_id = %doc_id, "room released");
    }

    /// Write or refresh the user's presence entry on the bus.
    pub async fn upsert_presence(&self, doc_id: &DocId, entry: &PresenceEntry) {
        let key = presence_entry_key(doc_id, &entry.user_id);
        let value = match serde_json::to_string(entry) {
            Ok(value) => value,
            Err(err) => {
                warn!(%key, error = %err, "failed to serialize presence entry");
                return;
            }
        };
        if let Err(err) = self.bus.kv_set(&key, value, PRESENCE_TTL).await {
            warn!(%key, error = %err, "failed to write presence entry");
        }
    }

    pub async fn delete_presence(&self, doc_id: &DocId, user_id: &UserId) {
        let key = presence_entry_key(doc_id, user_id);
        if let Err(err) = self.bus.kv_del(&key).await {
            warn!(%key, error = %err, "failed to delete presence entry");
        }
    }

    /// Enumerate live presence entries for a document across the fleet.
    pub async fn active_users(&self, doc_id: &DocId) -> Vec<PresenceEntry> {
        let pattern = format!("presence:{doc_id}:*");
        let keys = match self.bus.kv_keys(&pattern).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(doc_id = %doc_id, error = %err, "failed to list presence keys");
                return Vec::new();
            }
        };

        let mut users = Vec::with_capacity(keys.len());
        for key in keys {
            match self.bus.kv_get(&key).await {
                Ok(Some(raw)) => match serde_json::from_str::<PresenceEntry>(&raw) {
                    Ok(entry) => users.push(entry),
                    Err(err) => warn!(%key, error = %err, "malformed presence entry skipped"),
                },
                Ok(None) => {}
                Err(err) => warn!(%key, error = %err, "failed to read presence entry"),
            }
        }
        users.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        users
    }

    /// Refresh the cursor inside the user's presence entry, keeping
    /// last-writer-wins semantics on the TTL'd key.
    pub async fn update_presence_cursor(
        &self,
        doc_id: &DocId,
        user_id: &UserId,
        cursor: JsonValue,
    ) {
        let Some(user) = self.local_user(doc_id, user_id) else {
            return;
        };
        let mut entry = PresenceEntry::from(&user);
        entry.cursor = Some(cursor);
        self.upsert_presence(doc_id, &entry).await;
    }

    /// Per-user-per-document cursor throttle. Returns whether this cursor
    /// update should be accepted.
    pub fn accept_cursor(&self, doc_id: &DocId, user_id: &UserId) -> bool {
        let key = (doc_id.clone(), user_id.clone());
        let now = Instant::now();
        match self.cursor_marks.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) < CURSOR_THROTTLE {
                    false
                } else {
                    entry.insert(now);
                    true
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// Publish an event frame on a bus channel. Failures are logged and
    /// swallowed: the store is the source of truth and the bus only
    /// accelerates propagation.
    pub async fn publish(&self, channel: &str, event: &str, payload: &impl Serialize) {
        let envelope = match RemoteEnvelope::new(self.server_id.clone(), event, payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(%channel, event, error = %err, "failed to build bus envelope");
                return;
            }
        };
        let frame = match serde_json::to_string(&envelope) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%channel, event, error = %err, "failed to serialize bus envelope");
                return;
            }
        };
        if let Err(err) = self.bus.publish(channel, frame).await {
            warn!(%channel, event, error = %err, "bus publish failed; continuing");
        }
    }
}
