use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tracing::warn;

const CHANNEL_CAPACITY: usize = 128;

/// Stream of messages for one subscribed channel.
pub struct BusSubscription {
    channel: String,
    stream: BoxStream<'static, String>,
}

impl BusSubscription {
    pub fn new(channel: impl Into<String>, stream: BoxStream<'static, String>) -> Self {
        Self {
            channel: channel.into(),
            stream,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next message, or `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.stream.next().await
    }
}

/// Adapter over the fleet's pub/sub bus. Channels carry JSON strings; the
/// key-value side holds TTL'd presence entries. The store stays the source
/// of truth — a lost bus message never corrupts document state.
#[async_trait]
pub trait PubSubBus: Send + Sync {
    async fn publish(&self, channel: &str, payload: String) -> Result<()>;

    async fn subscribe(&self, channel: &str) -> Result<BusSubscription>;

    async fn unsubscribe(&self, channel: &str) -> Result<()>;

    async fn kv_set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    async fn kv_get(&self, key: &str) -> Result<Option<String>>;

    async fn kv_del(&self, key: &str) -> Result<()>;

    /// Keys matching `pattern`, where a trailing `*` matches any suffix.
    async fn kv_keys(&self, pattern: &str) -> Result<Vec<String>>;
}

struct ExpiringValue {
    value: String,
    expires_at: Instant,
}

impl ExpiringValue {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process bus. Two server states sharing one `MemoryBus` behave like a
/// two-instance fleet behind a shared broker, which is how the integration
/// suite models cross-instance fan-out.
#[derive(Default)]
pub struct MemoryBus {
    channels: DashMap<String, broadcast::Sender<String>>,
    entries: DashMap<String, ExpiringValue>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_owned())
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
                tx
            })
            .clone()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    fn matches(pattern: &str, key: &str) -> bool {
        match pattern.strip_suffix('*') {
            Some(prefix) => key.starts_with(prefix),
            None => key == pattern,
        }
    }
}

#[async_trait]
impl PubSubBus for MemoryBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<()> {
        // A send without receivers is not an error; peers may simply be gone.
        let _ = self.ensure_sender(channel).send(payload);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BusSubscription> {
        let receiver = self.ensure_sender(channel).subscribe();
        let name = channel.to_owned();
        let stream = stream::unfold((receiver, name.clone()), |(mut rx, name)| async move {
            loop {
                match rx.recv().await {
                    Ok(message) => return Some((message, (rx, name))),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(channel = %name, skipped, "bus subscriber lagged; dropping messages");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed();

        Ok(BusSubscription::new(name, stream))
    }

    async fn unsubscribe(&self, channel: &str) -> Result<()> {
        self.channels.remove(channel);
        Ok(())
    }

    async fn kv_set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_owned(),
            ExpiringValue {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn kv_get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired());
        Ok(None)
    }

    async fn kv_del(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn kv_keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.entries.retain(|_, entry| !entry.is_expired());
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| Self::matches(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
