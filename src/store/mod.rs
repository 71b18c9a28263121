//! Coordination store.
//!
//! # Responsibilities
//! - Persist the active-proxy record (`active_proxy`)
//! - Fan out switch events on the `proxy_updates` topic
//! - Carry per-request directives on the `proxy_requests` stream
//!
//! # Design Decisions
//! - One object-safe trait so the pipeline never knows which backing it
//!   talks to
//! - Redis backing for multi-process deployments, in-process backing for
//!   tests and single-process runs (`memory://` store URL)
//! - `set` followed by `publish` is delivered in order; a subscriber may
//!   see the publish before a racing `get` reflects the write, and both
//!   paths are treated as valid by all readers

pub mod memory;
pub mod redis;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Key holding the canonical URL of the current active proxy.
pub const ACTIVE_PROXY_KEY: &str = "active_proxy";

/// Pub/sub topic announcing proxy switches; payload is the new active URL.
pub const SWITCH_TOPIC: &str = "proxy_updates";

/// Stream carrying per-request directives.
pub const DIRECTIVE_STREAM: &str = "proxy_requests";

/// Consumer group for the directive stream.
pub const DIRECTIVE_GROUP: &str = "proxy_group";

/// Consumer name used by the in-path directive reads.
pub const DIRECTIVE_CONSUMER: &str = "proxy_consumer";

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with something the client cannot interpret.
    #[error("store protocol error: {0}")]
    Protocol(String),
}

/// One entry read from a stream.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

/// Key/value + pub/sub + stream interface shared by every component.
///
/// Writers: the registry owns `active_proxy` and the switch topic, the
/// suspicion tracker owns its `suspicion:<ip>` counters, the admin surface
/// produces directive entries. Everything else only reads.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Unconditional write.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Read a key; a missing key is `None`, not an error.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Atomic increment; missing keys start at zero.
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    /// Fire-and-forget publish to a topic.
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), StoreError>;

    /// Subscribe to a topic. The returned channel yields payloads until the
    /// store shuts down or the receiver is dropped.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<String>, StoreError>;

    /// Create the stream and consumer group if they do not exist yet.
    /// Idempotent.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StoreError>;

    /// Append an entry to a stream; returns the assigned id.
    async fn xadd(&self, stream: &str, fields: &[(String, String)]) -> Result<String, StoreError>;

    /// Read up to `count` undelivered entries for the group, blocking at
    /// most `block`. An empty result on timeout is normal, not an error.
    async fn xread_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, StoreError>;

    /// Acknowledge delivered entries.
    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<(), StoreError>;
}

/// Connect to the store named by `url`.
///
/// `memory://` selects the in-process store; anything else is handed to the
/// Redis client.
pub async fn connect(url: &str) -> Result<Arc<dyn CoordinationStore>, StoreError> {
    if url.starts_with("memory://") {
        tracing::info!("using in-process coordination store");
        Ok(Arc::new(memory::MemoryStore::new()))
    } else {
        let store = redis::RedisStore::connect(url).await?;
        tracing::info!(url = %url, "connected to coordination store");
        Ok(Arc::new(store))
    }
}
