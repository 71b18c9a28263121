//! In-process coordination store.
//!
//! Backs the test suite and single-process deployments. Keys live in a
//! mutex-guarded map, topics fan out over tokio broadcast channels, and the
//! stream keeps a delivered-but-unacknowledged pending list so the
//! at-least-once contract matches the Redis backing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::Instant;

use super::{CoordinationStore, StoreError, StreamEntry};

const TOPIC_CAPACITY: usize = 64;

#[derive(Default)]
struct StreamState {
    next_id: u64,
    backlog: VecDeque<StreamEntry>,
    pending: Vec<StreamEntry>,
    group_created: bool,
}

/// Mutex-guarded in-memory store.
pub struct MemoryStore {
    keys: Mutex<HashMap<String, String>>,
    topics: Mutex<HashMap<String, broadcast::Sender<String>>>,
    streams: Mutex<HashMap<String, StreamState>>,
    stream_signal: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            topics: Mutex::new(HashMap::new()),
            streams: Mutex::new(HashMap::new()),
            stream_signal: Arc::new(Notify::new()),
        }
    }

    fn topic_sender(&self, topic: &str) -> broadcast::Sender<String> {
        let mut topics = self.topics.lock().expect("topic map poisoned");
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut keys = self.keys.lock().expect("key map poisoned");
        keys.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let keys = self.keys.lock().expect("key map poisoned");
        Ok(keys.get(key).cloned())
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut keys = self.keys.lock().expect("key map poisoned");
        let current = match keys.get(key) {
            Some(v) => v
                .parse::<i64>()
                .map_err(|_| StoreError::Protocol(format!("key {key} is not an integer")))?,
            None => 0,
        };
        let next = current + delta;
        keys.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), StoreError> {
        // A send error only means nobody is subscribed right now.
        let _ = self.topic_sender(topic).send(payload.to_string());
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<String>, StoreError> {
        let mut source = self.topic_sender(topic).subscribe();
        let (tx, rx) = mpsc::channel(TOPIC_CAPACITY);
        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(rx)
    }

    async fn ensure_group(&self, stream: &str, _group: &str) -> Result<(), StoreError> {
        let mut streams = self.streams.lock().expect("stream map poisoned");
        streams.entry(stream.to_string()).or_default().group_created = true;
        Ok(())
    }

    async fn xadd(&self, stream: &str, fields: &[(String, String)]) -> Result<String, StoreError> {
        let id = {
            let mut streams = self.streams.lock().expect("stream map poisoned");
            let state = streams.entry(stream.to_string()).or_default();
            let id = format!("{}-0", state.next_id);
            state.next_id += 1;
            state.backlog.push_back(StreamEntry {
                id: id.clone(),
                fields: fields.iter().cloned().collect(),
            });
            id
        };
        self.stream_signal.notify_waiters();
        Ok(id)
    }

    async fn xread_group(
        &self,
        stream: &str,
        _group: &str,
        _consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        let deadline = Instant::now() + block;
        loop {
            {
                let mut streams = self.streams.lock().expect("stream map poisoned");
                let state = streams.entry(stream.to_string()).or_default();
                if !state.backlog.is_empty() {
                    let take = count.min(state.backlog.len());
                    let taken: Vec<StreamEntry> = state.backlog.drain(..take).collect();
                    state.pending.extend(taken.iter().cloned());
                    return Ok(taken);
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            let _ = tokio::time::timeout(remaining, self.stream_signal.notified()).await;
        }
    }

    async fn ack(&self, stream: &str, _group: &str, ids: &[String]) -> Result<(), StoreError> {
        let mut streams = self.streams.lock().expect("stream map poisoned");
        if let Some(state) = streams.get_mut(stream) {
            state.pending.retain(|entry| !ids.contains(&entry.id));
        }
        Ok(())
    }
}
