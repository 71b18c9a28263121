//! Per-request directives.
//!
//! Operators inject targeted instructions onto the `proxy_requests`
//! stream; the worker's director consumes at most one per outgoing
//! request with a 10 ms bounded read, so the hot path never stalls on the
//! store. A background drain loop keeps the pending entry list from
//! growing when traffic is too slow to consume injected entries.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::store::{
    CoordinationStore, StoreError, StreamEntry, DIRECTIVE_CONSUMER, DIRECTIVE_GROUP,
    DIRECTIVE_STREAM,
};

/// Bound on the in-path stream read.
const POLL_BLOCK: Duration = Duration::from_millis(10);

/// Bound on the background drain read.
const DRAIN_BLOCK: Duration = Duration::from_secs(5);
const DRAIN_BATCH: usize = 10;

/// Recognized fields of one stream entry. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directive {
    /// Drop the upstream dial; the worker answers 502.
    pub block: bool,
    /// Override the upstream target's scheme, host, and path.
    pub redirect_url: Option<Url>,
}

impl Directive {
    pub fn from_entry(entry: &StreamEntry) -> Self {
        let block = entry.fields.get("block").map(String::as_str) == Some("true");
        let redirect_url = entry
            .fields
            .get("redirect_url")
            .and_then(|raw| match Url::parse(raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(raw = %raw, error = %e, "ignoring unparseable redirect_url directive");
                    None
                }
            });
        Self {
            block,
            redirect_url,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.block && self.redirect_url.is_none()
    }
}

/// Reads directives for one worker process.
pub struct DirectiveConsumer {
    store: Arc<dyn CoordinationStore>,
}

impl DirectiveConsumer {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// Create the stream and group. Call once at startup.
    pub async fn setup(&self) -> Result<(), StoreError> {
        self.store
            .ensure_group(DIRECTIVE_STREAM, DIRECTIVE_GROUP)
            .await
    }

    /// In-path read of at most one directive. Empty reads, timeouts, and
    /// store hiccups are all silent: directives are best-effort and must
    /// never fail a request on their own.
    pub async fn poll_one(&self) -> Option<Directive> {
        let entries = self
            .store
            .xread_group(
                DIRECTIVE_STREAM,
                DIRECTIVE_GROUP,
                DIRECTIVE_CONSUMER,
                1,
                POLL_BLOCK,
            )
            .await
            .ok()?;
        let entry = entries.first()?;
        let directive = Directive::from_entry(entry);
        if let Err(e) = self
            .store
            .ack(DIRECTIVE_STREAM, DIRECTIVE_GROUP, &[entry.id.clone()])
            .await
        {
            tracing::warn!(error = %e, id = %entry.id, "failed to ack directive");
        }
        tracing::info!(?directive, id = %entry.id, "applying stream directive");
        Some(directive)
    }

    /// Background loop consuming leftovers so the pending entry list stays
    /// bounded. Runs for the process lifetime.
    pub async fn run_drain(self: Arc<Self>) {
        loop {
            let entries = match self
                .store
                .xread_group(
                    DIRECTIVE_STREAM,
                    DIRECTIVE_GROUP,
                    "drain_consumer",
                    DRAIN_BATCH,
                    DRAIN_BLOCK,
                )
                .await
            {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(error = %e, "directive drain read failed");
                    tokio::time::sleep(DRAIN_BLOCK).await;
                    continue;
                }
            };
            if entries.is_empty() {
                continue;
            }

            let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
            tracing::info!(count = ids.len(), "drained leftover directives");
            if let Err(e) = self.store.ack(DIRECTIVE_STREAM, DIRECTIVE_GROUP, &ids).await {
                tracing::warn!(error = %e, "failed to ack drained directives");
            }
        }
    }
}
