//! Proxy registry: endpoint set plus the active cursor.

use std::sync::{Arc, Mutex};

use rand::seq::SliceRandom;

use crate::observability::metrics;
use crate::store::{CoordinationStore, StoreError, ACTIVE_PROXY_KEY, SWITCH_TOPIC};

/// One internal proxy endpoint. Immutable after registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub id: String,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
        }
    }

    /// Canonical public URL, the exact string written to the store.
    pub fn url(&self) -> String {
        format!("https://{}:{}", self.host, self.port)
    }
}

struct RegistryInner {
    endpoints: Vec<Endpoint>,
    active: Endpoint,
}

/// Ordered endpoint sequence plus the mutex-guarded active cursor.
///
/// The registry exclusively owns the `active_proxy` record and the switch
/// topic; `rotate` is only ever driven by the single per-process rotator.
pub struct Registry {
    inner: Mutex<RegistryInner>,
    store: Arc<dyn CoordinationStore>,
}

impl Registry {
    /// Build a registry from a non-empty endpoint list. The first endpoint
    /// starts active.
    pub fn new(endpoints: Vec<Endpoint>, store: Arc<dyn CoordinationStore>) -> Option<Self> {
        let active = endpoints.first()?.clone();
        Some(Self {
            inner: Mutex::new(RegistryInner { endpoints, active }),
            store,
        })
    }

    /// Snapshot of the current active endpoint. Non-blocking beyond the
    /// cursor lock.
    pub fn current(&self) -> Endpoint {
        self.inner.lock().expect("registry lock poisoned").active.clone()
    }

    /// All registered endpoints, in current order.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .endpoints
            .clone()
    }

    /// Read the active-proxy record straight from the store.
    pub async fn active_from_store(&self) -> Result<Option<String>, StoreError> {
        self.store.get(ACTIVE_PROXY_KEY).await
    }

    /// Pick a new active endpoint, persist it, and announce the switch.
    ///
    /// The shuffle happens under the cursor lock; the store round-trips do
    /// not, so readers are never blocked on the network.
    pub async fn rotate(&self) -> Result<Endpoint, StoreError> {
        let active = {
            let mut inner = self.inner.lock().expect("registry lock poisoned");
            inner.endpoints.shuffle(&mut rand::thread_rng());
            inner.active = inner.endpoints[0].clone();
            inner.active.clone()
        };

        tracing::info!(proxy_id = %active.id, url = %active.url(), "switched active proxy");
        metrics::record_switch(&active.id);

        self.store.set(ACTIVE_PROXY_KEY, &active.url()).await?;
        self.store.publish(SWITCH_TOPIC, &active.url()).await?;
        Ok(active)
    }
}
