//! Timed rotation driver.

use std::sync::Arc;
use std::time::Duration;

use super::Registry;

/// Seconds between switches. Coarse enough for DNS/CDN caches to follow
/// the redirect chain without thrash.
pub const ROTATION_PERIOD: Duration = Duration::from_secs(10);

/// Drives `Registry::rotate` on a fixed tick. One per process.
pub struct Rotator {
    registry: Arc<Registry>,
    period: Duration,
}

impl Rotator {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            period: ROTATION_PERIOD,
        }
    }

    #[cfg(test)]
    fn with_period(registry: Arc<Registry>, period: Duration) -> Self {
        Self { registry, period }
    }

    /// Rotation loop. A failed store write is retried implicitly on the
    /// next tick; the cursor has already moved, so the record catches up.
    pub async fn run(self) {
        loop {
            tokio::time::sleep(self.period).await;
            if let Err(e) = self.registry.rotate().await {
                tracing::warn!(error = %e, "rotation failed, retrying on next tick");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::Endpoint;
    use crate::store::memory::MemoryStore;
    use crate::store::{CoordinationStore, ACTIVE_PROXY_KEY};

    #[tokio::test]
    async fn rotator_writes_the_record_on_each_tick() {
        let store = Arc::new(MemoryStore::new());
        let endpoints = vec![
            Endpoint::new("proxy1", "host", 8081),
            Endpoint::new("proxy2", "host", 8082),
        ];
        let registry = Arc::new(Registry::new(endpoints, store.clone()).unwrap());

        let rotator = Rotator::with_period(registry.clone(), Duration::from_millis(10));
        let handle = tokio::spawn(rotator.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        let recorded = store.get(ACTIVE_PROXY_KEY).await.unwrap().unwrap();
        assert_eq!(recorded, registry.current().url());
    }
}
