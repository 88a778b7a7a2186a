use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::backoff::BackoffConfig;
use crate::bridgeapi::BridgeApi;
use crate::controller::store::ClusterStore;
use crate::health::HealthState;

/// Default provider poll interval while a cluster is provisioning
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(10);

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Resource store
    pub store: Arc<dyn ClusterStore>,
    /// Crunchy Bridge API client
    pub bridge: Arc<dyn BridgeApi>,
    /// Poll interval while the provider is provisioning
    pub watch_interval: Duration,
    /// Team used when a spec does not name one
    pub team_id: Option<String>,
    /// Requeue schedule for failed reconciles
    pub backoff: BackoffConfig,
    /// Health and metrics state
    pub health: Option<Arc<HealthState>>,
    failures: FailureCounts,
}

impl Context {
    pub fn new(store: Arc<dyn ClusterStore>, bridge: Arc<dyn BridgeApi>) -> Self {
        Self {
            store,
            bridge,
            watch_interval: DEFAULT_WATCH_INTERVAL,
            team_id: None,
            backoff: BackoffConfig::default(),
            health: None,
            failures: FailureCounts::default(),
        }
    }

    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn with_team_id(mut self, team_id: Option<String>) -> Self {
        self.team_id = team_id.filter(|id| !id.trim().is_empty());
        self
    }

    pub fn with_health(mut self, health: Arc<HealthState>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Count a failed reconcile, returning the number of failures before it
    pub fn record_failure(&self, key: &str) -> u32 {
        self.failures.record(key)
    }

    pub fn clear_failures(&self, key: &str) {
        self.failures.clear(key);
    }

    pub fn failure_count(&self, key: &str) -> u32 {
        self.failures.get(key)
    }
}

/// Consecutive failed reconciles per object, keyed `namespace/name`
#[derive(Clone, Default)]
pub struct FailureCounts {
    counts: Arc<Mutex<HashMap<String, u32>>>,
}

impl FailureCounts {
    /// Count a failure, returning the number of failures before it
    pub fn record(&self, key: &str) -> u32 {
        let mut counts = self.counts.lock();
        let count = counts.entry(key.to_string()).or_insert(0);
        let previous = *count;
        *count = count.saturating_add(1);
        previous
    }

    pub fn clear(&self, key: &str) {
        self.counts.lock().remove(key);
    }

    pub fn get(&self, key: &str) -> u32 {
        self.counts.lock().get(key).copied().unwrap_or(0)
    }
}
