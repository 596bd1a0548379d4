//! Engine configuration knobs.
//!
//! Only the tunable policy values live here. Contractual thresholds (the
//! 20-day risk window, the 90-day pre-decadence rule) are constants in
//! their own modules — they are regulation, not configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Skip budget for portal plans.
    pub max_skips: u32,
    /// KPI cache time-to-live, in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_skips: crate::skip_risk::DEFAULT_MAX_SKIPS,
            cache_ttl_secs: crate::cache::DEFAULT_TTL.as_secs(),
        }
    }
}

impl EngineConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
