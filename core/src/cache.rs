//! Read-through KPI cache and read/cancellation coordination.
//!
//! The cache is an optimization, never the source of truth. Three triggers
//! invalidate an entry, whichever fires first: a successful mutation, an
//! external change notification, or TTL expiry. No caller invalidates ad
//! hoc — everything funnels through the engine.

use crate::kpi::PlanKpi;
use crate::types::{Owner, PlanId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default time-to-live for cached KPI rows: five minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct CacheEntry {
    kpi: PlanKpi,
    inserted_at: Instant,
}

/// TTL cache keyed by (caller identity, plan).
pub struct KpiCache {
    ttl: Duration,
    entries: HashMap<(Owner, PlanId), CacheEntry>,
}

impl KpiCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Fresh entry for the caller, or None on miss/expiry.
    /// Expired entries are evicted on the way out.
    pub fn get(&mut self, owner: &str, plan_id: PlanId) -> Option<&PlanKpi> {
        let key = (owner.to_string(), plan_id);
        let expired = self
            .entries
            .get(&key)
            .is_some_and(|e| e.inserted_at.elapsed() >= self.ttl);
        if expired {
            self.entries.remove(&key);
            return None;
        }
        self.entries.get(&key).map(|e| &e.kpi)
    }

    pub fn insert(&mut self, owner: &str, plan_id: PlanId, kpi: PlanKpi) {
        self.entries.insert(
            (owner.to_string(), plan_id),
            CacheEntry {
                kpi,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop every caller's entry for one plan. Mutations and external
    /// change notifications land here.
    pub fn invalidate_plan(&mut self, plan_id: PlanId) {
        self.entries.retain(|(_, cached_plan), _| *cached_plan != plan_id);
    }

    /// Drop everything one caller can see.
    pub fn invalidate_owner(&mut self, owner: &str) {
        self.entries.retain(|(cached_owner, _), _| cached_owner != owner);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Monotonic per-plan read tickets. A KPI read that completes after a newer
/// read was issued for the same plan is stale and must be discarded
/// silently; no error surfaces for a superseded read.
#[derive(Default)]
pub struct ReadTickets {
    latest: HashMap<PlanId, u64>,
    next: u64,
}

impl ReadTickets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a ticket for a plan read, superseding any outstanding one.
    pub fn issue(&mut self, plan_id: PlanId) -> u64 {
        self.next += 1;
        self.latest.insert(plan_id, self.next);
        self.next
    }

    /// True when the ticket is still the latest issued for its plan.
    pub fn is_latest(&self, plan_id: PlanId, ticket: u64) -> bool {
        self.latest.get(&plan_id) == Some(&ticket)
    }
}

/// Caller-supplied cancellation token for network-bound operations.
/// A cancelled call discards its result rather than applying it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
