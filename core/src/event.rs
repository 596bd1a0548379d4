//! Engine events — the change-propagation port.
//!
//! RULE: Exactly one event is published per successful mutating call, and
//! the same event is appended, JSON-serialized, to the persistent event
//! log. Payloads carry identifiers only; consumers re-fetch rather than
//! trust event contents.

use crate::types::{Cents, DebtId, InstallmentSeq, PlanId};
use serde::{Deserialize, Serialize};

/// Every event the engine can broadcast.
/// Variants are added over time — never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanEvent {
    PlanCreated {
        plan_id: PlanId,
    },
    DebtsMigrated {
        source_plan_id: PlanId,
        target_plan_id: PlanId,
        debt_ids: Vec<DebtId>,
    },
    DebtMigrationRolledBack {
        source_plan_id: PlanId,
        target_plan_id: PlanId,
        debt_ids: Vec<DebtId>,
    },
    PlanAttached {
        portal_plan_id: PlanId,
        target_plan_ids: Vec<PlanId>,
    },
    PlanDetached {
        portal_plan_id: PlanId,
        removed_plan_ids: Vec<PlanId>,
        unlocked: bool,
    },
    SurchargeLinked {
        withholding_plan_id: PlanId,
        portal_plan_id: PlanId,
        surcharge_cents: Cents,
    },
    SurchargeUnlinked {
        withholding_plan_id: PlanId,
    },
    InstallmentPaid {
        plan_id: PlanId,
        seq: InstallmentSeq,
    },
    InstallmentUnpaid {
        plan_id: PlanId,
        seq: InstallmentSeq,
    },
    InstallmentPostponed {
        plan_id: PlanId,
        seq: InstallmentSeq,
    },
    InstallmentDeleted {
        plan_id: PlanId,
        seq: InstallmentSeq,
    },
    PlanDecayed {
        plan_id: PlanId,
    },
}

impl PlanEvent {
    /// Stable string name, used for the event_type column in event_log.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::PlanCreated { .. } => "plan_created",
            Self::DebtsMigrated { .. } => "debts_migrated",
            Self::DebtMigrationRolledBack { .. } => "debt_migration_rolled_back",
            Self::PlanAttached { .. } => "plan_attached",
            Self::PlanDetached { .. } => "plan_detached",
            Self::SurchargeLinked { .. } => "surcharge_linked",
            Self::SurchargeUnlinked { .. } => "surcharge_unlinked",
            Self::InstallmentPaid { .. } => "installment_paid",
            Self::InstallmentUnpaid { .. } => "installment_unpaid",
            Self::InstallmentPostponed { .. } => "installment_postponed",
            Self::InstallmentDeleted { .. } => "installment_deleted",
            Self::PlanDecayed { .. } => "plan_decayed",
        }
    }

    /// Plans whose cached KPIs this event invalidates.
    pub fn touched_plans(&self) -> Vec<PlanId> {
        match self {
            Self::PlanCreated { plan_id }
            | Self::SurchargeUnlinked {
                withholding_plan_id: plan_id,
            }
            | Self::InstallmentPaid { plan_id, .. }
            | Self::InstallmentUnpaid { plan_id, .. }
            | Self::InstallmentPostponed { plan_id, .. }
            | Self::InstallmentDeleted { plan_id, .. }
            | Self::PlanDecayed { plan_id } => vec![*plan_id],
            Self::DebtsMigrated {
                source_plan_id,
                target_plan_id,
                ..
            }
            | Self::DebtMigrationRolledBack {
                source_plan_id,
                target_plan_id,
                ..
            } => vec![*source_plan_id, *target_plan_id],
            Self::PlanAttached {
                portal_plan_id,
                target_plan_ids,
            } => {
                let mut ids = vec![*portal_plan_id];
                ids.extend(target_plan_ids);
                ids
            }
            Self::PlanDetached {
                portal_plan_id,
                removed_plan_ids,
                ..
            } => {
                let mut ids = vec![*portal_plan_id];
                ids.extend(removed_plan_ids);
                ids
            }
            Self::SurchargeLinked {
                withholding_plan_id,
                portal_plan_id,
                ..
            } => vec![*withholding_plan_id, *portal_plan_id],
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub event_type: String,
    pub payload: String,
    pub recorded_on: String,
}

type Subscriber = Box<dyn Fn(&PlanEvent) + Send>;

/// Typed publish/subscribe port. Subscribers are declared up front, never
/// discovered through a global namespace.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Subscriber) {
        self.subscribers.push(subscriber);
    }

    pub fn publish(&self, event: &PlanEvent) {
        for subscriber in &self.subscribers {
            subscriber(event);
        }
    }
}
