//! Skip/decay risk for payment-portal plans.
//!
//! A portal plan tolerates a fixed number of overdue installments (the
//! "skip budget") before it is considered at risk of decay. The figure is
//! recomputed from scratch on every call — no incremental counters, so a
//! reading can never drift from the underlying rows.

use crate::model::{Installment, PlanStatus};
use crate::resolver::{self, InstallmentState};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Contractual default skip budget for portal plans.
pub const DEFAULT_MAX_SKIPS: u32 = 8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkipRisk {
    pub unpaid_overdue_today: u32,
    pub skip_remaining: u32,
    pub max_skips: u32,
    /// True exactly when the budget is exhausted. A plan with zero
    /// remaining skips is already at risk, not merely close to it.
    pub at_risk: bool,
}

impl SkipRisk {
    pub fn compute(
        installments: &[Installment],
        plan_status: PlanStatus,
        today: NaiveDate,
        max_skips: u32,
    ) -> Self {
        let unpaid_overdue_today = installments
            .iter()
            .filter(|i| resolver::resolve(i, plan_status, today).state == InstallmentState::Overdue)
            .count() as u32;

        let skip_remaining = max_skips.saturating_sub(unpaid_overdue_today);

        Self {
            unpaid_overdue_today,
            skip_remaining,
            max_skips,
            at_risk: skip_remaining == 0,
        }
    }
}
