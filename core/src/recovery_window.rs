//! Recovery window for withholding plans.
//!
//! Measures how much runway remains before the next unpaid installment
//! falls due, and whether the unpaid run has aged past the 90-day
//! pre-decadence threshold. The decay transition itself is an explicit
//! orchestrator operation, never implied by this calculation.

use crate::model::{Installment, PlanStatus};
use crate::resolver;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Days of runway at or under which a withholding plan is at risk.
pub const AT_RISK_WINDOW_DAYS: i64 = 20;

/// Overdue age beyond which decay confirmation becomes eligible.
pub const PRE_DECAY_DAYS: i64 = 90;

/// Display banding for the remaining window. Not stored anywhere.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Safe,
    Caution,
    Critical,
    DueNow,
}

impl RiskBand {
    pub fn for_days(days_remaining: i64) -> Self {
        match days_remaining {
            0 => Self::DueNow,
            d if d > 30 => Self::Safe,
            d if d >= 15 => Self::Caution,
            _ => Self::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecoveryWindow {
    pub overdue_count: u32,
    pub unpaid_future_count: u32,
    pub next_due_date: Option<NaiveDate>,
    /// None means no unpaid installment lies in the future (infinite
    /// runway); the plan cannot be at risk through this calculator.
    pub days_remaining: Option<i64>,
    pub at_risk: bool,
    pub band: Option<RiskBand>,
    /// True when the oldest unpaid installment is more than 90 days past
    /// due. Gates the explicit decay-confirmation operation.
    pub pre_decay_eligible: bool,
}

impl RecoveryWindow {
    pub fn compute(
        installments: &[Installment],
        plan_status: PlanStatus,
        today: NaiveDate,
    ) -> Self {
        // Unpaid rows partition on the due date; rows without one can be
        // compared to nothing and join neither side.
        let unpaid: Vec<&Installment> = installments.iter().filter(|i| !i.paid).collect();

        let overdue_count = unpaid
            .iter()
            .filter(|i| i.due_date.is_some_and(|due| due < today))
            .count() as u32;

        let next_due_date = unpaid
            .iter()
            .filter_map(|i| i.due_date)
            .filter(|due| *due >= today)
            .min();

        let unpaid_future_count = unpaid
            .iter()
            .filter(|i| i.due_date.is_some_and(|due| due >= today))
            .count() as u32;

        let days_remaining = next_due_date.map(|due| (due - today).num_days().max(0));

        let (at_risk, band) = match days_remaining {
            Some(days) => (days <= AT_RISK_WINDOW_DAYS, Some(RiskBand::for_days(days))),
            None => (false, None),
        };

        let max_days_overdue = installments
            .iter()
            .filter(|i| !i.paid)
            .map(|i| resolver::resolve(i, plan_status, today).days_overdue)
            .max()
            .unwrap_or(0);

        Self {
            overdue_count,
            unpaid_future_count,
            next_due_date,
            days_remaining,
            at_risk,
            band,
            pre_decay_eligible: max_days_overdue > PRE_DECAY_DAYS,
        }
    }
}
