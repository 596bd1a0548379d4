//! KPI aggregation — per-plan totals and portfolio grand totals.
//!
//! RULE: Aggregation never mutates its inputs and never fails. Missing
//! numeric facts count as zero; a dashboard must stay renderable.

use crate::model::{Installment, Plan, PlanKind, PlanStatus};
use crate::recovery_window::RecoveryWindow;
use crate::resolver::{self, InstallmentState};
use crate::skip_risk::SkipRisk;
use crate::types::{Cents, PlanId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Kind-specific risk figures carried alongside the money totals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "risk", rename_all = "snake_case")]
pub enum PlanRisk {
    Portal(SkipRisk),
    Withholding(RecoveryWindow),
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanKpi {
    pub plan_id: PlanId,
    pub kind: PlanKind,
    pub status: PlanStatus,
    pub total_due_cents: Cents,
    pub total_paid_cents: Cents,
    pub total_overdue_cents: Cents,
    pub residual_cents: Cents,
    pub installment_count: u32,
    pub paid_count: u32,
    pub unpaid_count: u32,
    pub overdue_count: u32,
    pub risk: PlanRisk,
}

impl PlanKpi {
    /// Fold one plan's installments into its KPI row.
    pub fn aggregate(
        plan: &Plan,
        installments: &[Installment],
        today: NaiveDate,
        max_skips: u32,
    ) -> Self {
        let mut total_due_cents: Cents = 0;
        let mut total_paid_cents: Cents = 0;
        let mut total_overdue_cents: Cents = 0;
        let mut paid_count: u32 = 0;
        let mut overdue_count: u32 = 0;

        for installment in installments {
            let resolved = resolver::resolve(installment, plan.status, today);
            total_due_cents += installment.amount_cents;
            if resolved.is_paid {
                total_paid_cents += installment.amount_cents;
                paid_count += 1;
            }
            if resolved.state == InstallmentState::Overdue {
                total_overdue_cents += installment.amount_cents;
                overdue_count += 1;
            }
        }

        let installment_count = installments.len() as u32;
        let risk = match plan.kind {
            PlanKind::Portal => PlanRisk::Portal(SkipRisk::compute(
                installments,
                plan.status,
                today,
                max_skips,
            )),
            PlanKind::Withholding => PlanRisk::Withholding(RecoveryWindow::compute(
                installments,
                plan.status,
                today,
            )),
            _ => PlanRisk::None,
        };

        Self {
            plan_id: plan.id,
            kind: plan.kind,
            status: plan.status,
            total_due_cents,
            total_paid_cents,
            total_overdue_cents,
            residual_cents: total_due_cents - total_paid_cents,
            installment_count,
            paid_count,
            unpaid_count: installment_count - paid_count,
            overdue_count,
            risk,
        }
    }

    /// Zeroed KPI row for degraded read paths.
    pub fn empty(plan_id: PlanId, kind: PlanKind, status: PlanStatus) -> Self {
        Self {
            plan_id,
            kind,
            status,
            total_due_cents: 0,
            total_paid_cents: 0,
            total_overdue_cents: 0,
            residual_cents: 0,
            installment_count: 0,
            paid_count: 0,
            unpaid_count: 0,
            overdue_count: 0,
            risk: PlanRisk::None,
        }
    }
}

/// Grand totals across a portfolio of plans.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortfolioKpi {
    pub plan_count: u32,
    pub total_due_cents: Cents,
    pub total_paid_cents: Cents,
    pub total_overdue_cents: Cents,
    pub residual_cents: Cents,
    pub overdue_installments: u32,
}

/// Per-column sums over the visible plans. Decayed plans are excluded from
/// the active aggregation; a single-plan portfolio needs no totals row and
/// yields None.
pub fn portfolio_totals(kpis: &[PlanKpi]) -> Option<PortfolioKpi> {
    if kpis.len() < 2 {
        return None;
    }

    let mut totals = PortfolioKpi {
        plan_count: 0,
        total_due_cents: 0,
        total_paid_cents: 0,
        total_overdue_cents: 0,
        residual_cents: 0,
        overdue_installments: 0,
    };

    for kpi in kpis.iter().filter(|k| k.status != PlanStatus::Decayed) {
        totals.plan_count += 1;
        totals.total_due_cents += kpi.total_due_cents;
        totals.total_paid_cents += kpi.total_paid_cents;
        totals.total_overdue_cents += kpi.total_overdue_cents;
        totals.residual_cents += kpi.residual_cents;
        totals.overdue_installments += kpi.overdue_count;
    }

    Some(totals)
}
