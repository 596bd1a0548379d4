//! Domain model — plans, installments, debts, and cross-plan links.
//!
//! RULE: Rows are normalized into these types at the store boundary.
//! Engine logic never branches on raw column presence; nullable columns
//! become Options, missing money becomes zero cents.

use crate::types::{Cents, DebtId, InstallmentSeq, Owner, PlanId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Withholding,
    Portal,
    AmnestyBase,
    AmnestyReadmission,
    Other,
}

impl PlanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Withholding => "withholding",
            Self::Portal => "portal",
            Self::AmnestyBase => "amnesty_base",
            Self::AmnestyReadmission => "amnesty_readmission",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "withholding" => Some(Self::Withholding),
            "portal" => Some(Self::Portal),
            "amnesty_base" => Some(Self::AmnestyBase),
            "amnesty_readmission" => Some(Self::AmnestyReadmission),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Late,
    Completed,
    Decayed,
    Interrupted,
    Extinguished,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Late => "late",
            Self::Completed => "completed",
            Self::Decayed => "decayed",
            Self::Interrupted => "interrupted",
            Self::Extinguished => "extinguished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "late" => Some(Self::Late),
            "completed" => Some(Self::Completed),
            "decayed" => Some(Self::Decayed),
            "interrupted" => Some(Self::Interrupted),
            "extinguished" => Some(Self::Extinguished),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Ordinary,
    PenaltyAdjusted,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ordinary => "ordinary",
            Self::PenaltyAdjusted => "penalty_adjusted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ordinary" => Some(Self::Ordinary),
            "penalty_adjusted" => Some(Self::PenaltyAdjusted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebtLinkStatus {
    Active,
    MigratedOut,
    MigratedIn,
}

impl DebtLinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::MigratedOut => "migrated_out",
            Self::MigratedIn => "migrated_in",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "migrated_out" => Some(Self::MigratedOut),
            "migrated_in" => Some(Self::MigratedIn),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub id: PlanId,
    pub owner: Owner,
    pub kind: PlanKind,
    pub taxpayer: Option<String>,
    pub total_cents: Cents,
    pub status: PlanStatus,
    pub interrupted_at: Option<NaiveDate>,
    pub interruption_reason: Option<String>,
    pub interrupted_by_plan_id: Option<PlanId>,
    pub decayed_at: Option<NaiveDate>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Installment {
    pub plan_id: PlanId,
    pub seq: InstallmentSeq,
    pub due_date: Option<NaiveDate>,
    pub amount_cents: Cents,
    pub paid: bool,
    /// Raw stored date. May be stale on an unpaid row; the resolver is the
    /// only place allowed to interpret it.
    pub paid_date: Option<NaiveDate>,
    pub mode: PaymentMode,
    pub penalty_cents: Cents,
    pub interest_cents: Cents,
    pub paid_total_cents: Option<Cents>,
    pub postponed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Debt {
    pub id: DebtId,
    pub number: String,
    pub amount_cents: Cents,
}

/// A debt attached to a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebtLink {
    pub plan_id: PlanId,
    pub debt_id: DebtId,
    pub status: DebtLinkStatus,
    /// Set to `migrated_in` on rows created by a debt migration.
    pub origin: Option<DebtLinkStatus>,
    pub origin_plan_id: Option<PlanId>,
    pub moved_on: Option<NaiveDate>,
    pub note: Option<String>,
}

/// PORTAL -> AMNESTY_READMISSION attachment. Multi-cardinality.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadmissionLink {
    pub link_id: String,
    pub portal_plan_id: PlanId,
    pub readmission_plan_id: PlanId,
    pub note: Option<String>,
    pub linked_on: NaiveDate,
}

/// WITHHOLDING -> PORTAL link with the amount snapshot taken at link time.
/// At most one per withholding plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SurchargeLink {
    pub link_id: String,
    pub withholding_plan_id: PlanId,
    pub portal_plan_id: PlanId,
    pub residual_cents: Cents,
    pub portal_total_cents: Cents,
    pub surcharge_cents: Cents,
    pub reason: Option<String>,
    pub linked_on: NaiveDate,
}

/// Payload for plan creation. Installments arrive separately, either
/// generated or explicit (see `schedule`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPlan {
    pub kind: PlanKind,
    pub taxpayer: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewInstallment {
    pub seq: InstallmentSeq,
    pub due_date: Option<NaiveDate>,
    pub amount_cents: Cents,
}
