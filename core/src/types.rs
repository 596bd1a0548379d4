//! Shared primitive types used across the entire engine.

/// Database identifier of a plan (rateation).
pub type PlanId = i64;

/// Database identifier of a debt (one tax-roll entry).
pub type DebtId = i64;

/// Installment sequence number, unique within its plan.
pub type InstallmentSeq = i64;

/// Monetary amount in minor currency units (euro cents).
/// Conversion to display currency happens at the presentation edge only.
pub type Cents = i64;

/// Authenticated caller identity. Keys the KPI cache and access checks.
pub type Owner = String;
