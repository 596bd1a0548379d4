//! Installment schedule generation.
//!
//! A plan's installments are created together with the plan, either
//! auto-generated from a (frequency, count, amount) triple or supplied as
//! an explicit list. Validation happens here, before any store call.

use crate::error::{PlanError, PlanResult};
use crate::model::NewInstallment;
use crate::types::Cents;
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Monthly,
    Bimonthly,
    Quarterly,
}

impl Frequency {
    fn months(&self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Bimonthly => 2,
            Self::Quarterly => 3,
        }
    }
}

/// How the installments of a new plan come into existence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScheduleSpec {
    Generated {
        first_due: NaiveDate,
        count: u32,
        amount_cents: Cents,
        frequency: Frequency,
    },
    Explicit {
        installments: Vec<NewInstallment>,
    },
}

impl ScheduleSpec {
    /// Expand into concrete installment rows, seq starting at 1.
    pub fn expand(&self) -> PlanResult<Vec<NewInstallment>> {
        match self {
            Self::Generated {
                first_due,
                count,
                amount_cents,
                frequency,
            } => {
                if *count == 0 {
                    return Err(PlanError::Validation(
                        "installment count must be positive".into(),
                    ));
                }
                if *amount_cents <= 0 {
                    return Err(PlanError::Validation(
                        "installment amount must be positive".into(),
                    ));
                }
                let step = frequency.months();
                let mut rows = Vec::with_capacity(*count as usize);
                for n in 0..*count {
                    let due = first_due
                        .checked_add_months(Months::new(n * step))
                        .ok_or_else(|| {
                            PlanError::Validation(format!(
                                "due date overflow at installment {}",
                                n + 1
                            ))
                        })?;
                    rows.push(NewInstallment {
                        seq: (n + 1) as i64,
                        due_date: Some(due),
                        amount_cents: *amount_cents,
                    });
                }
                Ok(rows)
            }
            Self::Explicit { installments } => {
                if installments.is_empty() {
                    return Err(PlanError::Validation(
                        "explicit installment list must not be empty".into(),
                    ));
                }
                for row in installments {
                    if row.seq <= 0 {
                        return Err(PlanError::Validation(format!(
                            "installment seq {} must be positive",
                            row.seq
                        )));
                    }
                    if row.amount_cents < 0 {
                        return Err(PlanError::Validation(format!(
                            "installment {} has a negative amount",
                            row.seq
                        )));
                    }
                }
                let mut seen = std::collections::HashSet::new();
                for row in installments {
                    if !seen.insert(row.seq) {
                        return Err(PlanError::Validation(format!(
                            "duplicate installment seq {}",
                            row.seq
                        )));
                    }
                }
                Ok(installments.clone())
            }
        }
    }

    /// Face total of the expanded schedule.
    pub fn total_cents(rows: &[NewInstallment]) -> Cents {
        rows.iter().map(|r| r.amount_cents).sum()
    }
}
