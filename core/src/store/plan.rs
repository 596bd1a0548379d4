use super::{date_column, sql_date, PlanStore};
use crate::error::{PlanError, PlanResult};
use crate::model::{NewInstallment, NewPlan, Plan, PlanKind, PlanStatus};
use crate::types::PlanId;
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

fn decode_plan(row: &Row<'_>) -> rusqlite::Result<Plan> {
    let kind_raw: String = row.get(2)?;
    let kind = PlanKind::parse(&kind_raw)
        .ok_or_else(|| super::bad_column(2, format!("unknown plan kind '{kind_raw}'")))?;
    let status_raw: String = row.get(5)?;
    let status = PlanStatus::parse(&status_raw)
        .ok_or_else(|| super::bad_column(5, format!("unknown plan status '{status_raw}'")))?;
    Ok(Plan {
        id: row.get(0)?,
        owner: row.get(1)?,
        kind,
        taxpayer: row.get(3)?,
        total_cents: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
        status,
        interrupted_at: date_column(6, row.get(6)?)?,
        interruption_reason: row.get(7)?,
        interrupted_by_plan_id: row.get(8)?,
        decayed_at: date_column(9, row.get(9)?)?,
        note: row.get(10)?,
    })
}

const PLAN_COLUMNS: &str = "plan_id, owner, kind, taxpayer, total_cents, status, \
     interrupted_at, interruption_reason, interrupted_by_plan_id, decayed_at, note";

impl PlanStore {
    // ── Plan ───────────────────────────────────────────────────

    /// Create a plan together with its installment rows, atomically.
    pub fn create_plan(
        &self,
        owner: &str,
        new: &NewPlan,
        installments: &[NewInstallment],
    ) -> PlanResult<PlanId> {
        let tx = self.conn.unchecked_transaction()?;
        let total: i64 = installments.iter().map(|r| r.amount_cents).sum();
        tx.execute(
            "INSERT INTO plan (owner, kind, taxpayer, total_cents, status, note)
             VALUES (?1, ?2, ?3, ?4, 'active', ?5)",
            params![owner, new.kind.as_str(), new.taxpayer, total, new.note],
        )?;
        let plan_id = tx.last_insert_rowid();
        for row in installments {
            tx.execute(
                "INSERT INTO installment (plan_id, seq, due_date, amount_cents)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    plan_id,
                    row.seq,
                    row.due_date.map(sql_date),
                    row.amount_cents,
                ],
            )?;
        }
        tx.commit()?;
        Ok(plan_id)
    }

    pub fn get_plan(&self, plan_id: PlanId) -> PlanResult<Plan> {
        let plan = self
            .conn
            .query_row(
                &format!("SELECT {PLAN_COLUMNS} FROM plan WHERE plan_id = ?1"),
                params![plan_id],
                decode_plan,
            )
            .optional()?;
        plan.ok_or(PlanError::NotFound {
            what: "plan",
            id: plan_id,
        })
    }

    /// Fetch a plan and verify the caller owns it.
    pub fn plan_owned(&self, caller: &str, plan_id: PlanId) -> PlanResult<Plan> {
        let plan = self.get_plan(plan_id)?;
        if plan.owner != caller {
            return Err(PlanError::AccessDenied { plan_id });
        }
        Ok(plan)
    }

    pub fn plans_for_owner(&self, owner: &str) -> PlanResult<Vec<Plan>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLAN_COLUMNS} FROM plan WHERE owner = ?1 ORDER BY plan_id"
        ))?;
        let plans = stmt
            .query_map(params![owner], decode_plan)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(plans)
    }

    /// Confirm decay on a withholding plan. Eligibility (the 90-day rule)
    /// is the orchestrator's job; the store re-checks only the lifecycle
    /// state inside the transaction.
    pub fn set_plan_decayed(
        &self,
        caller: &str,
        plan_id: PlanId,
        today: NaiveDate,
    ) -> PlanResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let plan = self.plan_owned(caller, plan_id)?;
        if plan.status == PlanStatus::Decayed {
            return Err(PlanError::Conflict("plan is already decayed".into()));
        }
        tx.execute(
            "UPDATE plan SET status = 'decayed', decayed_at = ?1 WHERE plan_id = ?2",
            params![sql_date(today), plan_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn update_plan_note(&self, caller: &str, plan_id: PlanId, note: Option<&str>) -> PlanResult<()> {
        self.plan_owned(caller, plan_id)?;
        self.conn.execute(
            "UPDATE plan SET note = ?1 WHERE plan_id = ?2",
            params![note, plan_id],
        )?;
        Ok(())
    }
}
