use super::{date_column, sql_date, PlanStore};
use crate::error::{PlanError, PlanResult};
use crate::model::{Installment, PaymentMode};
use crate::types::{Cents, InstallmentSeq, PlanId};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

fn decode_installment(row: &Row<'_>) -> rusqlite::Result<Installment> {
    let mode_raw: String = row.get(6)?;
    let mode = PaymentMode::parse(&mode_raw)
        .ok_or_else(|| super::bad_column(6, format!("unknown payment mode '{mode_raw}'")))?;
    Ok(Installment {
        plan_id: row.get(0)?,
        seq: row.get(1)?,
        due_date: date_column(2, row.get(2)?)?,
        amount_cents: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
        paid: row.get::<_, i64>(4)? != 0,
        paid_date: date_column(5, row.get(5)?)?,
        mode,
        penalty_cents: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
        interest_cents: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
        paid_total_cents: row.get(9)?,
        postponed: row.get::<_, i64>(10)? != 0,
    })
}

const INSTALLMENT_COLUMNS: &str = "plan_id, seq, due_date, amount_cents, paid, paid_date, \
     payment_mode, penalty_cents, interest_cents, paid_total_cents, postponed";

impl PlanStore {
    // ── Installment ────────────────────────────────────────────

    pub fn installments_for_plan(&self, plan_id: PlanId) -> PlanResult<Vec<Installment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INSTALLMENT_COLUMNS} FROM installment WHERE plan_id = ?1 ORDER BY seq"
        ))?;
        let rows = stmt
            .query_map(params![plan_id], decode_installment)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_installment(&self, plan_id: PlanId, seq: InstallmentSeq) -> PlanResult<Installment> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {INSTALLMENT_COLUMNS} FROM installment
                     WHERE plan_id = ?1 AND seq = ?2"
                ),
                params![plan_id, seq],
                decode_installment,
            )
            .optional()?;
        row.ok_or(PlanError::NotFound {
            what: "installment",
            id: seq,
        })
    }

    pub fn mark_installment_paid(
        &self,
        caller: &str,
        plan_id: PlanId,
        seq: InstallmentSeq,
        paid_date: NaiveDate,
        mode: PaymentMode,
        penalty_cents: Cents,
        interest_cents: Cents,
    ) -> PlanResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.plan_owned(caller, plan_id)?;
        let installment = self.get_installment(plan_id, seq)?;
        if installment.paid {
            return Err(PlanError::Conflict(format!(
                "installment {seq} is already paid"
            )));
        }
        let paid_total = installment.amount_cents + penalty_cents + interest_cents;
        tx.execute(
            "UPDATE installment
             SET paid = 1, paid_date = ?1, payment_mode = ?2,
                 penalty_cents = ?3, interest_cents = ?4, paid_total_cents = ?5
             WHERE plan_id = ?6 AND seq = ?7",
            params![
                sql_date(paid_date),
                mode.as_str(),
                penalty_cents,
                interest_cents,
                paid_total,
                plan_id,
                seq,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn unmark_installment_paid(
        &self,
        caller: &str,
        plan_id: PlanId,
        seq: InstallmentSeq,
    ) -> PlanResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.plan_owned(caller, plan_id)?;
        let installment = self.get_installment(plan_id, seq)?;
        if !installment.paid {
            return Err(PlanError::Conflict(format!("installment {seq} is not paid")));
        }
        tx.execute(
            "UPDATE installment
             SET paid = 0, paid_date = NULL, payment_mode = 'ordinary',
                 penalty_cents = 0, interest_cents = 0, paid_total_cents = NULL
             WHERE plan_id = ?1 AND seq = ?2",
            params![plan_id, seq],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn postpone_installment(
        &self,
        caller: &str,
        plan_id: PlanId,
        seq: InstallmentSeq,
        new_due: Option<NaiveDate>,
    ) -> PlanResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.plan_owned(caller, plan_id)?;
        let installment = self.get_installment(plan_id, seq)?;
        if installment.paid {
            return Err(PlanError::Conflict(format!(
                "installment {seq} is paid and cannot be postponed"
            )));
        }
        match new_due {
            Some(due) => tx.execute(
                "UPDATE installment SET postponed = 1, due_date = ?1
                 WHERE plan_id = ?2 AND seq = ?3",
                params![sql_date(due), plan_id, seq],
            )?,
            None => tx.execute(
                "UPDATE installment SET postponed = 1 WHERE plan_id = ?1 AND seq = ?2",
                params![plan_id, seq],
            )?,
        };
        tx.commit()?;
        Ok(())
    }

    /// Delete an unpaid installment and shrink the plan total accordingly.
    pub fn delete_installment(
        &self,
        caller: &str,
        plan_id: PlanId,
        seq: InstallmentSeq,
    ) -> PlanResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.plan_owned(caller, plan_id)?;
        let installment = self.get_installment(plan_id, seq)?;
        if installment.paid {
            return Err(PlanError::Conflict(format!(
                "installment {seq} is paid and cannot be deleted"
            )));
        }
        tx.execute(
            "DELETE FROM installment WHERE plan_id = ?1 AND seq = ?2",
            params![plan_id, seq],
        )?;
        tx.execute(
            "UPDATE plan SET total_cents = total_cents - ?1 WHERE plan_id = ?2",
            params![installment.amount_cents, plan_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}
