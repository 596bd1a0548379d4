use super::{date_column, sql_date, PlanStore};
use crate::error::{PlanError, PlanResult};
use crate::model::{DebtLink, DebtLinkStatus, PlanKind};
use crate::types::{Cents, DebtId, PlanId};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

fn decode_debt_link(row: &Row<'_>) -> rusqlite::Result<DebtLink> {
    let status_raw: String = row.get(2)?;
    let status = DebtLinkStatus::parse(&status_raw)
        .ok_or_else(|| super::bad_column(2, format!("unknown link status '{status_raw}'")))?;
    let origin = match row.get::<_, Option<String>>(3)? {
        None => None,
        Some(raw) => Some(
            DebtLinkStatus::parse(&raw)
                .ok_or_else(|| super::bad_column(3, format!("unknown link origin '{raw}'")))?,
        ),
    };
    Ok(DebtLink {
        plan_id: row.get(0)?,
        debt_id: row.get(1)?,
        status,
        origin,
        origin_plan_id: row.get(4)?,
        moved_on: date_column(5, row.get(5)?)?,
        note: row.get(6)?,
    })
}

const LINK_COLUMNS: &str = "plan_id, debt_id, status, origin, origin_plan_id, moved_on, note";

impl PlanStore {
    // ── Debt ───────────────────────────────────────────────────

    pub fn insert_debt(&self, number: &str, amount_cents: Cents) -> PlanResult<DebtId> {
        self.conn.execute(
            "INSERT INTO debt (number, amount_cents) VALUES (?1, ?2)",
            params![number, amount_cents],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Attach a debt to a plan with an ACTIVE link. The partial unique
    /// index rejects a second active link for the same debt.
    pub fn attach_debt(&self, plan_id: PlanId, debt_id: DebtId) -> PlanResult<()> {
        self.conn.execute(
            "INSERT INTO plan_debt_link (plan_id, debt_id, status) VALUES (?1, ?2, 'active')",
            params![plan_id, debt_id],
        )?;
        Ok(())
    }

    pub fn debt_links_for_plan(&self, plan_id: PlanId) -> PlanResult<Vec<DebtLink>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LINK_COLUMNS} FROM plan_debt_link WHERE plan_id = ?1 ORDER BY debt_id"
        ))?;
        let links = stmt
            .query_map(params![plan_id], decode_debt_link)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    /// Debt ids holding an ACTIVE link under the plan, in id order.
    pub fn active_debt_ids(&self, plan_id: PlanId) -> PlanResult<Vec<DebtId>> {
        let mut stmt = self.conn.prepare(
            "SELECT debt_id FROM plan_debt_link
             WHERE plan_id = ?1 AND status = 'active' ORDER BY debt_id",
        )?;
        let ids = stmt
            .query_map(params![plan_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// The plan's own record of debts migrated out of it. Rollback derives
    /// its working set from this, never from caller-supplied state alone.
    pub fn migrated_out_debt_ids(&self, plan_id: PlanId) -> PlanResult<Vec<DebtId>> {
        let mut stmt = self.conn.prepare(
            "SELECT debt_id FROM plan_debt_link
             WHERE plan_id = ?1 AND status = 'migrated_out' ORDER BY debt_id",
        )?;
        let ids = stmt
            .query_map(params![plan_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    // ── Debt migration (atomic) ────────────────────────────────

    /// Move the selected debts from a portal plan to a readmission plan.
    /// All-or-nothing: every selected link flips ACTIVE -> MIGRATED_OUT
    /// under the source and a new ACTIVE link (recorded as migrated-in)
    /// appears under the target, or nothing changes at all.
    pub fn migrate_debts(
        &self,
        caller: &str,
        source_plan_id: PlanId,
        debt_ids: &[DebtId],
        target_plan_id: PlanId,
        note: Option<&str>,
        today: NaiveDate,
    ) -> PlanResult<Vec<DebtId>> {
        let tx = self.conn.unchecked_transaction()?;

        let source = self.plan_owned(caller, source_plan_id)?;
        let target = self.plan_owned(caller, target_plan_id)?;
        if source.kind != PlanKind::Portal {
            return Err(PlanError::Conflict(
                "debts can only be migrated out of a portal plan".into(),
            ));
        }
        if target.kind != PlanKind::AmnestyReadmission {
            return Err(PlanError::Conflict(
                "migration target must be a readmission plan".into(),
            ));
        }

        let active = self.active_debt_ids(source_plan_id)?;
        if !debt_ids.iter().any(|id| active.contains(id)) {
            return Err(PlanError::NotFound {
                what: "active debt link",
                id: source_plan_id,
            });
        }
        if let Some(stranger) = debt_ids.iter().find(|id| !active.contains(id)) {
            return Err(PlanError::Conflict(format!(
                "debt {stranger} holds no active link under plan {source_plan_id}"
            )));
        }

        let moved_on = sql_date(today);
        for debt_id in debt_ids {
            tx.execute(
                "UPDATE plan_debt_link SET status = 'migrated_out', moved_on = ?1
                 WHERE plan_id = ?2 AND debt_id = ?3",
                params![moved_on, source_plan_id, debt_id],
            )?;
            tx.execute(
                "INSERT INTO plan_debt_link
                     (plan_id, debt_id, status, origin, origin_plan_id, moved_on, note)
                 VALUES (?1, ?2, 'active', 'migrated_in', ?3, ?4, ?5)",
                params![target_plan_id, debt_id, source_plan_id, moved_on, note],
            )?;
        }

        tx.commit()?;
        Ok(debt_ids.to_vec())
    }

    /// Reverse a debt migration. The working set is re-derived from the
    /// source plan's MIGRATED_OUT rows and only narrowed by the caller's
    /// ids, which makes a retried rollback a no-op instead of an error.
    /// Returns the restored (debt, target-plan) pairs.
    pub fn rollback_debt_migration(
        &self,
        caller: &str,
        source_plan_id: PlanId,
        debt_ids: &[DebtId],
    ) -> PlanResult<Vec<(DebtId, PlanId)>> {
        let tx = self.conn.unchecked_transaction()?;

        self.plan_owned(caller, source_plan_id)?;

        let recorded = self.migrated_out_debt_ids(source_plan_id)?;
        let working: Vec<DebtId> = recorded
            .into_iter()
            .filter(|id| debt_ids.contains(id))
            .collect();

        let mut restored = Vec::with_capacity(working.len());
        for debt_id in working {
            let target: Option<PlanId> = tx
                .query_row(
                    "SELECT plan_id FROM plan_debt_link
                     WHERE debt_id = ?1 AND status = 'active'
                       AND origin = 'migrated_in' AND origin_plan_id = ?2",
                    params![debt_id, source_plan_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(target_plan_id) = target else {
                // Source says migrated-out but the target row is gone;
                // treat as already rolled back.
                continue;
            };
            tx.execute(
                "DELETE FROM plan_debt_link WHERE plan_id = ?1 AND debt_id = ?2",
                params![target_plan_id, debt_id],
            )?;
            tx.execute(
                "UPDATE plan_debt_link SET status = 'active', moved_on = NULL
                 WHERE plan_id = ?1 AND debt_id = ?2",
                params![source_plan_id, debt_id],
            )?;
            restored.push((debt_id, target_plan_id));
        }

        tx.commit()?;
        Ok(restored)
    }
}
