use super::{date_column, sql_date, PlanStore};
use crate::error::{PlanError, PlanResult};
use crate::migration::{DetachOutcome, LinkAction, SurchargeOutcome, SurchargePreview};
use crate::model::{PlanKind, PlanStatus, ReadmissionLink, SurchargeLink};
use crate::types::{Cents, PlanId};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

fn decode_readmission_link(row: &Row<'_>) -> rusqlite::Result<ReadmissionLink> {
    Ok(ReadmissionLink {
        link_id: row.get(0)?,
        portal_plan_id: row.get(1)?,
        readmission_plan_id: row.get(2)?,
        note: row.get(3)?,
        linked_on: date_column(4, row.get(4)?)?.unwrap_or_default(),
    })
}

fn decode_surcharge_link(row: &Row<'_>) -> rusqlite::Result<SurchargeLink> {
    Ok(SurchargeLink {
        link_id: row.get(0)?,
        withholding_plan_id: row.get(1)?,
        portal_plan_id: row.get(2)?,
        residual_cents: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
        portal_total_cents: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
        surcharge_cents: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
        reason: row.get(6)?,
        linked_on: date_column(7, row.get(7)?)?.unwrap_or_default(),
    })
}

impl PlanStore {
    // ── Full-plan reattachment (atomic) ────────────────────────

    /// Interrupt a portal plan and link it to one or more readmission
    /// plans. Interruption metadata is written once, on the transition
    /// into INTERRUPTED; adding further targets later leaves it alone.
    pub fn attach_plan_to_targets(
        &self,
        caller: &str,
        portal_plan_id: PlanId,
        target_plan_ids: &[PlanId],
        note: Option<&str>,
        today: NaiveDate,
    ) -> PlanResult<Vec<ReadmissionLink>> {
        if target_plan_ids.is_empty() {
            return Err(PlanError::Validation(
                "at least one target plan id is required".into(),
            ));
        }
        let tx = self.conn.unchecked_transaction()?;

        let portal = self.plan_owned(caller, portal_plan_id)?;
        if portal.kind != PlanKind::Portal {
            return Err(PlanError::Conflict(
                "only a portal plan can be reattached to readmission plans".into(),
            ));
        }

        for &target_id in target_plan_ids {
            let target = self.plan_owned(caller, target_id)?;
            if target.kind != PlanKind::AmnestyReadmission {
                return Err(PlanError::Conflict(format!(
                    "attachment target {target_id} is not a readmission plan"
                )));
            }
            let exists: Option<String> = tx
                .query_row(
                    "SELECT link_id FROM readmission_link
                     WHERE portal_plan_id = ?1 AND readmission_plan_id = ?2",
                    params![portal_plan_id, target_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(PlanError::Conflict(format!(
                    "plan {portal_plan_id} is already attached to {target_id}"
                )));
            }
        }

        if portal.status != PlanStatus::Interrupted {
            tx.execute(
                "UPDATE plan SET status = 'interrupted', interrupted_at = ?1,
                        interruption_reason = ?2, interrupted_by_plan_id = ?3
                 WHERE plan_id = ?4",
                params![sql_date(today), note, target_plan_ids[0], portal_plan_id],
            )?;
        }

        let mut links = Vec::with_capacity(target_plan_ids.len());
        for &target_id in target_plan_ids {
            let link = ReadmissionLink {
                link_id: Uuid::new_v4().to_string(),
                portal_plan_id,
                readmission_plan_id: target_id,
                note: note.map(String::from),
                linked_on: today,
            };
            tx.execute(
                "INSERT INTO readmission_link
                     (link_id, portal_plan_id, readmission_plan_id, note, linked_on)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    link.link_id,
                    link.portal_plan_id,
                    link.readmission_plan_id,
                    link.note,
                    sql_date(link.linked_on),
                ],
            )?;
            links.push(link);
        }

        tx.commit()?;
        Ok(links)
    }

    /// Remove a subset of a portal plan's readmission links (all of them
    /// when no subset is given). The decision to reactivate the plan uses
    /// the link count measured AFTER removal: a partial unlink leaves the
    /// plan interrupted, removing the last link reverts it to ACTIVE and
    /// clears the interruption metadata.
    pub fn detach_plan_links(
        &self,
        caller: &str,
        portal_plan_id: PlanId,
        target_plan_ids: Option<&[PlanId]>,
    ) -> PlanResult<DetachOutcome> {
        let tx = self.conn.unchecked_transaction()?;

        self.plan_owned(caller, portal_plan_id)?;

        let linked = self.readmission_links_for_plan(portal_plan_id)?;
        let removed: Vec<PlanId> = match target_plan_ids {
            Some(subset) => linked
                .iter()
                .map(|l| l.readmission_plan_id)
                .filter(|id| subset.contains(id))
                .collect(),
            None => linked.iter().map(|l| l.readmission_plan_id).collect(),
        };
        if removed.is_empty() {
            return Err(PlanError::NotFound {
                what: "readmission link",
                id: portal_plan_id,
            });
        }

        for target_id in &removed {
            tx.execute(
                "DELETE FROM readmission_link
                 WHERE portal_plan_id = ?1 AND readmission_plan_id = ?2",
                params![portal_plan_id, target_id],
            )?;
        }

        let remaining: i64 = tx.query_row(
            "SELECT COUNT(*) FROM readmission_link WHERE portal_plan_id = ?1",
            params![portal_plan_id],
            |row| row.get(0),
        )?;
        let unlocked = remaining == 0;
        if unlocked {
            tx.execute(
                "UPDATE plan SET status = 'active', interrupted_at = NULL,
                        interruption_reason = NULL, interrupted_by_plan_id = NULL
                 WHERE plan_id = ?1",
                params![portal_plan_id],
            )?;
        }

        tx.commit()?;
        Ok(DetachOutcome { removed, unlocked })
    }

    pub fn readmission_links_for_plan(&self, portal_plan_id: PlanId) -> PlanResult<Vec<ReadmissionLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT link_id, portal_plan_id, readmission_plan_id, note, linked_on
             FROM readmission_link WHERE portal_plan_id = ?1
             ORDER BY readmission_plan_id",
        )?;
        let links = stmt
            .query_map(params![portal_plan_id], decode_readmission_link)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    // ── Surcharge link (atomic, single-cardinality) ────────────

    /// Link a decayed/interrupted withholding plan to a portal plan,
    /// snapshotting the amounts and surcharge at link time. Re-linking to
    /// a different portal plan replaces the previous link; exactly one
    /// active link ever exists per withholding plan.
    pub fn link_with_surcharge(
        &self,
        caller: &str,
        withholding_plan_id: PlanId,
        portal_plan_id: PlanId,
        reason: Option<&str>,
        today: NaiveDate,
    ) -> PlanResult<SurchargeOutcome> {
        let tx = self.conn.unchecked_transaction()?;

        let withholding = self.plan_owned(caller, withholding_plan_id)?;
        let portal = self.plan_owned(caller, portal_plan_id)?;
        if withholding.kind != PlanKind::Withholding {
            return Err(PlanError::Conflict(
                "surcharge links start from a withholding plan".into(),
            ));
        }
        if portal.kind != PlanKind::Portal {
            return Err(PlanError::Conflict(
                "surcharge link target must be a portal plan".into(),
            ));
        }
        if !matches!(
            withholding.status,
            PlanStatus::Decayed | PlanStatus::Interrupted
        ) {
            return Err(PlanError::Conflict(
                "withholding plan must be decayed or interrupted before linking".into(),
            ));
        }

        let residual = self.plan_residual_cents(withholding_plan_id)?;
        let portal_total = portal.total_cents;
        let surcharge = (portal_total - residual).max(0);

        let existing: Option<String> = tx
            .query_row(
                "SELECT link_id FROM surcharge_link WHERE withholding_plan_id = ?1",
                params![withholding_plan_id],
                |row| row.get(0),
            )
            .optional()?;
        let action = if let Some(old_link) = existing {
            tx.execute(
                "DELETE FROM surcharge_link WHERE link_id = ?1",
                params![old_link],
            )?;
            LinkAction::Updated
        } else {
            LinkAction::Created
        };

        let link_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO surcharge_link
                 (link_id, withholding_plan_id, portal_plan_id,
                  residual_cents, portal_total_cents, surcharge_cents, reason, linked_on)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                link_id,
                withholding_plan_id,
                portal_plan_id,
                residual,
                portal_total,
                surcharge,
                reason,
                sql_date(today),
            ],
        )?;

        tx.commit()?;
        Ok(SurchargeOutcome {
            link_id,
            surcharge_cents: surcharge,
            action,
        })
    }

    /// Delete the surcharge link and restore the withholding plan to its
    /// active state.
    pub fn unlink_surcharge(
        &self,
        caller: &str,
        withholding_plan_id: PlanId,
    ) -> PlanResult<bool> {
        let tx = self.conn.unchecked_transaction()?;

        self.plan_owned(caller, withholding_plan_id)?;

        let deleted = tx.execute(
            "DELETE FROM surcharge_link WHERE withholding_plan_id = ?1",
            params![withholding_plan_id],
        )?;
        if deleted == 0 {
            return Err(PlanError::NotFound {
                what: "surcharge link",
                id: withholding_plan_id,
            });
        }
        tx.execute(
            "UPDATE plan SET status = 'active', decayed_at = NULL, interrupted_at = NULL,
                    interruption_reason = NULL, interrupted_by_plan_id = NULL
             WHERE plan_id = ?1",
            params![withholding_plan_id],
        )?;

        tx.commit()?;
        Ok(true)
    }

    /// Point-in-time surcharge preview. Pure read: no link is created, no
    /// row is touched, and calling it twice with unchanged inputs returns
    /// identical numbers.
    pub fn preview_surcharge(
        &self,
        caller: &str,
        withholding_plan_id: PlanId,
        portal_plan_id: PlanId,
    ) -> PlanResult<SurchargePreview> {
        let withholding = self.plan_owned(caller, withholding_plan_id)?;
        let portal = self.plan_owned(caller, portal_plan_id)?;
        if withholding.kind != PlanKind::Withholding {
            return Err(PlanError::Conflict(
                "surcharge links start from a withholding plan".into(),
            ));
        }
        if portal.kind != PlanKind::Portal {
            return Err(PlanError::Conflict(
                "surcharge link target must be a portal plan".into(),
            ));
        }
        let residual = self.plan_residual_cents(withholding_plan_id)?;
        let portal_total = portal.total_cents;
        Ok(SurchargePreview {
            residual_cents: residual,
            portal_total_cents: portal_total,
            delta_cents: portal_total - residual,
        })
    }

    pub fn surcharge_link_for_plan(
        &self,
        withholding_plan_id: PlanId,
    ) -> PlanResult<Option<SurchargeLink>> {
        let link = self
            .conn
            .query_row(
                "SELECT link_id, withholding_plan_id, portal_plan_id, residual_cents,
                        portal_total_cents, surcharge_cents, reason, linked_on
                 FROM surcharge_link WHERE withholding_plan_id = ?1",
                params![withholding_plan_id],
                decode_surcharge_link,
            )
            .optional()?;
        Ok(link)
    }

    /// Face residual of a plan: total due minus total paid, from the
    /// installment rows. Missing amounts count as zero.
    fn plan_residual_cents(&self, plan_id: PlanId) -> PlanResult<Cents> {
        let (due, paid): (i64, i64) = self.conn.query_row(
            "SELECT COALESCE(SUM(amount_cents), 0),
                    COALESCE(SUM(CASE WHEN paid <> 0 THEN amount_cents ELSE 0 END), 0)
             FROM installment WHERE plan_id = ?1",
            params![plan_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(due - paid)
    }
}
