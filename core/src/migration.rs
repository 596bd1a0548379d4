//! Migration orchestrator — the cross-plan write workflows.
//!
//! Three workflows move debts or whole plans between plans: per-debt
//! migration, full-plan reattachment, and single-debt surcharge linking.
//! Each one validates its inputs BEFORE any store call, runs as a single
//! store transaction, and publishes exactly one event on success (both to
//! the bus and to the persistent event log). No error is ever swallowed
//! here; degraded defaults belong to the read path only.

use crate::clock::PlanClock;
use crate::error::{PlanError, PlanResult};
use crate::event::{EventBus, PlanEvent};
use crate::model::{NewInstallment, NewPlan, PaymentMode, PlanKind, ReadmissionLink};
use crate::recovery_window::RecoveryWindow;
use crate::store::PlanStore;
use crate::types::{Cents, DebtId, InstallmentSeq, PlanId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurchargeOutcome {
    pub link_id: String,
    pub surcharge_cents: Cents,
    pub action: LinkAction,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SurchargePreview {
    pub residual_cents: Cents,
    pub portal_total_cents: Cents,
    /// Signed: positive means extra cost, negative a saving, zero break-even.
    pub delta_cents: Cents,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetachOutcome {
    pub removed: Vec<PlanId>,
    pub unlocked: bool,
}

/// Borrowing view over the engine's ports; one instance per call.
pub struct MigrationOrchestrator<'e> {
    store: &'e PlanStore,
    bus: &'e EventBus,
    clock: &'e PlanClock,
}

impl<'e> MigrationOrchestrator<'e> {
    pub fn new(store: &'e PlanStore, bus: &'e EventBus, clock: &'e PlanClock) -> Self {
        Self { store, bus, clock }
    }

    fn publish(&self, event: PlanEvent) -> PlanResult<PlanEvent> {
        self.store.append_event(&event, self.clock.today())?;
        self.bus.publish(&event);
        Ok(event)
    }

    // ── Plan creation ──────────────────────────────────────────

    pub fn create_plan(
        &self,
        caller: &str,
        new: &NewPlan,
        installments: &[NewInstallment],
    ) -> PlanResult<PlanId> {
        if caller.is_empty() {
            return Err(PlanError::Validation("caller identity is required".into()));
        }
        if installments.is_empty() {
            return Err(PlanError::Validation(
                "a plan needs at least one installment".into(),
            ));
        }
        let plan_id = self.store.create_plan(caller, new, installments)?;
        self.publish(PlanEvent::PlanCreated { plan_id })?;
        Ok(plan_id)
    }

    // ── (a) Debt migration ─────────────────────────────────────

    pub fn migrate_debts(
        &self,
        caller: &str,
        source_plan_id: PlanId,
        debt_ids: &[DebtId],
        target_plan_id: PlanId,
        note: Option<&str>,
    ) -> PlanResult<Vec<DebtId>> {
        if source_plan_id == target_plan_id {
            return Err(PlanError::Validation(
                "source and target plan must differ".into(),
            ));
        }
        validate_ids("debt", debt_ids)?;

        let migrated = self.store.migrate_debts(
            caller,
            source_plan_id,
            debt_ids,
            target_plan_id,
            note,
            self.clock.today(),
        )?;
        log::debug!(
            "migrated {} debts from plan {source_plan_id} to plan {target_plan_id}",
            migrated.len()
        );
        self.publish(PlanEvent::DebtsMigrated {
            source_plan_id,
            target_plan_id,
            debt_ids: migrated.clone(),
        })?;
        Ok(migrated)
    }

    /// Returns the restored debt ids and the target plan they came back
    /// from (None when the rollback was a no-op retry).
    pub fn rollback_debt_migration(
        &self,
        caller: &str,
        source_plan_id: PlanId,
        debt_ids: &[DebtId],
    ) -> PlanResult<(Vec<DebtId>, Option<PlanId>)> {
        validate_ids("debt", debt_ids)?;

        let restored = self
            .store
            .rollback_debt_migration(caller, source_plan_id, debt_ids)?;
        if restored.is_empty() {
            // Already rolled back; retries are silent no-ops.
            return Ok((Vec::new(), None));
        }
        let target_plan_id = restored[0].1;
        let ids: Vec<DebtId> = restored.iter().map(|(debt, _)| *debt).collect();
        self.publish(PlanEvent::DebtMigrationRolledBack {
            source_plan_id,
            target_plan_id,
            debt_ids: ids.clone(),
        })?;
        Ok((ids, Some(target_plan_id)))
    }

    // ── (b) Full-plan reattachment ─────────────────────────────

    pub fn attach_plan_to_targets(
        &self,
        caller: &str,
        portal_plan_id: PlanId,
        target_plan_ids: &[PlanId],
        note: Option<&str>,
    ) -> PlanResult<Vec<ReadmissionLink>> {
        validate_ids("target plan", target_plan_ids)?;
        if target_plan_ids.contains(&portal_plan_id) {
            return Err(PlanError::Validation(
                "a plan cannot be attached to itself".into(),
            ));
        }

        let links = self.store.attach_plan_to_targets(
            caller,
            portal_plan_id,
            target_plan_ids,
            note,
            self.clock.today(),
        )?;
        self.publish(PlanEvent::PlanAttached {
            portal_plan_id,
            target_plan_ids: target_plan_ids.to_vec(),
        })?;
        Ok(links)
    }

    pub fn detach_plan_links(
        &self,
        caller: &str,
        portal_plan_id: PlanId,
        target_plan_ids: Option<&[PlanId]>,
    ) -> PlanResult<DetachOutcome> {
        if let Some(subset) = target_plan_ids {
            validate_ids("target plan", subset)?;
        }

        let outcome = self
            .store
            .detach_plan_links(caller, portal_plan_id, target_plan_ids)?;
        self.publish(PlanEvent::PlanDetached {
            portal_plan_id,
            removed_plan_ids: outcome.removed.clone(),
            unlocked: outcome.unlocked,
        })?;
        Ok(outcome)
    }

    // ── (c) Surcharge linking ──────────────────────────────────

    pub fn link_with_surcharge(
        &self,
        caller: &str,
        withholding_plan_id: PlanId,
        portal_plan_id: PlanId,
        reason: Option<&str>,
    ) -> PlanResult<SurchargeOutcome> {
        if withholding_plan_id == portal_plan_id {
            return Err(PlanError::Validation(
                "source and target plan must differ".into(),
            ));
        }
        let outcome = self.store.link_with_surcharge(
            caller,
            withholding_plan_id,
            portal_plan_id,
            reason,
            self.clock.today(),
        )?;
        self.publish(PlanEvent::SurchargeLinked {
            withholding_plan_id,
            portal_plan_id,
            surcharge_cents: outcome.surcharge_cents,
        })?;
        Ok(outcome)
    }

    pub fn unlink_surcharge(
        &self,
        caller: &str,
        withholding_plan_id: PlanId,
        reason: Option<&str>,
    ) -> PlanResult<bool> {
        if let Some(reason) = reason {
            log::debug!("unlinking surcharge from plan {withholding_plan_id}: {reason}");
        }
        let restored = self.store.unlink_surcharge(caller, withholding_plan_id)?;
        self.publish(PlanEvent::SurchargeUnlinked {
            withholding_plan_id,
        })?;
        Ok(restored)
    }

    /// Read-only surcharge preview. No event, no invalidation, no row.
    pub fn preview_surcharge(
        &self,
        caller: &str,
        withholding_plan_id: PlanId,
        portal_plan_id: PlanId,
    ) -> PlanResult<SurchargePreview> {
        if withholding_plan_id == portal_plan_id {
            return Err(PlanError::Validation(
                "source and target plan must differ".into(),
            ));
        }
        self.store
            .preview_surcharge(caller, withholding_plan_id, portal_plan_id)
    }

    // ── Installment mutations ──────────────────────────────────

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
        if paid_date > self.clock.today() {
            return Err(PlanError::Validation(
                "payment date cannot lie in the future".into(),
            ));
        }
        if penalty_cents < 0 || interest_cents < 0 {
            return Err(PlanError::Validation(
                "penalty and interest must not be negative".into(),
            ));
        }
        self.store.mark_installment_paid(
            caller,
            plan_id,
            seq,
            paid_date,
            mode,
            penalty_cents,
            interest_cents,
        )?;
        self.publish(PlanEvent::InstallmentPaid { plan_id, seq })?;
        Ok(())
    }

    pub fn unmark_installment_paid(
        &self,
        caller: &str,
        plan_id: PlanId,
        seq: InstallmentSeq,
        reason: Option<&str>,
    ) -> PlanResult<()> {
        if let Some(reason) = reason {
            log::debug!("unmarking installment {plan_id}/{seq}: {reason}");
        }
        self.store.unmark_installment_paid(caller, plan_id, seq)?;
        self.publish(PlanEvent::InstallmentUnpaid { plan_id, seq })?;
        Ok(())
    }

    pub fn postpone_installment(
        &self,
        caller: &str,
        plan_id: PlanId,
        seq: InstallmentSeq,
        new_due: Option<NaiveDate>,
    ) -> PlanResult<()> {
        self.store
            .postpone_installment(caller, plan_id, seq, new_due)?;
        self.publish(PlanEvent::InstallmentPostponed { plan_id, seq })?;
        Ok(())
    }

    pub fn delete_installment(
        &self,
        caller: &str,
        plan_id: PlanId,
        seq: InstallmentSeq,
    ) -> PlanResult<()> {
        self.store.delete_installment(caller, plan_id, seq)?;
        self.publish(PlanEvent::InstallmentDeleted { plan_id, seq })?;
        Ok(())
    }

    // ── Decay confirmation ─────────────────────────────────────

    /// Confirm decay on a withholding plan. Only allowed once the unpaid
    /// run has aged past the 90-day pre-decadence threshold; the
    /// transition is always this explicit operation, never a side effect
    /// of a KPI read.
    pub fn confirm_decay(&self, caller: &str, plan_id: PlanId) -> PlanResult<()> {
        let plan = self.store.plan_owned(caller, plan_id)?;
        if plan.kind != PlanKind::Withholding {
            return Err(PlanError::Conflict(
                "decay confirmation applies to withholding plans".into(),
            ));
        }
        let installments = self.store.installments_for_plan(plan_id)?;
        let window = RecoveryWindow::compute(&installments, plan.status, self.clock.today());
        if !window.pre_decay_eligible {
            return Err(PlanError::Conflict(
                "plan has not aged past the pre-decadence window".into(),
            ));
        }
        self.store
            .set_plan_decayed(caller, plan_id, self.clock.today())?;
        self.publish(PlanEvent::PlanDecayed { plan_id })?;
        Ok(())
    }
}

/// Shared id-list validation: non-empty, positive, duplicate-free.
fn validate_ids(what: &str, ids: &[i64]) -> PlanResult<()> {
    if ids.is_empty() {
        return Err(PlanError::Validation(format!(
            "at least one {what} id is required"
        )));
    }
    if let Some(bad) = ids.iter().find(|id| **id <= 0) {
        return Err(PlanError::Validation(format!("invalid {what} id {bad}")));
    }
    let mut seen = std::collections::HashSet::new();
    if let Some(dup) = ids.iter().find(|id| !seen.insert(**id)) {
        return Err(PlanError::Validation(format!(
            "duplicate {what} id {dup} in selection"
        )));
    }
    Ok(())
}
