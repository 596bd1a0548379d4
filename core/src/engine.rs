//! The plan engine — wires clock, store, cache, and event bus together.
//!
//! READ PATH (one direction):
//!   store -> resolver -> risk calculators -> aggregator -> cache -> caller
//! WRITE PATH (one direction):
//!   caller -> orchestrator -> store, then forced KPI re-fetch + broadcast.
//!
//! RULES:
//!   - After a successful migration the engine re-fetches, it never patches
//!     KPI rows locally; a migration can move numbers on two plans at once.
//!   - KPI reads degrade to zeroed rows rather than failing; a dashboard
//!     must stay renderable. Mutations always propagate their errors.
//!   - A cancelled call discards its result rather than applying it.

use crate::cache::{CancelToken, KpiCache, ReadTickets};
use crate::clock::PlanClock;
use crate::config::EngineConfig;
use crate::error::PlanResult;
use crate::event::{EventBus, EventLogEntry, PlanEvent};
use crate::kpi::{self, PlanKpi, PortfolioKpi};
use crate::migration::{
    DetachOutcome, MigrationOrchestrator, SurchargeOutcome, SurchargePreview,
};
use crate::model::{NewInstallment, NewPlan, PaymentMode, PlanKind, PlanStatus, ReadmissionLink};
use crate::schedule::ScheduleSpec;
use crate::store::PlanStore;
use crate::types::{Cents, DebtId, InstallmentSeq, PlanId};
use chrono::NaiveDate;

/// Result of a mutating call: the workflow's own outcome plus the
/// re-fetched KPI rows of every plan the mutation touched.
#[derive(Debug, Clone)]
pub struct MutationOutcome<T> {
    pub result: T,
    pub refreshed: Vec<PlanKpi>,
}

/// A caller's portfolio view. Totals appear only when more than one plan
/// is visible.
#[derive(Debug, Clone)]
pub struct PortfolioOverview {
    pub plans: Vec<PlanKpi>,
    pub totals: Option<PortfolioKpi>,
}

pub struct PlanEngine {
    pub clock: PlanClock,
    store: PlanStore,
    cache: KpiCache,
    bus: EventBus,
    tickets: ReadTickets,
    max_skips: u32,
}

impl PlanEngine {
    pub fn new(store: PlanStore, clock: PlanClock) -> Self {
        Self::with_config(store, clock, EngineConfig::default())
    }

    pub fn with_config(store: PlanStore, clock: PlanClock, config: EngineConfig) -> Self {
        Self {
            clock,
            store,
            cache: KpiCache::new(config.cache_ttl()),
            bus: EventBus::new(),
            tickets: ReadTickets::new(),
            max_skips: config.max_skips,
        }
    }

    /// Direct store access for seeding and diagnostics.
    pub fn store(&self) -> &PlanStore {
        &self.store
    }

    /// Declare an event subscriber. Subscribers are registered up front;
    /// nothing discovers the bus through a global.
    pub fn subscribe(&mut self, subscriber: Box<dyn Fn(&PlanEvent) + Send>) {
        self.bus.subscribe(subscriber);
    }

    pub fn recent_events(&self, limit: u32) -> PlanResult<Vec<EventLogEntry>> {
        self.store.recent_events(limit)
    }

    fn orchestrator(&self) -> MigrationOrchestrator<'_> {
        MigrationOrchestrator::new(&self.store, &self.bus, &self.clock)
    }

    // ── Read path ──────────────────────────────────────────────

    fn fetch_kpi(&self, caller: &str, plan_id: PlanId) -> PlanResult<PlanKpi> {
        let plan = self.store.plan_owned(caller, plan_id)?;
        let installments = self.store.installments_for_plan(plan_id)?;
        Ok(PlanKpi::aggregate(
            &plan,
            &installments,
            self.clock.today(),
            self.max_skips,
        ))
    }

    /// Read-through KPI fetch: cache hit inside the TTL, store otherwise.
    pub fn plan_kpi(&mut self, caller: &str, plan_id: PlanId) -> PlanResult<PlanKpi> {
        if let Some(cached) = self.cache.get(caller, plan_id) {
            return Ok(cached.clone());
        }
        let kpi = self.fetch_kpi(caller, plan_id)?;
        self.cache.insert(caller, plan_id, kpi.clone());
        Ok(kpi)
    }

    /// Degrading KPI read for dashboards: a failure logs and yields a
    /// zeroed row instead of propagating.
    pub fn plan_overview(&mut self, caller: &str, plan_id: PlanId) -> PlanKpi {
        match self.plan_kpi(caller, plan_id) {
            Ok(kpi) => kpi,
            Err(e) => {
                log::warn!("KPI read for plan {plan_id} degraded: {e}");
                PlanKpi::empty(plan_id, PlanKind::Other, PlanStatus::Active)
            }
        }
    }

    /// Every plan the caller can see, with grand totals when more than one
    /// plan is present. Never fails.
    pub fn portfolio(&mut self, caller: &str) -> PortfolioOverview {
        let plans = match self.store.plans_for_owner(caller) {
            Ok(plans) => plans,
            Err(e) => {
                log::warn!("portfolio read degraded: {e}");
                return PortfolioOverview {
                    plans: Vec::new(),
                    totals: None,
                };
            }
        };
        let mut kpis = Vec::with_capacity(plans.len());
        for plan in &plans {
            match self.plan_kpi(caller, plan.id) {
                Ok(kpi) => kpis.push(kpi),
                Err(e) => {
                    log::warn!("KPI read for plan {} degraded: {e}", plan.id);
                    kpis.push(PlanKpi::empty(plan.id, plan.kind, plan.status));
                }
            }
        }
        let totals = kpi::portfolio_totals(&kpis);
        PortfolioOverview { plans: kpis, totals }
    }

    /// Issue a read ticket for a plan, superseding any outstanding read.
    pub fn begin_plan_read(&mut self, plan_id: PlanId) -> u64 {
        self.tickets.issue(plan_id)
    }

    /// Apply a completed read if (and only if) its ticket is still the
    /// latest issued for the plan. Stale responses are dropped silently.
    pub fn apply_plan_read(
        &mut self,
        caller: &str,
        plan_id: PlanId,
        ticket: u64,
        kpi: PlanKpi,
    ) -> bool {
        if !self.tickets.is_latest(plan_id, ticket) {
            log::debug!("discarding superseded read {ticket} for plan {plan_id}");
            return false;
        }
        self.cache.insert(caller, plan_id, kpi);
        true
    }

    /// External change notification: something else touched this data set.
    pub fn on_external_change(&mut self, plan_id: Option<PlanId>) {
        match plan_id {
            Some(id) => self.cache.invalidate_plan(id),
            None => self.cache.clear(),
        }
    }

    // ── Write path ─────────────────────────────────────────────

    /// Create a plan and its installments from a schedule spec.
    pub fn create_plan(
        &mut self,
        caller: &str,
        new: &NewPlan,
        schedule: &ScheduleSpec,
    ) -> PlanResult<PlanId> {
        let installments = schedule.expand()?;
        let plan_id = self.orchestrator().create_plan(caller, new, &installments)?;
        self.cache.invalidate_plan(plan_id);
        Ok(plan_id)
    }

    /// Create a plan from an explicit installment list.
    pub fn create_plan_explicit(
        &mut self,
        caller: &str,
        new: &NewPlan,
        installments: Vec<NewInstallment>,
    ) -> PlanResult<PlanId> {
        self.create_plan(caller, new, &ScheduleSpec::Explicit { installments })
    }

    fn refresh(&mut self, caller: &str, plan_ids: &[PlanId]) -> PlanResult<Vec<PlanKpi>> {
        let mut refreshed = Vec::with_capacity(plan_ids.len());
        for &plan_id in plan_ids {
            let kpi = self.fetch_kpi(caller, plan_id)?;
            self.cache.insert(caller, plan_id, kpi.clone());
            refreshed.push(kpi);
        }
        Ok(refreshed)
    }

    /// Shared tail of every mutating call: invalidate first, then either
    /// discard (cancelled) or re-fetch the touched plans.
    fn settle<T>(
        &mut self,
        caller: &str,
        touched: &[PlanId],
        cancel: &CancelToken,
        result: T,
    ) -> PlanResult<Option<MutationOutcome<T>>> {
        for &plan_id in touched {
            self.cache.invalidate_plan(plan_id);
        }
        if cancel.is_cancelled() {
            log::debug!("mutation result discarded after cancellation");
            return Ok(None);
        }
        let refreshed = self.refresh(caller, touched)?;
        Ok(Some(MutationOutcome { result, refreshed }))
    }

    pub fn migrate_debts(
        &mut self,
        caller: &str,
        source_plan_id: PlanId,
        debt_ids: &[DebtId],
        target_plan_id: PlanId,
        note: Option<&str>,
        cancel: &CancelToken,
    ) -> PlanResult<Option<MutationOutcome<Vec<DebtId>>>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let migrated = self.orchestrator().migrate_debts(
            caller,
            source_plan_id,
            debt_ids,
            target_plan_id,
            note,
        )?;
        self.settle(
            caller,
            &[source_plan_id, target_plan_id],
            cancel,
            migrated,
        )
    }

    pub fn rollback_debt_migration(
        &mut self,
        caller: &str,
        source_plan_id: PlanId,
        debt_ids: &[DebtId],
        cancel: &CancelToken,
    ) -> PlanResult<Option<MutationOutcome<Vec<DebtId>>>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let (restored, target_plan_id) =
            self.orchestrator()
                .rollback_debt_migration(caller, source_plan_id, debt_ids)?;
        let mut touched = vec![source_plan_id];
        touched.extend(target_plan_id);
        self.settle(caller, &touched, cancel, restored)
    }

    pub fn attach_plan_to_targets(
        &mut self,
        caller: &str,
        portal_plan_id: PlanId,
        target_plan_ids: &[PlanId],
        note: Option<&str>,
        cancel: &CancelToken,
    ) -> PlanResult<Option<MutationOutcome<Vec<ReadmissionLink>>>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let links = self.orchestrator().attach_plan_to_targets(
            caller,
            portal_plan_id,
            target_plan_ids,
            note,
        )?;
        let mut touched = vec![portal_plan_id];
        touched.extend_from_slice(target_plan_ids);
        self.settle(caller, &touched, cancel, links)
    }

    pub fn detach_plan_links(
        &mut self,
        caller: &str,
        portal_plan_id: PlanId,
        target_plan_ids: Option<&[PlanId]>,
        cancel: &CancelToken,
    ) -> PlanResult<Option<MutationOutcome<DetachOutcome>>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let outcome =
            self.orchestrator()
                .detach_plan_links(caller, portal_plan_id, target_plan_ids)?;
        let mut touched = vec![portal_plan_id];
        touched.extend_from_slice(&outcome.removed);
        self.settle(caller, &touched, cancel, outcome)
    }

    pub fn link_with_surcharge(
        &mut self,
        caller: &str,
        withholding_plan_id: PlanId,
        portal_plan_id: PlanId,
        reason: Option<&str>,
        cancel: &CancelToken,
    ) -> PlanResult<Option<MutationOutcome<SurchargeOutcome>>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let outcome = self.orchestrator().link_with_surcharge(
            caller,
            withholding_plan_id,
            portal_plan_id,
            reason,
        )?;
        self.settle(
            caller,
            &[withholding_plan_id, portal_plan_id],
            cancel,
            outcome,
        )
    }

    pub fn unlink_surcharge(
        &mut self,
        caller: &str,
        withholding_plan_id: PlanId,
        reason: Option<&str>,
        cancel: &CancelToken,
    ) -> PlanResult<Option<MutationOutcome<bool>>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let restored = self
            .orchestrator()
            .unlink_surcharge(caller, withholding_plan_id, reason)?;
        self.settle(caller, &[withholding_plan_id], cancel, restored)
    }

    /// Pure preview; safe to call repeatedly, touches nothing.
    pub fn preview_surcharge(
        &self,
        caller: &str,
        withholding_plan_id: PlanId,
        portal_plan_id: PlanId,
    ) -> PlanResult<SurchargePreview> {
        self.orchestrator()
            .preview_surcharge(caller, withholding_plan_id, portal_plan_id)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn mark_installment_paid(
        &mut self,
        caller: &str,
        plan_id: PlanId,
        seq: InstallmentSeq,
        paid_date: NaiveDate,
        mode: PaymentMode,
        penalty_cents: Cents,
        interest_cents: Cents,
        cancel: &CancelToken,
    ) -> PlanResult<Option<MutationOutcome<()>>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        self.orchestrator().mark_installment_paid(
            caller,
            plan_id,
            seq,
            paid_date,
            mode,
            penalty_cents,
            interest_cents,
        )?;
        self.settle(caller, &[plan_id], cancel, ())
    }

    pub fn unmark_installment_paid(
        &mut self,
        caller: &str,
        plan_id: PlanId,
        seq: InstallmentSeq,
        reason: Option<&str>,
        cancel: &CancelToken,
    ) -> PlanResult<Option<MutationOutcome<()>>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        self.orchestrator()
            .unmark_installment_paid(caller, plan_id, seq, reason)?;
        self.settle(caller, &[plan_id], cancel, ())
    }

    pub fn postpone_installment(
        &mut self,
        caller: &str,
        plan_id: PlanId,
        seq: InstallmentSeq,
        new_due: Option<NaiveDate>,
        cancel: &CancelToken,
    ) -> PlanResult<Option<MutationOutcome<()>>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        self.orchestrator()
            .postpone_installment(caller, plan_id, seq, new_due)?;
        self.settle(caller, &[plan_id], cancel, ())
    }

    pub fn delete_installment(
        &mut self,
        caller: &str,
        plan_id: PlanId,
        seq: InstallmentSeq,
        cancel: &CancelToken,
    ) -> PlanResult<Option<MutationOutcome<()>>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        self.orchestrator().delete_installment(caller, plan_id, seq)?;
        self.settle(caller, &[plan_id], cancel, ())
    }

    /// Explicit decay confirmation for an aged withholding plan.
    pub fn confirm_decay(&mut self, caller: &str, plan_id: PlanId) -> PlanResult<PlanKpi> {
        self.orchestrator().confirm_decay(caller, plan_id)?;
        self.cache.invalidate_plan(plan_id);
        let kpi = self.fetch_kpi(caller, plan_id)?;
        self.cache.insert(caller, plan_id, kpi.clone());
        Ok(kpi)
    }
}
