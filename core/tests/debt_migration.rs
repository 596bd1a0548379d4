//! Debt migration tests — workflow (a).
//!
//! Covers: the migrate/rollback round trip restoring both plans' active
//! debt sets exactly, validation before any store call, ownership and
//! kind checks, audit markers on migrated-in links, and rollback deriving
//! its working set from the source plan's own records.

use chrono::{Duration, NaiveDate};
use rateation_core::cache::CancelToken;
use rateation_core::clock::PlanClock;
use rateation_core::engine::PlanEngine;
use rateation_core::error::PlanError;
use rateation_core::model::{DebtLinkStatus, NewInstallment, NewPlan, PlanKind};
use rateation_core::store::PlanStore;

const OWNER: &str = "desk";

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn build(today: NaiveDate) -> PlanEngine {
    let store = PlanStore::in_memory().expect("in-memory store");
    store.migrate().expect("schema migrations");
    PlanEngine::new(store, PlanClock::fixed(today))
}

fn seed_plan(engine: &mut PlanEngine, owner: &str, kind: PlanKind, today: NaiveDate) -> i64 {
    engine
        .create_plan_explicit(
            owner,
            &NewPlan {
                kind,
                taxpayer: None,
                note: None,
            },
            vec![NewInstallment {
                seq: 1,
                due_date: Some(today + Duration::days(30)),
                amount_cents: 100_00,
            }],
        )
        .expect("seed plan")
}

fn seed_debts(engine: &PlanEngine, plan_id: i64, count: usize) -> Vec<i64> {
    (0..count)
        .map(|n| {
            let debt_id = engine
                .store()
                .insert_debt(&format!("R-{n:04}"), 50_00)
                .expect("insert debt");
            engine.store().attach_debt(plan_id, debt_id).expect("attach debt");
            debt_id
        })
        .collect()
}

/// Migrate three debts, roll them back with the same ids: both plans'
/// active debt sets end bit-for-bit equal to their pre-migration state.
#[test]
fn round_trip_restores_both_active_sets() {
    let today = day(2026, 3, 1);
    let mut engine = build(today);
    let portal = seed_plan(&mut engine, OWNER, PlanKind::Portal, today);
    let target = seed_plan(&mut engine, OWNER, PlanKind::AmnestyReadmission, today);
    let debts = seed_debts(&engine, portal, 3);

    let source_before = engine.store().active_debt_ids(portal).unwrap();
    let target_before = engine.store().active_debt_ids(target).unwrap();

    let cancel = CancelToken::new();
    let outcome = engine
        .migrate_debts(OWNER, portal, &debts, target, None, &cancel)
        .expect("migration succeeds")
        .expect("not cancelled");
    assert_eq!(outcome.result, debts);
    assert!(engine.store().active_debt_ids(portal).unwrap().is_empty());
    assert_eq!(engine.store().active_debt_ids(target).unwrap(), debts);

    engine
        .rollback_debt_migration(OWNER, portal, &debts, &cancel)
        .expect("rollback succeeds")
        .expect("not cancelled");
    assert_eq!(engine.store().active_debt_ids(portal).unwrap(), source_before);
    assert_eq!(engine.store().active_debt_ids(target).unwrap(), target_before);
}

/// Migrated-in links carry the audit origin; migrated-out rows stay on
/// the source plan as its own record of what left.
#[test]
fn migration_leaves_an_audit_trail() {
    let today = day(2026, 3, 1);
    let mut engine = build(today);
    let portal = seed_plan(&mut engine, OWNER, PlanKind::Portal, today);
    let target = seed_plan(&mut engine, OWNER, PlanKind::AmnestyReadmission, today);
    let debts = seed_debts(&engine, portal, 2);

    engine
        .migrate_debts(OWNER, portal, &debts, target, None, &CancelToken::new())
        .unwrap()
        .unwrap();

    let target_links = engine.store().debt_links_for_plan(target).unwrap();
    assert_eq!(target_links.len(), 2);
    for link in &target_links {
        assert_eq!(link.status, DebtLinkStatus::Active);
        assert_eq!(link.origin, Some(DebtLinkStatus::MigratedIn));
        assert_eq!(link.origin_plan_id, Some(portal));
        assert_eq!(link.moved_on, Some(today));
    }

    assert_eq!(engine.store().migrated_out_debt_ids(portal).unwrap(), debts);
}

#[test]
fn same_source_and_target_rejected_before_store() {
    let today = day(2026, 3, 1);
    let mut engine = build(today);
    let portal = seed_plan(&mut engine, OWNER, PlanKind::Portal, today);

    let err = engine
        .migrate_debts(OWNER, portal, &[1], portal, None, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, PlanError::Validation(_)), "got {err:?}");
}

#[test]
fn empty_selection_rejected() {
    let today = day(2026, 3, 1);
    let mut engine = build(today);
    let portal = seed_plan(&mut engine, OWNER, PlanKind::Portal, today);
    let target = seed_plan(&mut engine, OWNER, PlanKind::AmnestyReadmission, today);

    let err = engine
        .migrate_debts(OWNER, portal, &[], target, None, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, PlanError::Validation(_)), "got {err:?}");
}

#[test]
fn duplicate_ids_rejected() {
    let today = day(2026, 3, 1);
    let mut engine = build(today);
    let portal = seed_plan(&mut engine, OWNER, PlanKind::Portal, today);
    let target = seed_plan(&mut engine, OWNER, PlanKind::AmnestyReadmission, today);
    let debts = seed_debts(&engine, portal, 1);

    let err = engine
        .migrate_debts(
            OWNER,
            portal,
            &[debts[0], debts[0]],
            target,
            None,
            &CancelToken::new(),
        )
        .unwrap_err();
    assert!(matches!(err, PlanError::Validation(_)), "got {err:?}");
}

#[test]
fn no_matching_active_debts_is_not_found() {
    let today = day(2026, 3, 1);
    let mut engine = build(today);
    let portal = seed_plan(&mut engine, OWNER, PlanKind::Portal, today);
    let target = seed_plan(&mut engine, OWNER, PlanKind::AmnestyReadmission, today);
    let loose_debt = engine.store().insert_debt("R-9999", 10_00).unwrap();

    let err = engine
        .migrate_debts(OWNER, portal, &[loose_debt], target, None, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, PlanError::NotFound { .. }), "got {err:?}");
}

/// A selection mixing active and non-active debts is refused whole; the
/// workflow is all-or-nothing.
#[test]
fn partially_active_selection_is_a_conflict() {
    let today = day(2026, 3, 1);
    let mut engine = build(today);
    let portal = seed_plan(&mut engine, OWNER, PlanKind::Portal, today);
    let target = seed_plan(&mut engine, OWNER, PlanKind::AmnestyReadmission, today);
    let debts = seed_debts(&engine, portal, 1);
    let loose_debt = engine.store().insert_debt("R-9999", 10_00).unwrap();

    let err = engine
        .migrate_debts(
            OWNER,
            portal,
            &[debts[0], loose_debt],
            target,
            None,
            &CancelToken::new(),
        )
        .unwrap_err();
    assert!(matches!(err, PlanError::Conflict(_)), "got {err:?}");
    assert_eq!(
        engine.store().active_debt_ids(portal).unwrap(),
        debts,
        "nothing moved"
    );
}

#[test]
fn foreign_plan_is_access_denied() {
    let today = day(2026, 3, 1);
    let mut engine = build(today);
    let portal = seed_plan(&mut engine, OWNER, PlanKind::Portal, today);
    let foreign = seed_plan(&mut engine, "someone-else", PlanKind::AmnestyReadmission, today);
    let debts = seed_debts(&engine, portal, 1);

    let err = engine
        .migrate_debts(OWNER, portal, &debts, foreign, None, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, PlanError::AccessDenied { .. }), "got {err:?}");
}

#[test]
fn target_must_be_a_readmission_plan() {
    let today = day(2026, 3, 1);
    let mut engine = build(today);
    let portal = seed_plan(&mut engine, OWNER, PlanKind::Portal, today);
    let wrong_kind = seed_plan(&mut engine, OWNER, PlanKind::Portal, today);
    let debts = seed_debts(&engine, portal, 1);

    let err = engine
        .migrate_debts(OWNER, portal, &debts, wrong_kind, None, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, PlanError::Conflict(_)), "got {err:?}");
}

/// Rollback works from the source plan's own migrated-out record: a
/// superset of ids only narrows to what actually migrated, and a retry
/// after success is a silent no-op.
#[test]
fn rollback_rederives_ids_and_is_idempotent() {
    let today = day(2026, 3, 1);
    let mut engine = build(today);
    let portal = seed_plan(&mut engine, OWNER, PlanKind::Portal, today);
    let target = seed_plan(&mut engine, OWNER, PlanKind::AmnestyReadmission, today);
    let debts = seed_debts(&engine, portal, 3);
    let cancel = CancelToken::new();

    // Only two of three debts migrate.
    engine
        .migrate_debts(OWNER, portal, &debts[..2], target, None, &cancel)
        .unwrap()
        .unwrap();

    // Caller hands back a superset including the never-migrated debt and a
    // fictitious id; only the recorded two come back.
    let superset = vec![debts[0], debts[1], debts[2], 999_999];
    let outcome = engine
        .rollback_debt_migration(OWNER, portal, &superset, &cancel)
        .unwrap()
        .unwrap();
    assert_eq!(outcome.result, &debts[..2]);
    assert_eq!(engine.store().active_debt_ids(portal).unwrap(), debts);
    assert!(engine.store().active_debt_ids(target).unwrap().is_empty());

    // Retrying the same rollback changes nothing and raises nothing.
    let retry = engine
        .rollback_debt_migration(OWNER, portal, &superset, &cancel)
        .unwrap()
        .unwrap();
    assert!(retry.result.is_empty());
    assert_eq!(engine.store().active_debt_ids(portal).unwrap(), debts);
}
