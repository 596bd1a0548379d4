//! Surcharge linking tests — workflow (c) — plus decay confirmation.
//!
//! Covers: the pure, repeatable preview; the surcharge snapshot and its
//! non-negative clamp; single-cardinality under relinking; the restore on
//! unlink; and the 90-day gate on decay confirmation.

use chrono::{Duration, NaiveDate};
use rateation_core::cache::CancelToken;
use rateation_core::clock::PlanClock;
use rateation_core::engine::PlanEngine;
use rateation_core::error::PlanError;
use rateation_core::migration::LinkAction;
use rateation_core::model::{NewInstallment, NewPlan, PaymentMode, PlanKind, PlanStatus};
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

fn seed_plan(
    engine: &mut PlanEngine,
    kind: PlanKind,
    rows: Vec<(i64, NaiveDate, i64)>,
) -> i64 {
    engine
        .create_plan_explicit(
            OWNER,
            &NewPlan {
                kind,
                taxpayer: None,
                note: None,
            },
            rows.into_iter()
                .map(|(seq, due, amount)| NewInstallment {
                    seq,
                    due_date: Some(due),
                    amount_cents: amount,
                })
                .collect(),
        )
        .expect("seed plan")
}

/// Withholding plan whose unpaid run is 120 days old, with one paid
/// installment: residual 500_00 of a 700_00 face.
fn seed_aged_withholding(engine: &mut PlanEngine, today: NaiveDate) -> i64 {
    let plan = seed_plan(
        engine,
        PlanKind::Withholding,
        vec![
            (1, today - Duration::days(150), 200_00),
            (2, today - Duration::days(120), 300_00),
            (3, today - Duration::days(95), 200_00),
        ],
    );
    engine
        .mark_installment_paid(
            OWNER,
            plan,
            1,
            today - Duration::days(150),
            PaymentMode::Ordinary,
            0,
            0,
            &CancelToken::new(),
        )
        .unwrap()
        .unwrap();
    plan
}

fn seed_portal(engine: &mut PlanEngine, today: NaiveDate, amount: i64) -> i64 {
    seed_plan(
        engine,
        PlanKind::Portal,
        vec![(1, today + Duration::days(30), amount)],
    )
}

/// Decay confirmation requires the 90-day age and flips the plan exactly
/// once.
#[test]
fn decay_confirmation_gated_by_age() {
    let today = day(2026, 6, 1);
    let mut engine = build(today);

    let fresh = seed_plan(
        &mut engine,
        PlanKind::Withholding,
        vec![(1, today - Duration::days(10), 100_00)],
    );
    let err = engine.confirm_decay(OWNER, fresh).unwrap_err();
    assert!(matches!(err, PlanError::Conflict(_)), "got {err:?}");

    let aged = seed_aged_withholding(&mut engine, today);
    let kpi = engine.confirm_decay(OWNER, aged).expect("eligible plan decays");
    assert_eq!(kpi.status, PlanStatus::Decayed);

    let plan = engine.store().get_plan(aged).unwrap();
    assert_eq!(plan.status, PlanStatus::Decayed);
    assert_eq!(plan.decayed_at, Some(today));

    let again = engine.confirm_decay(OWNER, aged).unwrap_err();
    assert!(matches!(again, PlanError::Conflict(_)), "got {again:?}");
}

/// Preview is a pure read: identical numbers on repeat calls, no link row
/// appears.
#[test]
fn preview_is_pure_and_repeatable() {
    let today = day(2026, 6, 1);
    let mut engine = build(today);
    let withholding = seed_aged_withholding(&mut engine, today);
    let portal = seed_portal(&mut engine, today, 600_00);

    let first = engine.preview_surcharge(OWNER, withholding, portal).unwrap();
    let second = engine.preview_surcharge(OWNER, withholding, portal).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.residual_cents, 500_00);
    assert_eq!(first.portal_total_cents, 600_00);
    assert_eq!(first.delta_cents, 100_00);
    assert_eq!(
        engine.store().surcharge_link_for_plan(withholding).unwrap(),
        None,
        "preview must not create a link"
    );
}

/// Delta keeps its sign in the preview; the stored surcharge clamps at
/// zero when the portal plan is the cheaper side.
#[test]
fn preview_delta_signed_but_surcharge_clamped() {
    let today = day(2026, 6, 1);
    let mut engine = build(today);
    let withholding = seed_aged_withholding(&mut engine, today);
    let cheap_portal = seed_portal(&mut engine, today, 400_00);
    engine.confirm_decay(OWNER, withholding).unwrap();

    let preview = engine
        .preview_surcharge(OWNER, withholding, cheap_portal)
        .unwrap();
    assert_eq!(preview.delta_cents, -100_00, "a saving shows as negative");

    let outcome = engine
        .link_with_surcharge(OWNER, withholding, cheap_portal, None, &CancelToken::new())
        .unwrap()
        .unwrap();
    assert_eq!(outcome.result.surcharge_cents, 0);
}

#[test]
fn linking_requires_decayed_or_interrupted_source() {
    let today = day(2026, 6, 1);
    let mut engine = build(today);
    let withholding = seed_aged_withholding(&mut engine, today);
    let portal = seed_portal(&mut engine, today, 600_00);

    let err = engine
        .link_with_surcharge(OWNER, withholding, portal, None, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, PlanError::Conflict(_)), "got {err:?}");
}

/// Relinking to a different portal plan replaces the old link: exactly
/// one active link survives, pointing at the new target.
#[test]
fn relink_keeps_single_cardinality() {
    let today = day(2026, 6, 1);
    let mut engine = build(today);
    let withholding = seed_aged_withholding(&mut engine, today);
    let portal_x = seed_portal(&mut engine, today, 600_00);
    let portal_y = seed_portal(&mut engine, today, 800_00);
    let cancel = CancelToken::new();
    engine.confirm_decay(OWNER, withholding).unwrap();

    let first = engine
        .link_with_surcharge(OWNER, withholding, portal_x, None, &cancel)
        .unwrap()
        .unwrap();
    assert_eq!(first.result.action, LinkAction::Created);
    assert_eq!(first.result.surcharge_cents, 100_00);

    let second = engine
        .link_with_surcharge(OWNER, withholding, portal_y, Some("better terms"), &cancel)
        .unwrap()
        .unwrap();
    assert_eq!(second.result.action, LinkAction::Updated);
    assert_eq!(second.result.surcharge_cents, 300_00);

    let link = engine
        .store()
        .surcharge_link_for_plan(withholding)
        .unwrap()
        .expect("one link present");
    assert_eq!(link.portal_plan_id, portal_y);
    assert_eq!(link.residual_cents, 500_00);
    assert_eq!(link.portal_total_cents, 800_00);
    assert_eq!(link.surcharge_cents, 300_00);
    assert_eq!(link.linked_on, today);
}

/// Unlink deletes the link and returns the withholding plan to ACTIVE,
/// clearing the decay stamp. A second unlink finds nothing.
#[test]
fn unlink_restores_the_withholding_plan() {
    let today = day(2026, 6, 1);
    let mut engine = build(today);
    let withholding = seed_aged_withholding(&mut engine, today);
    let portal = seed_portal(&mut engine, today, 600_00);
    let cancel = CancelToken::new();
    engine.confirm_decay(OWNER, withholding).unwrap();
    engine
        .link_with_surcharge(OWNER, withholding, portal, None, &cancel)
        .unwrap()
        .unwrap();

    let outcome = engine
        .unlink_surcharge(OWNER, withholding, Some("reinstated"), &cancel)
        .unwrap()
        .unwrap();
    assert!(outcome.result);

    let plan = engine.store().get_plan(withholding).unwrap();
    assert_eq!(plan.status, PlanStatus::Active);
    assert_eq!(plan.decayed_at, None);
    assert_eq!(engine.store().surcharge_link_for_plan(withholding).unwrap(), None);

    let err = engine
        .unlink_surcharge(OWNER, withholding, None, &cancel)
        .unwrap_err();
    assert!(matches!(err, PlanError::NotFound { .. }), "got {err:?}");
}

#[test]
fn kind_checks_on_both_ends() {
    let today = day(2026, 6, 1);
    let mut engine = build(today);
    let withholding = seed_aged_withholding(&mut engine, today);
    let portal = seed_portal(&mut engine, today, 600_00);
    let readmission = seed_plan(
        &mut engine,
        PlanKind::AmnestyReadmission,
        vec![(1, today + Duration::days(30), 100_00)],
    );

    let wrong_target = engine
        .preview_surcharge(OWNER, withholding, readmission)
        .unwrap_err();
    assert!(matches!(wrong_target, PlanError::Conflict(_)), "got {wrong_target:?}");

    let wrong_source = engine
        .preview_surcharge(OWNER, readmission, portal)
        .unwrap_err();
    assert!(matches!(wrong_source, PlanError::Conflict(_)), "got {wrong_source:?}");
}
