//! plan-runner: headless exerciser for the rateation engine.
//!
//! Usage:
//!   plan-runner --db plans.db
//!   plan-runner --today 2026-03-01
//!   plan-runner --json
//!
//! Seeds a small demo portfolio, walks the migration workflows end to end,
//! and prints a KPI summary (human text, or JSON with --json). Money is
//! formatted as euros here and nowhere else; the engine speaks cents only.

use anyhow::Result;
use chrono::{Months, NaiveDate};
use rateation_core::{
    cache::CancelToken,
    clock::PlanClock,
    engine::PlanEngine,
    kpi::{PlanKpi, PlanRisk, PortfolioKpi},
    model::{NewInstallment, NewPlan, PaymentMode, PlanKind},
    schedule::{Frequency, ScheduleSpec},
    store::PlanStore,
    types::Cents,
};
use serde::Serialize;
use std::env;

const OWNER: &str = "desk";

/// Machine-readable summary for `--json`.
#[derive(Serialize)]
struct PortfolioJson {
    today: NaiveDate,
    plans: Vec<PlanKpi>,
    totals: Option<PortfolioKpi>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = string_arg(&args, "--db").unwrap_or_else(|| ":memory:".to_string());
    let json_mode = args.iter().any(|a| a == "--json");
    let today = match string_arg(&args, "--today") {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")?,
        None => chrono::Local::now().date_naive(),
    };

    if !json_mode {
        println!("plan-runner");
        println!("  db:    {db}");
        println!("  today: {today}");
        println!();
    }

    let store = if db == ":memory:" {
        PlanStore::in_memory()?
    } else {
        PlanStore::open(&db)?
    };
    store.migrate()?;

    let mut engine = PlanEngine::new(store, PlanClock::fixed(today));
    engine.subscribe(Box::new(|event| {
        log::info!("event: {}", event.type_name());
    }));

    seed_and_exercise(&mut engine, today, !json_mode)?;

    if json_mode {
        let overview = engine.portfolio(OWNER);
        let summary = PortfolioJson {
            today,
            plans: overview.plans,
            totals: overview.totals,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&mut engine)?;
    }
    Ok(())
}

fn seed_and_exercise(engine: &mut PlanEngine, today: NaiveDate, verbose: bool) -> Result<()> {
    let cancel = CancelToken::new();

    // Portal plan with six months already behind it: overdue installments
    // eat into the skip budget.
    let portal = engine.create_plan(
        OWNER,
        &NewPlan {
            kind: PlanKind::Portal,
            taxpayer: Some("Rossi SRL".into()),
            note: Some("demo portal plan".into()),
        },
        &ScheduleSpec::Generated {
            first_due: today - Months::new(6),
            count: 10,
            amount_cents: 150_00,
            frequency: Frequency::Monthly,
        },
    )?;
    engine.mark_installment_paid(
        OWNER,
        portal,
        1,
        today - Months::new(6),
        PaymentMode::Ordinary,
        0,
        0,
        &cancel,
    )?;
    engine.mark_installment_paid(
        OWNER,
        portal,
        2,
        today - Months::new(4),
        PaymentMode::PenaltyAdjusted,
        12_50,
        3_75,
        &cancel,
    )?;

    // Withholding plan whose unpaid run is more than 90 days old: decay
    // confirmation territory.
    let withholding = engine.create_plan(
        OWNER,
        &NewPlan {
            kind: PlanKind::Withholding,
            taxpayer: Some("Bianchi SPA".into()),
            note: None,
        },
        &ScheduleSpec::Generated {
            first_due: today - Months::new(8),
            count: 6,
            amount_cents: 420_00,
            frequency: Frequency::Monthly,
        },
    )?;
    engine.mark_installment_paid(
        OWNER,
        withholding,
        1,
        today - Months::new(8),
        PaymentMode::Ordinary,
        0,
        0,
        &cancel,
    )?;

    // Readmission plan, explicit schedule.
    let readmission = engine.create_plan(
        OWNER,
        &NewPlan {
            kind: PlanKind::AmnestyReadmission,
            taxpayer: Some("Rossi SRL".into()),
            note: Some("quater readmission".into()),
        },
        &ScheduleSpec::Explicit {
            installments: vec![
                NewInstallment {
                    seq: 1,
                    due_date: Some(today + Months::new(1)),
                    amount_cents: 300_00,
                },
                NewInstallment {
                    seq: 2,
                    due_date: Some(today + Months::new(4)),
                    amount_cents: 300_00,
                },
            ],
        },
    )?;

    // Debts riding on the portal plan.
    let mut debt_ids = Vec::new();
    for (number, amount) in [
        ("R-2024-0011", 90_00),
        ("R-2024-0042", 210_00),
        ("R-2025-0007", 55_00),
    ] {
        let debt_id = engine.store().insert_debt(number, amount)?;
        engine.store().attach_debt(portal, debt_id)?;
        debt_ids.push(debt_id);
    }

    if verbose {
        println!("=== DEBT MIGRATION ===");
    }
    let migrated = engine
        .migrate_debts(OWNER, portal, &debt_ids[..2], readmission, None, &cancel)?
        .map(|outcome| outcome.result)
        .unwrap_or_default();
    if verbose {
        println!("  migrated {} debts to plan {readmission}", migrated.len());
        println!(
            "  portal active debts now: {:?}",
            engine.store().active_debt_ids(portal)?
        );
    }
    let rolled_back = engine
        .rollback_debt_migration(OWNER, portal, &migrated, &cancel)?
        .map(|outcome| outcome.result)
        .unwrap_or_default();
    if verbose {
        println!("  rolled back {} debts", rolled_back.len());
        println!(
            "  portal active debts restored: {:?}",
            engine.store().active_debt_ids(portal)?
        );
        println!();
        println!("=== DECAY + SURCHARGE LINK ===");
    }

    engine.confirm_decay(OWNER, withholding)?;
    let preview = engine.preview_surcharge(OWNER, withholding, portal)?;
    if verbose {
        println!(
            "  preview: residual {} vs portal total {} -> delta {}",
            euros(preview.residual_cents),
            euros(preview.portal_total_cents),
            euros(preview.delta_cents),
        );
    }
    let linked = engine.link_with_surcharge(
        OWNER,
        withholding,
        portal,
        Some("decayed F24 folded into PagoPA"),
        &cancel,
    )?;
    if verbose {
        if let Some(outcome) = linked {
            println!(
                "  link {:?}: surcharge {}",
                outcome.result.action,
                euros(outcome.result.surcharge_cents),
            );
        }
        println!();
    }
    Ok(())
}

fn print_summary(engine: &mut PlanEngine) -> Result<()> {
    println!("=== PORTFOLIO SUMMARY ===");
    let overview = engine.portfolio(OWNER);
    for kpi in &overview.plans {
        print_plan(kpi);
    }
    if let Some(totals) = &overview.totals {
        println!(
            "  TOTAL ({} active plans) | due {} | paid {} | residual {} | overdue {}",
            totals.plan_count,
            euros(totals.total_due_cents),
            euros(totals.total_paid_cents),
            euros(totals.residual_cents),
            euros(totals.total_overdue_cents),
        );
    }

    println!();
    println!("=== RECENT EVENTS ===");
    for entry in engine.recent_events(8)? {
        println!("  {} {}", entry.recorded_on, entry.event_type);
    }
    Ok(())
}

fn print_plan(kpi: &PlanKpi) {
    println!(
        "  plan {} [{:?}/{:?}] | due {} | paid {} | residual {} | {}/{} paid",
        kpi.plan_id,
        kpi.kind,
        kpi.status,
        euros(kpi.total_due_cents),
        euros(kpi.total_paid_cents),
        euros(kpi.residual_cents),
        kpi.paid_count,
        kpi.installment_count,
    );
    match &kpi.risk {
        PlanRisk::Portal(skip) => println!(
            "      skips: {}/{} used, {} remaining{}",
            skip.unpaid_overdue_today,
            skip.max_skips,
            skip.skip_remaining,
            if skip.at_risk { "  AT RISK" } else { "" },
        ),
        PlanRisk::Withholding(window) => match (window.days_remaining, window.band) {
            (Some(days), Some(band)) => println!(
                "      next due in {days} day(s) ({band:?}){}",
                if window.at_risk { "  AT RISK" } else { "" },
            ),
            _ => println!("      no upcoming installments"),
        },
        PlanRisk::None => {}
    }
}

fn euros(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    format!("EUR {sign}{}.{:02}", (cents / 100).abs(), (cents % 100).abs())
}

fn string_arg(args: &[String], flag: &str) -> Option<String> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].clone())
}
