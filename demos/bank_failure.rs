//! Bankruptcy resolution: bailout, and the liquidation fallback.
//!
//! The same insolvent bank is resolved twice — once with a funded
//! capital provider, once with an empty one — to show both paths of the
//! bailout-or-liquidation decision.

use clearing_core::prelude::*;
use clearing_core::resolution::ResolutionEngine;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal_macros::dec;

fn insolvent_world(provider_cash: Money) -> (Ledger, InstrumentRegistry) {
    let registry = InstrumentRegistry::new();
    let mut ledger = Ledger::new();
    ledger.register(
        AgentId::new("BANK-BAD"),
        AgentRole::Bank,
        BalanceSheet::with_cash(dec!(80)),
    );
    ledger.register(
        AgentId::new("BANK-OK"),
        AgentRole::Bank,
        BalanceSheet::with_cash(dec!(500)),
    );
    ledger.register(
        AgentId::new("GOV"),
        AgentRole::Government,
        BalanceSheet::with_cash(provider_cash),
    );
    ledger.register(
        AgentId::new("BADBANK"),
        AgentRole::BadBank,
        BalanceSheet::with_cash(dec!(1000)),
    );
    ledger.register(
        AgentId::new("DEPOSITOR"),
        AgentRole::Household,
        BalanceSheet::new(),
    );
    ledger.register(
        AgentId::new("LENDER"),
        AgentRole::Fund,
        BalanceSheet::new(),
    );
    // Assets 80 against liabilities 100: equity -20.
    ledger.add_claim(
        &AgentId::new("BANK-BAD"),
        &AgentId::new("LENDER"),
        dec!(40),
        Seniority::Secured,
    );
    ledger.add_claim(
        &AgentId::new("BANK-BAD"),
        &AgentId::new("DEPOSITOR"),
        dec!(60),
        Seniority::Unsecured,
    );
    (ledger, registry)
}

fn describe(ledger: &Ledger, registry: &InstrumentRegistry, agents: &[&str]) {
    for agent in agents {
        let id = AgentId::new(*agent);
        let sheet = ledger.sheet(&id).unwrap();
        println!(
            "  {:10} cash {:>8}  equity {:>8}",
            agent,
            sheet.cash(),
            sheet.equity(registry)
        );
    }
}

fn main() {
    env_logger::init();

    println!("╔════════════════════════════════════════════╗");
    println!("║  clearing-core: Bank Failure Resolution    ║");
    println!("╚════════════════════════════════════════════╝\n");

    let agents = ["BANK-BAD", "BANK-OK", "GOV", "BADBANK", "DEPOSITOR", "LENDER"];

    // --- Scenario 1: the provider can fund the bailout ---
    println!("━━━ Scenario 1: Funded bailout ━━━\n");
    let (mut ledger, registry) = insolvent_world(dec!(100));
    describe(&ledger, &registry, &agents);

    let engine = ResolutionEngine::new(
        ResolutionStrategy::BailoutThenLiquidate,
        AgentId::new("GOV"),
        AgentId::new("BADBANK"),
        0.0625,
    );
    let mut rng = StdRng::seed_from_u64(7);
    let reports = engine
        .resolve_all(&mut ledger, &registry, &mut rng)
        .expect("resolution conserves value");

    let report = &reports[0];
    println!(
        "\n  -> {} required {} of recapitalization; outcome {:?}\n",
        report.case.institution, report.case.required_recapitalization, report.case.status
    );
    describe(&ledger, &registry, &agents);

    // --- Scenario 2: the provider refuses; liquidation fallback ---
    println!("\n━━━ Scenario 2: Refused bailout, liquidation ━━━\n");
    let (mut ledger, registry) = insolvent_world(dec!(0));
    describe(&ledger, &registry, &agents);

    let mut rng = StdRng::seed_from_u64(7);
    let reports = engine
        .resolve_all(&mut ledger, &registry, &mut rng)
        .expect("resolution conserves value");

    let report = &reports[0];
    println!(
        "\n  -> bailout refused: {}",
        report.bailout_refusal.as_deref().unwrap_or("-")
    );
    let liquidation = report.liquidation.as_ref().unwrap();
    println!(
        "  -> liquidated: proceeds {}, shortfall {}",
        liquidation.proceeds, liquidation.shortfall
    );
    for payout in &liquidation.payouts {
        println!(
            "     {:10} claim {:>6} ({:?})  paid {:>6}  loss {:>6}",
            payout.creditor, payout.claim, payout.seniority, payout.paid, payout.loss
        );
    }
    for (creditor, substitute) in &liquidation.reassignments {
        println!("     {} reassigned to {}", creditor, substitute);
    }
    println!();
    describe(&ledger, &registry, &agents);
}
