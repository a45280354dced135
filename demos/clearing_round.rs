//! One clearing round, step by step.
//!
//! Submits the canonical excess-demand book — three bids against two
//! asks — and walks through matching, rationing and settlement.

use clearing_core::market::clearing::ClearingMarket;
use clearing_core::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal_macros::dec;

fn main() {
    env_logger::init();

    println!("╔════════════════════════════════════════════╗");
    println!("║  clearing-core: One Clearing Round         ║");
    println!("╚════════════════════════════════════════════╝\n");

    let grain = InstrumentId::new("GRAIN");
    let mut registry = InstrumentRegistry::new();
    registry.insert(Instrument::new(
        grain.clone(),
        InstrumentClass::Goods {
            sector: "agriculture".into(),
        },
        2.0,
    ));

    let mut ledger = Ledger::new();
    for buyer in ["B1", "B2", "B3"] {
        ledger.register(
            AgentId::new(buyer),
            AgentRole::Household,
            BalanceSheet::with_cash(dec!(500)),
        );
    }
    for (seller, inventory) in [("S1", 15.0), ("S2", 5.0)] {
        ledger.register(
            AgentId::new(seller),
            AgentRole::Firm,
            BalanceSheet::new().with_holding(grain.clone(), inventory),
        );
    }

    let mut market = ClearingMarket::new(
        "goods",
        MatchingPolicy::PricePriority,
        RationingPolicy::Homogeneous,
    );

    let book = [
        ("B1", Side::Bid, 10.0, 5.0),
        ("B2", Side::Bid, 10.0, 4.0),
        ("B3", Side::Bid, 10.0, 3.0),
        ("S1", Side::Ask, 15.0, 2.0),
        ("S2", Side::Ask, 5.0, 2.0),
    ];
    println!("━━━ Order book ━━━\n");
    for (agent, side, qty, price) in book {
        println!("  {:4} {:3} {:>5.1} @ {:.1}", agent, side, qty, price);
        market
            .submit(
                AgentId::new(agent),
                OrderRequest {
                    instrument: grain.clone(),
                    side,
                    quantity: qty,
                    limit_price: price,
                },
            )
            .unwrap();
    }

    let mut log = SettlementLog::new();
    let mut rng = StdRng::seed_from_u64(42);
    let report = market
        .clear(&mut ledger, &registry, &mut log, 0, &mut rng)
        .expect("round settles");
    let grain_report = &report.reports[0];

    println!("\n━━━ Matching ━━━\n");
    println!("  candidate volume: {:.2}", grain_report.matched_quantity);

    println!("\n━━━ Rationing ━━━\n");
    let decision = &grain_report.rationing;
    match decision.rationed_side {
        Some(side) => {
            println!("  rationed side: {}", side);
            for (agent, allocated) in &decision.allocated {
                println!(
                    "  {:4} requested {:>5.2}, allocated {:>5.2}",
                    agent, decision.requested[agent], allocated
                );
            }
        }
        None => println!("  market balanced, nobody rationed"),
    }

    println!("\n━━━ Settlement ━━━\n");
    for trade in &grain_report.trades {
        println!(
            "  {} buys {:>5.2} from {} @ {:.2}  (cost {})",
            trade.buyer(),
            trade.quantity(),
            trade.seller(),
            trade.price(),
            trade.cost()
        );
    }
    for unmatched in &grain_report.unmatched {
        println!(
            "  {} left with {:.2} unfilled ({})",
            unmatched.agent, unmatched.unfilled_quantity, unmatched.side
        );
    }

    println!("\n━━━ Balance sheets after the round ━━━\n");
    for agent in ["B1", "B2", "B3", "S1", "S2"] {
        let sheet = ledger.sheet(&AgentId::new(agent)).unwrap();
        println!(
            "  {:4} cash {:>8}  grain {:>6.2}",
            agent,
            sheet.cash(),
            sheet.holding(&grain)
        );
    }
    println!("\n  total cash: {}", ledger.total_cash());
}
