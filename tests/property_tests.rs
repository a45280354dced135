use clearing_core::market::clearing::ClearingMarket;
use clearing_core::market::matching::{match_orders, MatchingPolicy};
use clearing_core::market::rationing::{ration, RationingPolicy};
use clearing_core::portfolio::smoothing::SmoothingPolicy;
use clearing_core::portfolio::weighting::WeightingPolicy;
use clearing_core::prelude::*;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

fn grain() -> InstrumentId {
    InstrumentId::new("GRAIN")
}

/// Per-agent volumes on one side of a market: 1..8 agents, each asking
/// for up to 100 units.
fn arb_volumes(prefix: &'static str) -> impl Strategy<Value = BTreeMap<AgentId, f64>> {
    prop::collection::vec(0.01f64..100.0, 1..8).prop_map(move |quantities| {
        quantities
            .into_iter()
            .enumerate()
            .map(|(i, q)| (AgentId::new(format!("{}{}", prefix, i)), q))
            .collect()
    })
}

fn arb_rationing() -> impl Strategy<Value = RationingPolicy> {
    prop_oneof![
        Just(RationingPolicy::Homogeneous),
        (0.0f64..=1.0).prop_map(|inhomogeneity| RationingPolicy::RandomDeny { inhomogeneity }),
    ]
}

/// A book of bids and asks with positive quantities and prices.
fn arb_book() -> impl Strategy<Value = (Vec<Order>, Vec<Order>)> {
    let bid = (0.1f64..20.0, 0.5f64..4.0);
    let ask = (0.1f64..20.0, 0.5f64..4.0);
    (
        prop::collection::vec(bid, 1..6),
        prop::collection::vec(ask, 1..6),
    )
        .prop_map(|(bids, asks)| {
            let bids = bids
                .into_iter()
                .enumerate()
                .map(|(i, (qty, price))| {
                    Order::new(
                        OrderId(i as u64),
                        AgentId::new(format!("B{}", i)),
                        grain(),
                        Side::Bid,
                        qty,
                        price,
                    )
                })
                .collect::<Vec<_>>();
            let asks = asks
                .into_iter()
                .enumerate()
                .map(|(i, (qty, price))| {
                    Order::new(
                        OrderId(100 + i as u64),
                        AgentId::new(format!("S{}", i)),
                        grain(),
                        Side::Ask,
                        qty,
                        price,
                    )
                })
                .collect::<Vec<_>>();
            (bids, asks)
        })
}

proptest! {
    // ===================================================================
    // INVARIANT 1: Rationing never allocates more than the short side.
    //
    // For any volumes and any policy, sum(allocated) <= min(S, D).
    // ===================================================================
    #[test]
    fn rationing_never_exceeds_short_side(
        demand in arb_volumes("B"),
        supply in arb_volumes("S"),
        policy in arb_rationing(),
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let decision = ration(&grain(), &demand, &supply, &policy, &mut rng);
        let total_demand: f64 = demand.values().sum();
        let total_supply: f64 = supply.values().sum();
        prop_assert!(
            decision.total_allocated() <= total_demand.min(total_supply) + 1e-9,
            "allocated {} exceeds min(S, D) = {}",
            decision.total_allocated(),
            total_demand.min(total_supply)
        );
    }

    // ===================================================================
    // INVARIANT 2: No agent is allocated more than it requested.
    // ===================================================================
    #[test]
    fn rationing_never_over_allocates_an_agent(
        demand in arb_volumes("B"),
        supply in arb_volumes("S"),
        policy in arb_rationing(),
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let decision = ration(&grain(), &demand, &supply, &policy, &mut rng);
        for (agent, allocated) in &decision.allocated {
            let requested = decision.requested.get(agent).copied().unwrap_or(0.0);
            prop_assert!(
                *allocated <= requested + 1e-9,
                "agent {} allocated {} over requested {}",
                agent,
                allocated,
                requested
            );
        }
    }

    // ===================================================================
    // INVARIANT 3: Random-deny with zero inhomogeneity IS homogeneous,
    // for every seed.
    // ===================================================================
    #[test]
    fn random_deny_zero_equals_homogeneous(
        demand in arb_volumes("B"),
        supply in arb_volumes("S"),
        seed in any::<u64>(),
    ) {
        let homogeneous = ration(
            &grain(),
            &demand,
            &supply,
            &RationingPolicy::Homogeneous,
            &mut StdRng::seed_from_u64(seed),
        );
        let random_deny = ration(
            &grain(),
            &demand,
            &supply,
            &RationingPolicy::RandomDeny { inhomogeneity: 0.0 },
            &mut StdRng::seed_from_u64(seed),
        );
        prop_assert_eq!(homogeneous.allocated, random_deny.allocated);
        prop_assert_eq!(homogeneous.rationed_side, random_deny.rationed_side);
    }

    // ===================================================================
    // INVARIANT 4: Weighting output always sums to one.
    //
    // Any non-empty vector of finite returns, any beta >= 0.
    // ===================================================================
    #[test]
    fn weights_sum_to_one(
        returns in prop::collection::vec(-10.0f64..10.0, 1..12),
        beta in 0.0f64..50.0,
    ) {
        for policy in [WeightingPolicy::Homogeneous, WeightingPolicy::Logit { beta }] {
            let weights = policy.weights(&returns);
            let sum: f64 = weights.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-9, "weights sum to {}", sum);
            for w in &weights {
                prop_assert!(*w >= 0.0);
            }
        }
    }

    // ===================================================================
    // INVARIANT 5: Smoothing preserves the weight contract.
    //
    // Given two valid weight vectors, the smoothed result is non-negative
    // and sums to one.
    // ===================================================================
    #[test]
    fn smoothing_preserves_weight_contract(
        (raw_returns, prev_returns) in (1usize..8).prop_flat_map(|n| (
            prop::collection::vec(-5.0f64..5.0, n),
            prop::collection::vec(-5.0f64..5.0, n),
        )),
        floor in 0.0f64..0.5,
        weight in 0.0f64..=1.0,
        beta in 0.0f64..10.0,
    ) {
        let weighting = WeightingPolicy::Logit { beta };
        let raw = weighting.weights(&raw_returns);
        let previous = weighting.weights(&prev_returns);

        for policy in [
            SmoothingPolicy::FloorBlend { floor },
            SmoothingPolicy::NoSuddenIncrease { weight },
        ] {
            let smoothed = policy.smooth(Some(&previous), &raw);
            let sum: f64 = smoothed.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-9, "smoothed sum {}", sum);
            for w in &smoothed {
                prop_assert!(*w >= 0.0, "negative smoothed weight {}", w);
            }
        }
    }

    // ===================================================================
    // INVARIANT 6: Matching candidates respect order quantities.
    //
    // No order contributes more candidate volume than it asked for, and
    // matching is deterministic for a fixed seed.
    // ===================================================================
    #[test]
    fn matching_respects_order_quantities(
        (bids, asks) in arb_book(),
        forager in any::<bool>(),
        seed in any::<u64>(),
    ) {
        let policy = if forager {
            MatchingPolicy::Forager
        } else {
            MatchingPolicy::PricePriority
        };
        let (outcome, _) = match_orders(&bids, &asks, &policy, &mut StdRng::seed_from_u64(seed));

        let mut per_order: BTreeMap<OrderId, f64> = BTreeMap::new();
        for candidate in &outcome.candidates {
            *per_order.entry(candidate.bid).or_insert(0.0) += candidate.quantity;
            *per_order.entry(candidate.ask).or_insert(0.0) += candidate.quantity;
        }
        for order in bids.iter().chain(asks.iter()) {
            let matched = per_order.get(&order.id()).copied().unwrap_or(0.0);
            prop_assert!(
                matched <= order.quantity() + 1e-9,
                "order {} matched {} over quantity {}",
                order.id(),
                matched,
                order.quantity()
            );
        }

        let (again, _) = match_orders(&bids, &asks, &policy, &mut StdRng::seed_from_u64(seed));
        prop_assert_eq!(outcome.candidates, again.candidates);
    }

    // ===================================================================
    // INVARIANT 7: A settled round conserves cash exactly.
    //
    // Whatever the book and policies, total system cash after settlement
    // equals total cash before, to the last decimal digit.
    // ===================================================================
    #[test]
    fn settlement_conserves_cash(
        (bids, asks) in arb_book(),
        policy in arb_rationing(),
        seed in any::<u64>(),
    ) {
        let mut registry = InstrumentRegistry::new();
        registry.insert(Instrument::new(
            grain(),
            InstrumentClass::Goods { sector: "agriculture".into() },
            2.0,
        ));

        let mut ledger = Ledger::new();
        for order in bids.iter().chain(asks.iter()) {
            // Deep pockets and deep inventory: feasibility is not what
            // this property is about.
            ledger.register(
                order.agent().clone(),
                AgentRole::Household,
                BalanceSheet::with_cash(Decimal::from(1_000_000))
                    .with_holding(grain(), 1_000.0),
            );
        }
        let cash_before = ledger.total_cash();

        let mut market = ClearingMarket::new("goods", MatchingPolicy::PricePriority, policy);
        for order in bids.iter().chain(asks.iter()) {
            market
                .submit(
                    order.agent().clone(),
                    OrderRequest {
                        instrument: grain(),
                        side: order.side(),
                        quantity: order.quantity(),
                        limit_price: order.limit_price(),
                    },
                )
                .unwrap();
        }

        let mut log = SettlementLog::new();
        let mut rng = StdRng::seed_from_u64(seed);
        let report = market
            .clear(&mut ledger, &registry, &mut log, 0, &mut rng)
            .unwrap();

        prop_assert_eq!(ledger.total_cash(), cash_before);

        // Per-trade conservation: each trade moved exactly cost between
        // exactly two agents, so the goods moved too.
        let moved: f64 = report.reports[0].trades.iter().map(|t| t.quantity()).sum();
        let held: f64 = ledger
            .agents()
            .map(|a| ledger.sheet(a).unwrap().holding(&grain()))
            .sum();
        let agents = ledger.len() as f64;
        prop_assert!((held - agents * 1_000.0).abs() < 1e-6 * agents.max(1.0) + 1e-9);
        prop_assert!(moved >= 0.0);
    }

    // ===================================================================
    // INVARIANT 8: Liquidation pays no creditor more than its claim and
    // never more than the proceeds, whatever the sheet looks like.
    // ===================================================================
    #[test]
    fn liquidation_waterfall_is_bounded(
        cash in 0u64..500,
        claims in prop::collection::vec((1u64..200, any::<bool>()), 1..6),
        seed in any::<u64>(),
    ) {
        let registry = InstrumentRegistry::new();
        let mut ledger = Ledger::new();
        let bank = AgentId::new("BANK-BAD");
        ledger.register(bank.clone(), AgentRole::Bank, BalanceSheet::with_cash(Decimal::from(cash)));
        ledger.register(
            AgentId::new("GOV"),
            AgentRole::Government,
            BalanceSheet::new(),
        );
        ledger.register(
            AgentId::new("BADBANK"),
            AgentRole::BadBank,
            BalanceSheet::with_cash(Decimal::from(1_000_000)),
        );
        for (i, (amount, secured)) in claims.iter().enumerate() {
            let creditor = AgentId::new(format!("CR-{}", i));
            ledger.register(creditor.clone(), AgentRole::Bank, BalanceSheet::new());
            ledger.add_claim(
                &bank,
                &creditor,
                Decimal::from(*amount),
                if *secured { Seniority::Secured } else { Seniority::Unsecured },
            );
        }

        let engine = ResolutionEngine::new(
            ResolutionStrategy::LiquidateOnly,
            AgentId::new("GOV"),
            AgentId::new("BADBANK"),
            0.08,
        );
        let mut rng = StdRng::seed_from_u64(seed);
        let reports = engine.resolve_all(&mut ledger, &registry, &mut rng).unwrap();

        // The bank may not be insolvent at all; then nothing happens.
        if let Some(report) = reports.first() {
            let liquidation = report.liquidation.as_ref().unwrap();
            let mut paid_total = Decimal::ZERO;
            for payout in &liquidation.payouts {
                prop_assert!(payout.paid <= payout.claim);
                prop_assert!(payout.paid >= Decimal::ZERO);
                prop_assert_eq!(payout.loss, payout.claim - payout.paid);
                paid_total += payout.paid;
            }
            prop_assert!(paid_total <= liquidation.proceeds);
        }
    }
}
