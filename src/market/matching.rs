use crate::core::agent::AgentId;
use crate::core::order::{Order, OrderId, Side};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Strategy used to pair bids with asks.
///
/// Matching operates on the common order capability set (instrument,
/// side, quantity, limit price); the instrument class never changes the
/// pairing logic. Both variants are deterministic given a fixed arrival
/// order and a seeded generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchingPolicy {
    /// Best price first: bids descending by limit, asks ascending,
    /// arrival order as the stable tie-break. Pairs only price-compatible
    /// orders (bid limit ≥ ask limit).
    PricePriority,
    /// Greedy forager: each demander, in arrival order, scans suppliers
    /// in a seeded random permutation and takes the first one with
    /// anything left, regardless of price. Trades allocative optimality
    /// for behavioural realism.
    Forager,
}

/// A candidate pairing produced by matching.
///
/// Candidate quantities are capped by the order quantities on each side
/// but ignore agent-level capacity (budget, inventory); rationing cuts
/// the round down to feasibility before anything settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub bid: OrderId,
    pub ask: OrderId,
    pub buyer: AgentId,
    pub seller: AgentId,
    pub quantity: f64,
    /// Negotiated execution price for the pair.
    pub price: f64,
}

/// An order (or remainder of one) that found no counterparty.
///
/// This is a normal market outcome reported back to the originating
/// agent, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedOrder {
    pub order: OrderId,
    pub agent: AgentId,
    pub side: Side,
    pub unfilled_quantity: f64,
}

/// Result of one matching pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub candidates: Vec<CandidateMatch>,
    pub unmatched: Vec<UnmatchedOrder>,
}

impl MatchOutcome {
    /// Total candidate quantity.
    pub fn matched_quantity(&self) -> f64 {
        self.candidates.iter().map(|c| c.quantity).sum()
    }
}

/// Negotiated execution price for a bid/ask pair.
///
/// The buyer's limit takes priority when it does not exceed the seller's;
/// otherwise the pair is assumed to negotiate and meet at the midpoint.
fn execution_price(bid: &Order, ask: &Order) -> f64 {
    if bid.limit_price() <= ask.limit_price() {
        bid.limit_price()
    } else {
        0.5 * (bid.limit_price() + ask.limit_price())
    }
}

/// The ordering a policy walks each side in. Computed once per round and
/// reused by the settlement pairing, so matching and settlement see the
/// same sequence.
#[derive(Debug, Clone)]
pub struct PairingOrder {
    /// Indices into the bid slice.
    pub bids: Vec<usize>,
    /// Indices into the ask slice.
    pub asks: Vec<usize>,
    /// Whether pairing requires bid limit ≥ ask limit.
    pub price_gated: bool,
}

impl MatchingPolicy {
    /// Decide the walk order for both sides of the book.
    pub fn pairing_order(&self, bids: &[Order], asks: &[Order], rng: &mut StdRng) -> PairingOrder {
        match self {
            MatchingPolicy::PricePriority => {
                let mut bid_idx: Vec<usize> = (0..bids.len()).collect();
                // Stable sort keeps arrival order within a price level.
                bid_idx.sort_by(|&a, &b| {
                    bids[b]
                        .limit_price()
                        .partial_cmp(&bids[a].limit_price())
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                let mut ask_idx: Vec<usize> = (0..asks.len()).collect();
                ask_idx.sort_by(|&a, &b| {
                    asks[a]
                        .limit_price()
                        .partial_cmp(&asks[b].limit_price())
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                PairingOrder {
                    bids: bid_idx,
                    asks: ask_idx,
                    price_gated: true,
                }
            }
            MatchingPolicy::Forager => {
                let bid_idx: Vec<usize> = (0..bids.len()).collect();
                let mut ask_idx: Vec<usize> = (0..asks.len()).collect();
                ask_idx.shuffle(rng);
                PairingOrder {
                    bids: bid_idx,
                    asks: ask_idx,
                    price_gated: false,
                }
            }
        }
    }
}

/// Walk the book in pairing order and produce trades of up to the given
/// per-order capacities.
///
/// `bid_capacity` / `ask_capacity` run parallel to the order slices.
/// Matching calls this with full order quantities to produce candidates;
/// settlement calls it again with rationed capacities so that final
/// fills respect the rationing decision exactly.
pub fn pair_capacities(
    bids: &[Order],
    asks: &[Order],
    order: &PairingOrder,
    bid_capacity: &mut [f64],
    ask_capacity: &mut [f64],
) -> Vec<CandidateMatch> {
    let mut matches = Vec::new();
    for &bi in &order.bids {
        let bid = &bids[bi];
        if bid_capacity[bi] <= 0.0 {
            continue;
        }
        for &ai in &order.asks {
            if bid_capacity[bi] <= 0.0 {
                break;
            }
            let ask = &asks[ai];
            if ask_capacity[ai] <= 0.0 {
                continue;
            }
            if order.price_gated && bid.limit_price() < ask.limit_price() {
                continue;
            }
            let quantity = bid_capacity[bi].min(ask_capacity[ai]);
            bid_capacity[bi] -= quantity;
            ask_capacity[ai] -= quantity;
            matches.push(CandidateMatch {
                bid: bid.id(),
                ask: ask.id(),
                buyer: bid.agent().clone(),
                seller: ask.agent().clone(),
                quantity,
                price: execution_price(bid, ask),
            });
        }
    }
    matches
}

/// Match bids against asks under the given policy.
///
/// Orders with no compatible counterparty (or with quantity left after
/// every compatible counterparty is exhausted) are reported unmatched.
pub fn match_orders(
    bids: &[Order],
    asks: &[Order],
    policy: &MatchingPolicy,
    rng: &mut StdRng,
) -> (MatchOutcome, PairingOrder) {
    let order = policy.pairing_order(bids, asks, rng);

    let mut bid_capacity: Vec<f64> = bids.iter().map(|o| o.quantity()).collect();
    let mut ask_capacity: Vec<f64> = asks.iter().map(|o| o.quantity()).collect();
    let candidates = pair_capacities(bids, asks, &order, &mut bid_capacity, &mut ask_capacity);

    let mut unmatched = Vec::new();
    for (i, remaining) in bid_capacity.iter().enumerate() {
        if *remaining > 0.0 {
            unmatched.push(UnmatchedOrder {
                order: bids[i].id(),
                agent: bids[i].agent().clone(),
                side: Side::Bid,
                unfilled_quantity: *remaining,
            });
        }
    }
    for (i, remaining) in ask_capacity.iter().enumerate() {
        if *remaining > 0.0 {
            unmatched.push(UnmatchedOrder {
                order: asks[i].id(),
                agent: asks[i].agent().clone(),
                side: Side::Ask,
                unfilled_quantity: *remaining,
            });
        }
    }

    (MatchOutcome { candidates, unmatched }, order)
}

/// Per-agent quantity that could trade at some compatible price.
///
/// For the demand side this sums bids whose limit reaches the lowest ask;
/// for the supply side, asks whose limit is reachable by the highest bid.
/// The forager policy is not price-gated, so everything is marketable.
pub fn marketable_volumes(
    bids: &[Order],
    asks: &[Order],
    policy: &MatchingPolicy,
) -> (BTreeMap<AgentId, f64>, BTreeMap<AgentId, f64>) {
    let mut demand: BTreeMap<AgentId, f64> = BTreeMap::new();
    let mut supply: BTreeMap<AgentId, f64> = BTreeMap::new();

    let price_gated = matches!(policy, MatchingPolicy::PricePriority);
    let best_ask = asks
        .iter()
        .map(|o| o.limit_price())
        .fold(f64::INFINITY, f64::min);
    let best_bid = bids
        .iter()
        .map(|o| o.limit_price())
        .fold(f64::NEG_INFINITY, f64::max);

    for bid in bids {
        if !price_gated || bid.limit_price() >= best_ask {
            *demand.entry(bid.agent().clone()).or_insert(0.0) += bid.quantity();
        }
    }
    for ask in asks {
        if !price_gated || ask.limit_price() <= best_bid {
            *supply.entry(ask.agent().clone()).or_insert(0.0) += ask.quantity();
        }
    }
    (demand, supply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instrument::InstrumentId;
    use rand::SeedableRng;

    fn bid(id: u64, agent: &str, qty: f64, price: f64) -> Order {
        Order::new(
            OrderId(id),
            AgentId::new(agent),
            InstrumentId::new("GRAIN"),
            Side::Bid,
            qty,
            price,
        )
    }

    fn ask(id: u64, agent: &str, qty: f64, price: f64) -> Order {
        Order::new(
            OrderId(id),
            AgentId::new(agent),
            InstrumentId::new("GRAIN"),
            Side::Ask,
            qty,
            price,
        )
    }

    #[test]
    fn test_price_priority_scenario() {
        // Three bids (10, 10, 10 at 5, 4, 3) against two asks (15, 5 at
        // 2, 2): all supply should find a counterparty, 20 units total,
        // with the best-priced bids served first.
        let bids = vec![
            bid(0, "B1", 10.0, 5.0),
            bid(1, "B2", 10.0, 4.0),
            bid(2, "B3", 10.0, 3.0),
        ];
        let asks = vec![ask(3, "S1", 15.0, 2.0), ask(4, "S2", 5.0, 2.0)];
        let mut rng = StdRng::seed_from_u64(7);

        let (outcome, _) = match_orders(&bids, &asks, &MatchingPolicy::PricePriority, &mut rng);
        assert!((outcome.matched_quantity() - 20.0).abs() < 1e-12);

        // The first bid is fully served before the second starts.
        assert_eq!(outcome.candidates[0].buyer.as_str(), "B1");
        assert!((outcome.candidates[0].quantity - 10.0).abs() < 1e-12);

        // Ten units of demand go unmatched, all on the worst-priced bid.
        let unmatched_demand: f64 = outcome
            .unmatched
            .iter()
            .filter(|u| u.side == Side::Bid)
            .map(|u| u.unfilled_quantity)
            .sum();
        assert!((unmatched_demand - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_price_priority_respects_limits() {
        // A bid below every ask limit stays unmatched.
        let bids = vec![bid(0, "B1", 5.0, 1.0)];
        let asks = vec![ask(1, "S1", 5.0, 2.0)];
        let mut rng = StdRng::seed_from_u64(7);

        let (outcome, _) = match_orders(&bids, &asks, &MatchingPolicy::PricePriority, &mut rng);
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.unmatched.len(), 2);
    }

    #[test]
    fn test_execution_price_negotiation() {
        // Buyer limit above seller limit: pair meets at the midpoint.
        let bids = vec![bid(0, "B1", 5.0, 4.0)];
        let asks = vec![ask(1, "S1", 5.0, 2.0)];
        let mut rng = StdRng::seed_from_u64(7);

        let (outcome, _) = match_orders(&bids, &asks, &MatchingPolicy::PricePriority, &mut rng);
        assert!((outcome.candidates[0].price - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_forager_is_seed_deterministic() {
        let bids: Vec<Order> = (0..6).map(|i| bid(i, &format!("B{}", i), 2.0, 1.5)).collect();
        let asks: Vec<Order> = (6..12).map(|i| ask(i, &format!("S{}", i), 2.0, 1.0)).collect();

        let (a, _) = match_orders(
            &bids,
            &asks,
            &MatchingPolicy::Forager,
            &mut StdRng::seed_from_u64(42),
        );
        let (b, _) = match_orders(
            &bids,
            &asks,
            &MatchingPolicy::Forager,
            &mut StdRng::seed_from_u64(42),
        );
        assert_eq!(a.candidates, b.candidates);
    }

    #[test]
    fn test_forager_matches_regardless_of_price() {
        // Forager demanders take what they find, even above their limit.
        let bids = vec![bid(0, "B1", 5.0, 1.0)];
        let asks = vec![ask(1, "S1", 5.0, 2.0)];
        let mut rng = StdRng::seed_from_u64(1);

        let (outcome, _) = match_orders(&bids, &asks, &MatchingPolicy::Forager, &mut rng);
        assert_eq!(outcome.candidates.len(), 1);
        // Buyer limit below seller limit: buyer price takes priority.
        assert!((outcome.candidates[0].price - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_marketable_volumes() {
        let bids = vec![
            bid(0, "B1", 10.0, 5.0),
            bid(1, "B2", 10.0, 4.0),
            bid(2, "B3", 10.0, 3.0),
            bid(3, "B4", 10.0, 1.0), // below the best ask, not marketable
        ];
        let asks = vec![ask(4, "S1", 15.0, 2.0), ask(5, "S2", 5.0, 2.0)];

        let (demand, supply) = marketable_volumes(&bids, &asks, &MatchingPolicy::PricePriority);
        let total_demand: f64 = demand.values().sum();
        let total_supply: f64 = supply.values().sum();
        assert!((total_demand - 30.0).abs() < 1e-12);
        assert!((total_supply - 20.0).abs() < 1e-12);
    }
}
