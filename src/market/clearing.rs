use crate::core::agent::AgentId;
use crate::core::balance::{money_from_f64, Ledger, Money, Seniority};
use crate::core::instrument::{InstrumentId, InstrumentRegistry};
use crate::core::order::{Order, OrderBook, OrderId, OrderRequest, Side};
use crate::core::trade::{SettlementLog, Trade};
use crate::market::matching::{
    marketable_volumes, match_orders, pair_capacities, CandidateMatch, MatchingPolicy,
    UnmatchedOrder,
};
use crate::market::rationing::{ration, RationingDecision, RationingPolicy};
use log::{debug, info};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Fills below this quantity are settlement residue and are dropped.
const DUST_QUANTITY: f64 = 1e-9;

/// Phase of a clearing round.
///
/// `Matching`, `Rationing` and `Settling` run synchronously inside
/// [`ClearingMarket::clear`]; agents can only ever observe
/// `CollectingOrders` or `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundPhase {
    CollectingOrders,
    Matching,
    Rationing,
    Settling,
    Closed,
}

/// Round-level failures. Every variant is fatal for its round: it
/// signals a broken upstream contract, not a recoverable market outcome.
#[derive(Debug, Error)]
pub enum ClearingError {
    #[error("market is not collecting orders (phase {phase:?})")]
    MarketClosed { phase: RoundPhase },

    #[error("round {round}: order references unknown instrument {instrument}")]
    UnknownInstrument { round: u64, instrument: InstrumentId },

    #[error("round {round}: agent {agent} is unknown to the ledger")]
    UnknownAgent { round: u64, agent: AgentId },

    #[error(
        "round {round}, instrument {instrument}: agent {agent} appears on both sides of the market"
    )]
    BothSides {
        round: u64,
        instrument: InstrumentId,
        agent: AgentId,
    },

    #[error(
        "round {round}, instrument {instrument}: settling would drive agent {agent} cash negative \
         (cash {cash}, net debit {debit})"
    )]
    NegativeCash {
        round: u64,
        instrument: InstrumentId,
        agent: AgentId,
        cash: Money,
        debit: Money,
    },

    #[error(
        "round {round}, instrument {instrument}: agent {agent} sells {required} but holds {held}"
    )]
    InsufficientInventory {
        round: u64,
        instrument: InstrumentId,
        agent: AgentId,
        required: f64,
        held: f64,
    },
}

/// Outcome of clearing one instrument within a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentReport {
    pub instrument: InstrumentId,
    pub trades: Vec<Trade>,
    pub rationing: RationingDecision,
    /// Orders (or remainders) that did not trade — a normal outcome
    /// reported back to the originating agents.
    pub unmatched: Vec<UnmatchedOrder>,
    /// Candidate quantity produced by matching, before rationing.
    pub matched_quantity: f64,
    /// Quantity actually settled.
    pub settled_quantity: f64,
    /// Value actually settled.
    pub settled_value: Money,
}

/// Outcome of one full clearing round across a market's instruments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundReport {
    pub round: u64,
    pub reports: Vec<InstrumentReport>,
}

impl RoundReport {
    pub fn total_settled_quantity(&self) -> f64 {
        self.reports.iter().map(|r| r.settled_quantity).sum()
    }

    pub fn total_settled_value(&self) -> Money {
        self.reports.iter().map(|r| r.settled_value).sum()
    }

    pub fn trades(&self) -> impl Iterator<Item = &Trade> {
        self.reports.iter().flat_map(|r| r.trades.iter())
    }
}

impl fmt::Display for RoundReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Round {} ===", self.round)?;
        for report in &self.reports {
            writeln!(
                f,
                "{}: {} trades, qty {:.4}, value {}",
                report.instrument,
                report.trades.len(),
                report.settled_quantity,
                report.settled_value
            )?;
        }
        writeln!(
            f,
            "total: qty {:.4}, value {}",
            self.total_settled_quantity(),
            self.total_settled_value()
        )
    }
}

/// A clearing market for one instrument class.
///
/// The market owns its order book for the duration of a round. One call
/// to [`ClearingMarket::clear`] runs the whole
/// `Matching → Rationing → Settling` pipeline atomically: settlement is
/// validated against the ledger before any balance sheet is touched, so
/// agents never observe a half-settled round.
pub struct ClearingMarket {
    name: String,
    matching: MatchingPolicy,
    rationing: RationingPolicy,
    /// Seniority given to claims created by loan settlement.
    loan_seniority: Seniority,
    book: OrderBook,
    phase: RoundPhase,
}

impl ClearingMarket {
    pub fn new(
        name: impl Into<String>,
        matching: MatchingPolicy,
        rationing: RationingPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            matching,
            rationing,
            loan_seniority: Seniority::Unsecured,
            book: OrderBook::new(),
            phase: RoundPhase::CollectingOrders,
        }
    }

    /// Seniority for claims registered by loan settlement (builder style).
    pub fn with_loan_seniority(mut self, seniority: Seniority) -> Self {
        self.loan_seniority = seniority;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn pending_orders(&self) -> usize {
        self.book.len()
    }

    /// Submit an order into the current round.
    pub fn submit(
        &mut self,
        agent: AgentId,
        request: OrderRequest,
    ) -> Result<OrderId, ClearingError> {
        if self.phase != RoundPhase::CollectingOrders {
            return Err(ClearingError::MarketClosed { phase: self.phase });
        }
        Ok(self.book.submit(agent, request))
    }

    /// Reopen the market for the next round's order collection.
    pub fn open(&mut self) {
        self.phase = RoundPhase::CollectingOrders;
    }

    /// Run one clearing round: matching, rationing and settlement for
    /// every instrument with pending orders, in instrument-id order.
    ///
    /// The transition out of `CollectingOrders` is the caller's signal
    /// that all agents for this step have submitted.
    pub fn clear(
        &mut self,
        ledger: &mut Ledger,
        registry: &InstrumentRegistry,
        log: &mut SettlementLog,
        round: u64,
        rng: &mut StdRng,
    ) -> Result<RoundReport, ClearingError> {
        if self.phase != RoundPhase::CollectingOrders {
            return Err(ClearingError::MarketClosed { phase: self.phase });
        }

        let orders = self.book.drain();
        let instruments = distinct_instruments(&orders);
        let mut reports = Vec::with_capacity(instruments.len());

        debug!(
            "market '{}': clearing round {} ({} orders, {} instruments)",
            self.name,
            round,
            orders.len(),
            instruments.len()
        );

        for instrument in instruments {
            self.phase = RoundPhase::Matching;
            let report =
                self.clear_instrument(&instrument, &orders, ledger, registry, round, rng)?;
            log.extend(report.trades.iter().cloned());
            reports.push(report);
        }

        self.phase = RoundPhase::Closed;

        let report = RoundReport { round, reports };
        info!(
            "market '{}': round {} settled qty {:.4} value {}",
            self.name,
            round,
            report.total_settled_quantity(),
            report.total_settled_value()
        );
        Ok(report)
    }

    fn clear_instrument(
        &mut self,
        instrument: &InstrumentId,
        orders: &[Order],
        ledger: &mut Ledger,
        registry: &InstrumentRegistry,
        round: u64,
        rng: &mut StdRng,
    ) -> Result<InstrumentReport, ClearingError> {
        let definition =
            registry
                .get(instrument)
                .ok_or_else(|| ClearingError::UnknownInstrument {
                    round,
                    instrument: instrument.clone(),
                })?;

        let mut bids = Vec::new();
        let mut asks = Vec::new();
        for order in orders {
            if order.instrument() == instrument {
                match order.side() {
                    Side::Bid => bids.push(order.clone()),
                    Side::Ask => asks.push(order.clone()),
                }
            }
        }

        // An agent on both sides of one instrument would make the
        // per-agent rationing map ambiguous; treat it as a broken
        // upstream contract.
        for bid in &bids {
            if asks.iter().any(|a| a.agent() == bid.agent()) {
                return Err(ClearingError::BothSides {
                    round,
                    instrument: instrument.clone(),
                    agent: bid.agent().clone(),
                });
            }
        }

        // --- Matching ---
        let (outcome, pairing) = match_orders(&bids, &asks, &self.matching, rng);
        let matched_quantity = outcome.matched_quantity();

        // --- Rationing ---
        self.phase = RoundPhase::Rationing;
        let (demand, supply) = marketable_volumes(&bids, &asks, &self.matching);
        let decision = ration(instrument, &demand, &supply, &self.rationing, rng);

        // --- Settling ---
        // Per-order capacities come from the rationing-decision snapshot;
        // nothing is recomputed from live balance sheets.
        self.phase = RoundPhase::Settling;
        let best_ask = asks
            .iter()
            .map(|o| o.limit_price())
            .fold(f64::INFINITY, f64::min);
        let best_bid = bids
            .iter()
            .map(|o| o.limit_price())
            .fold(f64::NEG_INFINITY, f64::max);
        let bid_eligible: Vec<bool> = bids
            .iter()
            .map(|o| !pairing.price_gated || o.limit_price() >= best_ask)
            .collect();
        let ask_eligible: Vec<bool> = asks
            .iter()
            .map(|o| !pairing.price_gated || o.limit_price() <= best_bid)
            .collect();
        let mut bid_capacity = rationed_capacities(&bids, &decision, Side::Bid, &bid_eligible);
        let mut ask_capacity = rationed_capacities(&asks, &decision, Side::Ask, &ask_eligible);
        let mut fills =
            pair_capacities(&bids, &asks, &pairing, &mut bid_capacity, &mut ask_capacity);
        fills.retain(|f| f.quantity > DUST_QUANTITY);

        validate_settlement(&fills, definition.class(), ledger, round, instrument)?;

        let trades = apply_settlement(
            &fills,
            definition.class(),
            self.loan_seniority,
            ledger,
            instrument,
            round,
        );

        let settled_quantity: f64 = trades.iter().map(|t| t.quantity()).sum();
        let settled_value: Money = trades.iter().map(|t| t.cost()).sum();

        let unmatched = final_unmatched(&bids, &asks, &fills);

        Ok(InstrumentReport {
            instrument: instrument.clone(),
            trades,
            rationing: decision,
            unmatched,
            matched_quantity,
            settled_quantity,
            settled_value,
        })
    }
}

/// Distinct instruments referenced by a batch of orders, in id order.
fn distinct_instruments(orders: &[Order]) -> Vec<InstrumentId> {
    let mut set: BTreeMap<&InstrumentId, ()> = BTreeMap::new();
    for order in orders {
        set.insert(order.instrument(), ());
    }
    set.into_keys().cloned().collect()
}

/// Per-order settlement capacities for one side, honouring the rationing
/// decision.
///
/// An agent's allocation is spent across its orders in arrival order,
/// skipping orders the pairing can never serve (price-incompatible ones
/// under a gated policy), so an unmarketable order cannot soak up an
/// allocation that a marketable one needs.
fn rationed_capacities(
    orders: &[Order],
    decision: &RationingDecision,
    side: Side,
    eligible: &[bool],
) -> Vec<f64> {
    let mut remaining: BTreeMap<AgentId, f64> = decision
        .allocated
        .iter()
        .map(|(a, &q)| (a.clone(), q))
        .collect();

    orders
        .iter()
        .enumerate()
        .map(|(i, order)| {
            if !eligible[i] {
                return 0.0;
            }
            match decision.allocation_for(order.agent(), side) {
                None => order.quantity(),
                Some(_) => {
                    let budget = remaining.entry(order.agent().clone()).or_insert(0.0);
                    let capacity = order.quantity().min(*budget);
                    *budget -= capacity;
                    capacity
                }
            }
        })
        .collect()
}

/// Validate the whole fill set against the ledger before mutating it.
///
/// Feasibility is net-of-round: an agent may fund purchases with the
/// proceeds of its own sales in the same round. A violation here means
/// the matching/rationing contract was broken upstream.
fn validate_settlement(
    fills: &[CandidateMatch],
    class: &crate::core::instrument::InstrumentClass,
    ledger: &Ledger,
    round: u64,
    instrument: &InstrumentId,
) -> Result<(), ClearingError> {
    let mut cash_delta: BTreeMap<&AgentId, Money> = BTreeMap::new();
    let mut quantity_sold: BTreeMap<&AgentId, f64> = BTreeMap::new();

    for fill in fills {
        let cost = money_from_f64(fill.quantity * fill.price);
        *cash_delta.entry(&fill.buyer).or_insert(Money::ZERO) -= cost;
        *cash_delta.entry(&fill.seller).or_insert(Money::ZERO) += cost;
        *quantity_sold.entry(&fill.seller).or_insert(0.0) += fill.quantity;
    }

    for (&agent, delta) in &cash_delta {
        let sheet = ledger.sheet(agent).ok_or_else(|| ClearingError::UnknownAgent {
            round,
            agent: agent.clone(),
        })?;
        if sheet.cash() + *delta < Money::ZERO {
            return Err(ClearingError::NegativeCash {
                round,
                instrument: instrument.clone(),
                agent: agent.clone(),
                cash: sheet.cash(),
                debit: -*delta,
            });
        }
    }

    if class.requires_inventory() {
        for (&agent, &sold) in &quantity_sold {
            let held = ledger
                .sheet(agent)
                .map(|s| s.holding(instrument))
                .unwrap_or(0.0);
            if sold > held + DUST_QUANTITY {
                return Err(ClearingError::InsufficientInventory {
                    round,
                    instrument: instrument.clone(),
                    agent: agent.clone(),
                    required: sold,
                    held,
                });
            }
        }
    }

    Ok(())
}

/// Apply a validated fill set to the ledger and build the trade records.
fn apply_settlement(
    fills: &[CandidateMatch],
    class: &crate::core::instrument::InstrumentClass,
    loan_seniority: Seniority,
    ledger: &mut Ledger,
    instrument: &InstrumentId,
    round: u64,
) -> Vec<Trade> {
    use crate::core::instrument::InstrumentClass;

    // Cash moves net per agent, matching how feasibility was validated:
    // an agent funding purchases out of same-round sale proceeds must
    // not depend on the order fills happen to be applied in. Each trade
    // contributes the identical decimal value to both legs, so total
    // cash is invariant.
    let mut cash_delta: BTreeMap<AgentId, Money> = BTreeMap::new();
    for fill in fills {
        let cost = money_from_f64(fill.quantity * fill.price);
        *cash_delta.entry(fill.buyer.clone()).or_insert(Money::ZERO) -= cost;
        *cash_delta.entry(fill.seller.clone()).or_insert(Money::ZERO) += cost;
    }
    for (agent, delta) in cash_delta {
        ledger
            .sheet_mut(&agent)
            .expect("validated")
            .apply_cash_delta(delta);
    }

    let mut trades = Vec::with_capacity(fills.len());
    for fill in fills {
        match class {
            InstrumentClass::Goods { .. } | InstrumentClass::Equity { .. } => {
                ledger
                    .sheet_mut(&fill.seller)
                    .expect("validated")
                    .add_holding(instrument, -fill.quantity);
                ledger
                    .sheet_mut(&fill.buyer)
                    .expect("validated")
                    .add_holding(instrument, fill.quantity);
            }
            // Labour is consumed at purchase; the wage is the buyer's
            // expense and the seller's income.
            InstrumentClass::Labour => {}
            // Loans settle as discount paper: the lender's cash buys a
            // claim for the face value against the borrower.
            InstrumentClass::Loan => {
                let face = money_from_f64(fill.quantity);
                if face > Money::ZERO {
                    ledger.add_claim(&fill.seller, &fill.buyer, face, loan_seniority);
                }
            }
        }

        trades.push(Trade::new(
            fill.buyer.clone(),
            fill.seller.clone(),
            instrument.clone(),
            fill.quantity,
            fill.price,
            round,
        ));
    }
    trades
}

/// Per-order unfilled quantity after settlement, reported back to the
/// originating agents.
fn final_unmatched(bids: &[Order], asks: &[Order], fills: &[CandidateMatch]) -> Vec<UnmatchedOrder> {
    let mut filled: BTreeMap<OrderId, f64> = BTreeMap::new();
    for fill in fills {
        *filled.entry(fill.bid).or_insert(0.0) += fill.quantity;
        *filled.entry(fill.ask).or_insert(0.0) += fill.quantity;
    }

    let mut unmatched = Vec::new();
    for order in bids.iter().chain(asks.iter()) {
        let done = filled.get(&order.id()).copied().unwrap_or(0.0);
        let unfilled = order.quantity() - done;
        if unfilled > DUST_QUANTITY {
            unmatched.push(UnmatchedOrder {
                order: order.id(),
                agent: order.agent().clone(),
                side: order.side(),
                unfilled_quantity: unfilled,
            });
        }
    }
    unmatched
}
