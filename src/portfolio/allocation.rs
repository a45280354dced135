use crate::core::agent::AgentId;
use crate::core::balance::Ledger;
use crate::core::instrument::{InstrumentClass, InstrumentId, InstrumentRegistry};
use crate::core::order::{OrderRequest, Side};
use crate::portfolio::returns::{MarketHistory, ReturnEstimator};
use crate::portfolio::smoothing::SmoothingPolicy;
use crate::portfolio::weighting::WeightingPolicy;
use log::debug;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Order values below this are not worth trading.
const DUST_VALUE: f64 = 1e-6;

/// An agent's desired allocation over its investment universe.
///
/// Instrument weights sum to one (within floating-point tolerance);
/// `cash_weight` is the fraction of total assets retained as cash rather
/// than invested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub weights: BTreeMap<InstrumentId, f64>,
    pub cash_weight: f64,
}

impl Portfolio {
    /// Target monetary investment in one instrument given total assets.
    pub fn target_investment(&self, instrument: &InstrumentId, total_assets: f64) -> f64 {
        let investable = total_assets * (1.0 - self.cash_weight);
        self.weights.get(instrument).copied().unwrap_or(0.0) * investable
    }
}

/// Combines a return estimator, a weighting function and a smoothing
/// function into per-step target portfolios, then diffs targets against
/// holdings to produce rebalancing orders.
///
/// The engine remembers each agent's previous smoothed weights so the
/// smoothing stage can damp step-to-step reallocation.
pub struct PortfolioEngine {
    estimator: ReturnEstimator,
    weighting: WeightingPolicy,
    smoothing: SmoothingPolicy,
    cash_weight: f64,
    previous: BTreeMap<AgentId, BTreeMap<InstrumentId, f64>>,
}

impl PortfolioEngine {
    pub fn new(
        estimator: ReturnEstimator,
        weighting: WeightingPolicy,
        smoothing: SmoothingPolicy,
        cash_weight: f64,
    ) -> Self {
        Self {
            estimator,
            weighting,
            smoothing,
            cash_weight,
            previous: BTreeMap::new(),
        }
    }

    /// Compute an agent's target portfolio over the given universe.
    ///
    /// The universe is the externally-decided set of instruments this
    /// agent invests in; instruments are evaluated in the order given
    /// (callers pass id order for determinism).
    pub fn target_portfolio(
        &mut self,
        agent: &AgentId,
        universe: &[InstrumentId],
        registry: &InstrumentRegistry,
        history: &MarketHistory,
    ) -> Portfolio {
        let instruments: Vec<_> = universe
            .iter()
            .filter_map(|id| registry.get(id))
            .collect();

        let returns: Vec<f64> = instruments
            .iter()
            .map(|i| self.estimator.expected_return(i, history))
            .collect();
        let raw = self.weighting.weights(&returns);

        // Previous weights align with the raw vector only while the
        // universe keeps its shape; otherwise smoothing restarts.
        let previous_vec: Option<Vec<f64>> = self.previous.get(agent).and_then(|prev| {
            if prev.len() == instruments.len()
                && instruments.iter().all(|i| prev.contains_key(i.id()))
            {
                Some(instruments.iter().map(|i| prev[i.id()]).collect())
            } else {
                None
            }
        });
        let smoothed = self.smoothing.smooth(previous_vec.as_deref(), &raw);

        let weights: BTreeMap<InstrumentId, f64> = instruments
            .iter()
            .zip(smoothed.iter())
            .map(|(i, &w)| (i.id().clone(), w))
            .collect();
        self.previous.insert(agent.clone(), weights.clone());

        Portfolio {
            weights,
            cash_weight: self.cash_weight,
        }
    }

    /// Diff an agent's target portfolio against current holdings and
    /// emit the rebalancing orders for this round.
    ///
    /// Buy orders are collectively capped by the agent's free cash so
    /// that the engine never submits demand it cannot settle; the cap is
    /// applied pro-rata across buys.
    pub fn rebalance_orders(
        &mut self,
        agent: &AgentId,
        universe: &[InstrumentId],
        ledger: &Ledger,
        registry: &InstrumentRegistry,
        history: &MarketHistory,
    ) -> Vec<OrderRequest> {
        let sheet = match ledger.sheet(agent) {
            Some(sheet) => sheet,
            None => return Vec::new(),
        };
        let portfolio = self.target_portfolio(agent, universe, registry, history);

        let total_assets = sheet.total_assets(registry).to_f64().unwrap_or(0.0);
        let free_cash = sheet.cash().to_f64().unwrap_or(0.0) * (1.0 - self.cash_weight);

        let loan_count = universe
            .iter()
            .filter_map(|id| registry.get(id))
            .filter(|i| matches!(i.class(), InstrumentClass::Loan))
            .count();
        let receivables = sheet.total_receivables().to_f64().unwrap_or(0.0);

        let mut buys: Vec<(InstrumentId, f64, f64)> = Vec::new(); // (id, qty, price)
        let mut orders = Vec::new();

        for id in universe {
            let instrument = match registry.get(id) {
                Some(i) => i,
                None => continue,
            };
            let price = instrument.reference_price();
            let target = portfolio.target_investment(id, total_assets);
            let current = match instrument.class() {
                // Loan exposure lives in receivables, apportioned evenly
                // across the loan instruments of the universe.
                InstrumentClass::Loan => receivables / loan_count.max(1) as f64,
                _ => sheet.holding(id) * price,
            };
            let delta = target - current;

            if delta > DUST_VALUE {
                buys.push((id.clone(), delta / price, price));
            } else if delta < -DUST_VALUE {
                // Claims cannot be resold in this model; loan books run
                // off through resolution instead.
                if matches!(instrument.class(), InstrumentClass::Loan) {
                    continue;
                }
                let sellable = sheet.holding(id).min(-delta / price);
                if sellable * price > DUST_VALUE {
                    orders.push(OrderRequest {
                        instrument: id.clone(),
                        side: Side::Ask,
                        quantity: sellable,
                        limit_price: price,
                    });
                }
            }
        }

        // Pro-rata cash cap over buys.
        let buy_value: f64 = buys.iter().map(|(_, qty, price)| qty * price).sum();
        let scale = if buy_value > free_cash && buy_value > 0.0 {
            free_cash / buy_value
        } else {
            1.0
        };
        if scale < 1.0 {
            debug!(
                "agent {}: scaling buy orders by {:.4} to fit free cash",
                agent, scale
            );
        }
        for (id, qty, price) in buys {
            let quantity = qty * scale;
            if quantity * price > DUST_VALUE {
                orders.push(OrderRequest {
                    instrument: id,
                    side: Side::Bid,
                    quantity,
                    limit_price: price,
                });
            }
        }

        orders
    }
}
