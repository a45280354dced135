use crate::core::agent::{AgentId, AgentRole};
use crate::core::balance::Ledger;
use crate::core::instrument::{InstrumentClass, InstrumentId, InstrumentRegistry};
use crate::core::order::{OrderRequest, Side};
use crate::core::trade::SettlementLog;
use crate::engine::config::{ConfigError, EngineConfig};
use crate::market::clearing::{ClearingError, ClearingMarket, RoundReport};
use crate::portfolio::allocation::PortfolioEngine;
use crate::portfolio::returns::MarketHistory;
use crate::resolution::{ResolutionEngine, ResolutionError, ResolutionReport};
use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Loan demand below this volume is not worth an order.
const MIN_LOAN_ORDER: f64 = 1e-6;

/// Failures that abort a simulation step.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Clearing(#[from] ClearingError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("order references unregistered instrument {0}")]
    UnknownInstrument(InstrumentId),
}

/// Everything that happened in one simulated step.
#[derive(Debug, Serialize, Deserialize)]
pub struct StepReport {
    pub round: u64,
    pub markets: Vec<RoundReport>,
    pub resolutions: Vec<ResolutionReport>,
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for market in &self.markets {
            write!(f, "{}", market)?;
        }
        for resolution in &self.resolutions {
            writeln!(
                f,
                "resolution: {} -> {:?}",
                resolution.case.institution, resolution.case.status
            )?;
        }
        Ok(())
    }
}

/// Derive the seed for one round's generator from the global seed.
///
/// A splitmix-style mix keeps consecutive round seeds uncorrelated while
/// staying a pure function of `(seed, round)`, which is what makes a
/// round individually replayable.
pub fn derive_round_seed(seed: u64, round: u64) -> u64 {
    let mut z = seed ^ round.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// The simulation: one ledger, one instrument registry, one clearing
/// market per instrument class, a portfolio engine for the investing
/// agents and a resolution engine for the insolvent ones.
///
/// All state-mutating phases run single-threaded in a fixed order, and
/// the only randomness is the per-round generator, so a run is fully
/// determined by its configuration and seed.
pub struct Simulation {
    config: EngineConfig,
    ledger: Ledger,
    registry: InstrumentRegistry,
    markets: Vec<(InstrumentClassKey, ClearingMarket)>,
    portfolio: PortfolioEngine,
    resolution: ResolutionEngine,
    history: MarketHistory,
    log: SettlementLog,
    queued: Vec<(AgentId, OrderRequest)>,
    round: u64,
}

/// Routing key: one clearing market per instrument class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstrumentClassKey {
    Goods,
    Labour,
    Loans,
    Stocks,
}

fn class_key(class: &InstrumentClass) -> InstrumentClassKey {
    match class {
        InstrumentClass::Goods { .. } => InstrumentClassKey::Goods,
        InstrumentClass::Labour => InstrumentClassKey::Labour,
        InstrumentClass::Loan => InstrumentClassKey::Loans,
        InstrumentClass::Equity { .. } => InstrumentClassKey::Stocks,
    }
}

impl Simulation {
    /// Build a simulation. Fails fast on an invalid configuration; the
    /// simulation must not start with one.
    pub fn new(
        config: EngineConfig,
        ledger: Ledger,
        registry: InstrumentRegistry,
        capital_provider: AgentId,
        asset_absorber: AgentId,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let markets = vec![
            InstrumentClassKey::Goods,
            InstrumentClassKey::Labour,
            InstrumentClassKey::Loans,
            InstrumentClassKey::Stocks,
        ]
        .into_iter()
        .map(|key| {
            let name = match key {
                InstrumentClassKey::Goods => "goods",
                InstrumentClassKey::Labour => "labour",
                InstrumentClassKey::Loans => "loans",
                InstrumentClassKey::Stocks => "stocks",
            };
            (
                key,
                ClearingMarket::new(name, config.matching.clone(), config.rationing.clone()),
            )
        })
        .collect();

        let portfolio = PortfolioEngine::new(
            config.estimator.clone(),
            config.weighting.clone(),
            config.smoothing.clone(),
            config.cash_weight,
        );
        let resolution = ResolutionEngine::new(
            config.resolution,
            capital_provider,
            asset_absorber,
            config.car_target,
        );

        Ok(Self {
            config,
            ledger,
            registry,
            markets,
            portfolio,
            resolution,
            history: MarketHistory::new(),
            log: SettlementLog::new(),
            queued: Vec::new(),
            round: 0,
        })
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn registry(&self) -> &InstrumentRegistry {
        &self.registry
    }

    pub fn history(&self) -> &MarketHistory {
        &self.history
    }

    pub fn settlement_log(&self) -> &SettlementLog {
        &self.log
    }

    /// Queue an externally-generated order for the next step.
    pub fn queue_order(&mut self, agent: AgentId, request: OrderRequest) {
        self.queued.push((agent, request));
    }

    /// The instruments the investing agents allocate across: every
    /// equity and loan instrument, in id order.
    fn investment_universe(&self) -> Vec<InstrumentId> {
        self.registry
            .iter()
            .filter(|i| {
                matches!(
                    i.class(),
                    InstrumentClass::Equity { .. } | InstrumentClass::Loan
                )
            })
            .map(|i| i.id().clone())
            .collect()
    }

    fn route(&mut self, agent: AgentId, request: OrderRequest) -> Result<(), EngineError> {
        let class = self
            .registry
            .get(&request.instrument)
            .map(|i| i.class().clone())
            .ok_or_else(|| EngineError::UnknownInstrument(request.instrument.clone()))?;
        let key = class_key(&class);
        let market = self
            .markets
            .iter_mut()
            .find(|(k, _)| *k == key)
            .map(|(_, m)| m)
            .expect("market per class");
        market.submit(agent, request)?;
        Ok(())
    }

    /// Advance the simulation by one step.
    ///
    /// Order collection, clearing, settlement, history recording and
    /// bankruptcy resolution all run here, in that order, sharing one
    /// per-round generator.
    pub fn step(&mut self) -> Result<StepReport, EngineError> {
        let round = self.round;
        let mut rng = StdRng::seed_from_u64(derive_round_seed(self.config.seed, round));
        debug!("step {} begins", round);

        for (_, market) in &mut self.markets {
            market.open();
        }

        // Externally submitted orders first, in submission order.
        let queued = std::mem::take(&mut self.queued);
        for (agent, request) in queued {
            self.route(agent, request)?;
        }

        // Investing agents rebalance towards their target portfolios.
        let universe = self.investment_universe();
        if !universe.is_empty() {
            let mut investors = self.ledger.agents_with_role(AgentRole::Bank);
            investors.extend(self.ledger.agents_with_role(AgentRole::Fund));
            investors.sort();
            for investor in investors {
                let orders = self.portfolio.rebalance_orders(
                    &investor,
                    &universe,
                    &self.ledger,
                    &self.registry,
                    &self.history,
                );
                for request in orders {
                    self.route(investor.clone(), request)?;
                }
            }
        }

        // Firms demand credit on the loan markets.
        self.submit_credit_demand(round)?;

        // Clear every market; the order of markets and of instruments
        // within each market is fixed.
        let mut reports = Vec::with_capacity(self.markets.len());
        for (_, market) in &mut self.markets {
            let report = market.clear(
                &mut self.ledger,
                &self.registry,
                &mut self.log,
                round,
                &mut rng,
            )?;
            if !report.reports.is_empty() {
                reports.push(report);
            }
        }

        // Prices discovered this round feed the next round's reference
        // prices and the public history.
        let instruments: Vec<InstrumentId> =
            self.registry.iter().map(|i| i.id().clone()).collect();
        for id in &instruments {
            if let Some(vwap) = self.log.vwap(id, round) {
                self.registry.set_reference_price(id, vwap);
            }
            let price = self.registry.reference_price(id).unwrap_or(0.0);
            self.history.record(id, price);
        }

        // Post-settlement insolvencies are resolved before the next
        // round begins.
        let resolutions = self
            .resolution
            .resolve_all(&mut self.ledger, &self.registry, &mut rng)?;

        self.round += 1;
        Ok(StepReport {
            round,
            markets: reports,
            resolutions,
        })
    }

    fn submit_credit_demand(&mut self, round: u64) -> Result<(), EngineError> {
        let loans: Vec<(InstrumentId, f64)> = self
            .registry
            .iter()
            .filter(|i| matches!(i.class(), InstrumentClass::Loan))
            .map(|i| (i.id().clone(), i.reference_price()))
            .collect();
        if loans.is_empty() {
            return Ok(());
        }

        let ideal = self.config.firm_credit_need.get(round);
        let markup = self.config.firm_markup_rate.get(round);
        let firms = self.ledger.agents_with_role(AgentRole::Firm);

        for firm in firms {
            for (loan, price) in &loans {
                // Discount paper: price per unit face implies the rate.
                let rate = if *price > 0.0 { 1.0 / price - 1.0 } else { 0.0 };
                let demand = self.config.credit_demand.demand(ideal, markup, rate);
                if demand > MIN_LOAN_ORDER {
                    self.route(
                        firm.clone(),
                        OrderRequest {
                            instrument: loan.clone(),
                            side: Side::Ask,
                            quantity: demand,
                            limit_price: *price,
                        },
                    )?;
                }
            }
        }
        Ok(())
    }
}
