//! # clearing-core
//!
//! Market clearing and balance-sheet resolution core for agent-based
//! economic simulation.
//!
//! Once per simulated step the engine matches heterogeneous buyers and
//! sellers across goods, labour, loan and stock markets, rations unmet
//! supply or demand when a market does not clear exactly, rebalances
//! investing agents against smoothed, weighted return expectations, and
//! resolves insolvent institutions through a bailout-or-liquidation
//! decision that preserves system-wide balance-sheet identities.
//!
//! ## Architecture
//!
//! - **core** — Foundational types: agents, instruments, orders, trades,
//!   balance sheets and the ledger
//! - **market** — Matching algorithms, rationing algorithms and the
//!   clearing round state machine
//! - **portfolio** — Return expectations, portfolio weighting, smoothing,
//!   rebalancing and credit demand
//! - **resolution** — Insolvency detection, bailout and liquidation
//! - **engine** — Configuration, the simulation step loop and scenario
//!   generation
//!
//! ## Determinism
//!
//! Every state-mutating phase runs single-threaded in a fixed order, and
//! all randomness flows through a per-round generator derived from the
//! global seed and the round index. The same configuration and seed
//! always reproduce the same trajectory, bit for bit.

pub mod core;
pub mod engine;
pub mod market;
pub mod portfolio;
pub mod resolution;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::core::agent::{AgentId, AgentRole};
    pub use crate::core::balance::{BalanceSheet, Claim, Ledger, Money, Seniority};
    pub use crate::core::instrument::{
        Instrument, InstrumentClass, InstrumentId, InstrumentRegistry,
    };
    pub use crate::core::order::{Order, OrderId, OrderRequest, Side};
    pub use crate::core::trade::{SettlementLog, Trade};
    pub use crate::engine::{EngineConfig, Parameter, Simulation};
    pub use crate::market::clearing::{ClearingError, ClearingMarket, RoundPhase, RoundReport};
    pub use crate::market::matching::MatchingPolicy;
    pub use crate::market::rationing::{RationingDecision, RationingPolicy};
    pub use crate::portfolio::allocation::{Portfolio, PortfolioEngine};
    pub use crate::portfolio::credit::CreditDemandFunction;
    pub use crate::portfolio::returns::{MarketHistory, ReturnEstimator};
    pub use crate::portfolio::smoothing::SmoothingPolicy;
    pub use crate::portfolio::weighting::WeightingPolicy;
    pub use crate::resolution::{ResolutionEngine, ResolutionStrategy};
}
