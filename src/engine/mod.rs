//! Simulation orchestration: configuration, the step loop and scenario
//! generation.

pub mod config;
pub mod scenario;
pub mod simulation;

pub use config::{ConfigError, EngineConfig, Parameter};
pub use simulation::{derive_round_seed, EngineError, Simulation, StepReport};
