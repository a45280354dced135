use crate::market::matching::MatchingPolicy;
use crate::market::rationing::RationingPolicy;
use crate::portfolio::credit::CreditDemandFunction;
use crate::portfolio::returns::ReturnEstimator;
use crate::portfolio::smoothing::SmoothingPolicy;
use crate::portfolio::weighting::WeightingPolicy;
use crate::resolution::ResolutionStrategy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration problems. All of them are fatal at setup time: a
/// simulation with an invalid configuration must not start.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("rationing inhomogeneity must be in [0, 1], got {0}")]
    InvalidInhomogeneity(f64),

    #[error("logit beta must be non-negative and finite, got {0}")]
    InvalidBeta(f64),

    #[error("smoothing weight must be in [0, 1], got {0}")]
    InvalidSmoothingWeight(f64),

    #[error("smoothing floor must be non-negative and finite, got {0}")]
    NegativeFloor(f64),

    #[error("return-expectation lag must be at least 1")]
    ZeroLag,

    #[error("return-history window must be at least 1")]
    ZeroWindow,

    #[error("risk premium must be positive and finite, got {0}")]
    InvalidRiskPremium(f64),

    #[error("trivial return expectation must be finite, got {0}")]
    NonFiniteReturn(f64),

    #[error("cash weight must be in [0, 1), got {0}")]
    InvalidCashWeight(f64),

    #[error("capital adequacy target must be non-negative and finite, got {0}")]
    InvalidCarTarget(f64),

    #[error("credit demand rate parameter must be non-negative and finite, got {0}")]
    InvalidRate(f64),

    #[error("credit risk bias must be positive and finite, got {0}")]
    InvalidRiskBias(f64),

    #[error("credit indifference threshold must be in [0, 1], got {0}")]
    InvalidIndifferenceThreshold(f64),

    #[error("parameter series must not be empty")]
    EmptySeries,
}

/// A pull-based scalar parameter source.
///
/// External configuration supplies either an already-resolved value or a
/// per-step series; the core only ever pulls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Parameter {
    Fixed(f64),
    /// One value per step; the series holds its last value once the
    /// simulation runs past its end.
    Series(Vec<f64>),
}

impl Parameter {
    /// Value for the given step.
    pub fn get(&self, step: u64) -> f64 {
        match self {
            Parameter::Fixed(value) => *value,
            Parameter::Series(values) => {
                let idx = (step as usize).min(values.len().saturating_sub(1));
                values.get(idx).copied().unwrap_or(0.0)
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Parameter::Fixed(_) => Ok(()),
            Parameter::Series(values) if values.is_empty() => Err(ConfigError::EmptySeries),
            Parameter::Series(_) => Ok(()),
        }
    }
}

/// Strategy selection and scalar parameters for one simulation.
///
/// Which concrete variant each role uses is decided here, by plain data,
/// and nowhere else; construction happens through ordinary functions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Global seed; every round derives its own generator from it.
    pub seed: u64,
    pub matching: MatchingPolicy,
    pub rationing: RationingPolicy,
    pub estimator: ReturnEstimator,
    pub weighting: WeightingPolicy,
    pub smoothing: SmoothingPolicy,
    pub credit_demand: CreditDemandFunction,
    /// Fraction of investor assets retained as cash.
    pub cash_weight: f64,
    /// Capital adequacy target restored by bailouts.
    pub car_target: f64,
    pub resolution: ResolutionStrategy,
    /// Ideal credit requirement per firm per step.
    pub firm_credit_need: Parameter,
    /// Production markup rate per firm per step (the hard refusal rate
    /// for credit).
    pub firm_markup_rate: Parameter,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            matching: MatchingPolicy::PricePriority,
            rationing: RationingPolicy::Homogeneous,
            estimator: ReturnEstimator::Fundamentalist { risk_premium: 1.0 },
            weighting: WeightingPolicy::Logit { beta: 5.0 },
            smoothing: SmoothingPolicy::NoSuddenIncrease { weight: 0.5 },
            credit_demand: CreditDemandFunction::RiskNeutral,
            cash_weight: 0.1,
            car_target: 0.08,
            resolution: ResolutionStrategy::BailoutThenLiquidate,
            firm_credit_need: Parameter::Fixed(0.0),
            firm_markup_rate: Parameter::Fixed(0.1),
        }
    }
}

impl EngineConfig {
    /// Validate every parameter. Called once before the first round.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let RationingPolicy::RandomDeny { inhomogeneity } = &self.rationing {
            if !(0.0..=1.0).contains(inhomogeneity) || !inhomogeneity.is_finite() {
                return Err(ConfigError::InvalidInhomogeneity(*inhomogeneity));
            }
        }

        match &self.estimator {
            ReturnEstimator::Fundamentalist { risk_premium } => {
                if !(risk_premium.is_finite() && *risk_premium > 0.0) {
                    return Err(ConfigError::InvalidRiskPremium(*risk_premium));
                }
            }
            ReturnEstimator::TrendFollower { lag } => {
                if *lag == 0 {
                    return Err(ConfigError::ZeroLag);
                }
            }
            ReturnEstimator::MedianOverHistory { window } => {
                if *window == 0 {
                    return Err(ConfigError::ZeroWindow);
                }
            }
            ReturnEstimator::Trivial { value } => {
                if !value.is_finite() {
                    return Err(ConfigError::NonFiniteReturn(*value));
                }
            }
        }

        if let WeightingPolicy::Logit { beta } = &self.weighting {
            if !(beta.is_finite() && *beta >= 0.0) {
                return Err(ConfigError::InvalidBeta(*beta));
            }
        }

        match &self.smoothing {
            SmoothingPolicy::FloorBlend { floor } => {
                if !(floor.is_finite() && *floor >= 0.0) {
                    return Err(ConfigError::NegativeFloor(*floor));
                }
            }
            SmoothingPolicy::NoSuddenIncrease { weight } => {
                if !(0.0..=1.0).contains(weight) || !weight.is_finite() {
                    return Err(ConfigError::InvalidSmoothingWeight(*weight));
                }
            }
        }

        match &self.credit_demand {
            CreditDemandFunction::RiskNeutral => {}
            CreditDemandFunction::RiskAverse {
                always_acceptable_rate,
            } => {
                if !(always_acceptable_rate.is_finite() && *always_acceptable_rate >= 0.0) {
                    return Err(ConfigError::InvalidRate(*always_acceptable_rate));
                }
            }
            CreditDemandFunction::CustomRiskTolerance {
                always_acceptable_rate,
                risk_bias,
                indifference_threshold,
            } => {
                if !(always_acceptable_rate.is_finite() && *always_acceptable_rate >= 0.0) {
                    return Err(ConfigError::InvalidRate(*always_acceptable_rate));
                }
                if !(risk_bias.is_finite() && *risk_bias > 0.0) {
                    return Err(ConfigError::InvalidRiskBias(*risk_bias));
                }
                if !(0.0..=1.0).contains(indifference_threshold) {
                    return Err(ConfigError::InvalidIndifferenceThreshold(
                        *indifference_threshold,
                    ));
                }
            }
        }

        if !(0.0..1.0).contains(&self.cash_weight) {
            return Err(ConfigError::InvalidCashWeight(self.cash_weight));
        }
        if !(self.car_target.is_finite() && self.car_target >= 0.0) {
            return Err(ConfigError::InvalidCarTarget(self.car_target));
        }

        self.firm_credit_need.validate()?;
        self.firm_markup_rate.validate()?;
        Ok(())
    }
}
