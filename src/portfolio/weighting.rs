use serde::{Deserialize, Serialize};

/// Converts a vector of expected returns into a target allocation
/// summing to one.
///
/// Both variants guarantee, for any non-empty vector of finite returns,
/// that the output sums to 1 within 1e-9 and every weight is
/// non-negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WeightingPolicy {
    /// Equal weight regardless of returns.
    Homogeneous,
    /// Logit weighting: `w_i ∝ exp(beta * (r_i - r_max))`.
    ///
    /// `beta = 0` reduces to homogeneous weighting; large beta
    /// concentrates the allocation on the best-performing instrument.
    /// Subtracting the maximum return keeps the exponentials in [0, 1],
    /// so no beta can overflow.
    Logit { beta: f64 },
}

impl WeightingPolicy {
    /// Target weights for the given expected returns.
    ///
    /// An empty input yields an empty allocation.
    pub fn weights(&self, returns: &[f64]) -> Vec<f64> {
        if returns.is_empty() {
            return Vec::new();
        }
        match self {
            WeightingPolicy::Homogeneous => {
                let w = 1.0 / returns.len() as f64;
                vec![w; returns.len()]
            }
            WeightingPolicy::Logit { beta } => {
                let r_max = returns.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let raw: Vec<f64> = returns.iter().map(|r| (beta * (r - r_max)).exp()).collect();
                let total: f64 = raw.iter().sum();
                // r_max makes at least one exponent exactly zero, so the
                // sum is at least one; no division guard needed.
                raw.into_iter().map(|w| w / total).collect()
            }
        }
    }
}
