use serde::{Deserialize, Serialize};

/// Damps period-to-period changes in target weights so that portfolios
/// do not teleport between allocations.
///
/// Smoothing never produces a negative weight and preserves the
/// sum-to-one contract of the weighting stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SmoothingPolicy {
    /// Blend a uniform floor into the raw weights:
    /// `w_i = floor + (1 - n*floor) * raw_i`.
    ///
    /// Guarantees every instrument keeps at least the floor. When the
    /// floor is infeasible for the instrument count (`n*floor > 1`) the
    /// effective floor is reduced to `1/n`.
    FloorBlend { floor: f64 },
    /// Exponential damping applied to upward moves only:
    /// rising weights move by `(1 - w)` of the gap, falling weights
    /// follow immediately; the result is renormalised.
    ///
    /// `w = 0` passes raw weights through; `w = 1` never raises a weight
    /// beyond renormalisation.
    NoSuddenIncrease { weight: f64 },
}

impl SmoothingPolicy {
    /// Smooth this step's raw weights against the previous step's.
    ///
    /// `previous` is None on an investor's first step (or after the
    /// instrument set changed shape), in which case raw weights pass
    /// through untouched.
    pub fn smooth(&self, previous: Option<&[f64]>, raw: &[f64]) -> Vec<f64> {
        if raw.is_empty() {
            return Vec::new();
        }
        match self {
            SmoothingPolicy::FloorBlend { floor } => {
                let n = raw.len() as f64;
                let floor = floor.min(1.0 / n);
                raw.iter().map(|r| floor + (1.0 - n * floor) * r).collect()
            }
            SmoothingPolicy::NoSuddenIncrease { weight } => {
                let previous = match previous {
                    Some(prev) if prev.len() == raw.len() => prev,
                    _ => return raw.to_vec(),
                };
                let damped: Vec<f64> = raw
                    .iter()
                    .zip(previous.iter())
                    .map(|(&r, &p)| if r > p { weight * p + (1.0 - weight) * r } else { r })
                    .collect();
                let total: f64 = damped.iter().sum();
                if total <= 0.0 {
                    let w = 1.0 / raw.len() as f64;
                    return vec![w; raw.len()];
                }
                damped.into_iter().map(|w| w / total).collect()
            }
        }
    }
}
