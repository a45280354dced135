use serde::{Deserialize, Serialize};

/// Maps a borrower's ideal credit requirement and the prevailing
/// interest rate to the loan volume actually demanded.
///
/// Every variant refuses credit at rates at or above the borrower's
/// production markup rate — borrowing that costs more than the margin it
/// funds is never taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CreditDemandFunction {
    /// Demand the full ideal credit at any rate below the markup rate.
    RiskNeutral,
    /// Linear taper: full demand at or below `always_acceptable_rate`,
    /// falling linearly to zero at the markup rate.
    RiskAverse { always_acceptable_rate: f64 },
    /// Polynomial taper with custom risk affinity: full demand below the
    /// indifference rate, then
    /// `demand * (1 - ((r - r_ind) / (r_max - r_ind))^bias)`.
    ///
    /// The indifference rate is
    /// `max(indifference_threshold * markup_rate, always_acceptable_rate)`.
    CustomRiskTolerance {
        always_acceptable_rate: f64,
        /// Exponent shaping the taper; 1.0 is the linear profile.
        risk_bias: f64,
        /// Fraction of the markup rate below which the borrower does not
        /// react to the rate at all.
        indifference_threshold: f64,
    },
}

impl CreditDemandFunction {
    /// Credit volume demanded at the given interest rate.
    ///
    /// `ideal_credit` is the borrower's liquidity shortfall;
    /// `markup_rate` is its production markup (the hard refusal rate).
    /// The result is never negative.
    pub fn demand(&self, ideal_credit: f64, markup_rate: f64, interest_rate: f64) -> f64 {
        if ideal_credit <= 0.0 || interest_rate >= markup_rate {
            return 0.0;
        }
        let demand = match self {
            CreditDemandFunction::RiskNeutral => ideal_credit,
            CreditDemandFunction::RiskAverse {
                always_acceptable_rate,
            } => {
                let r_min = *always_acceptable_rate;
                if interest_rate <= r_min {
                    ideal_credit
                } else {
                    ideal_credit * (markup_rate - interest_rate) / (markup_rate - r_min)
                }
            }
            CreditDemandFunction::CustomRiskTolerance {
                always_acceptable_rate,
                risk_bias,
                indifference_threshold,
            } => {
                let r_ind = (indifference_threshold * markup_rate).max(*always_acceptable_rate);
                if interest_rate <= r_ind {
                    ideal_credit
                } else {
                    let span = markup_rate - r_ind;
                    let ration = 1.0 - ((interest_rate - r_ind) / span).powf(*risk_bias);
                    ideal_credit * ration
                }
            }
        };
        demand.max(0.0)
    }
}
