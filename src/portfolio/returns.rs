use crate::core::instrument::{Instrument, InstrumentId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Price history of every instrument, recorded once per simulated step.
///
/// The history is the only market information return estimators see;
/// they are pure functions of it and have no other side channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketHistory {
    prices: BTreeMap<InstrumentId, Vec<f64>>,
}

impl MarketHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one step's price for an instrument.
    pub fn record(&mut self, instrument: &InstrumentId, price: f64) {
        self.prices
            .entry(instrument.clone())
            .or_default()
            .push(price);
    }

    /// Latest recorded price, if any.
    pub fn latest(&self, instrument: &InstrumentId) -> Option<f64> {
        self.prices.get(instrument).and_then(|p| p.last().copied())
    }

    /// Price `steps_back` steps before the latest record.
    pub fn lagged(&self, instrument: &InstrumentId, steps_back: usize) -> Option<f64> {
        let series = self.prices.get(instrument)?;
        if series.len() > steps_back {
            Some(series[series.len() - 1 - steps_back])
        } else {
            None
        }
    }

    /// Number of recorded steps for an instrument.
    pub fn depth(&self, instrument: &InstrumentId) -> usize {
        self.prices.get(instrument).map(|p| p.len()).unwrap_or(0)
    }
}

/// Expected-return estimator per instrument.
///
/// A closed set of variants; which one an investor uses is a
/// configuration decision made outside the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReturnEstimator {
    /// Dividend yield over the risk premium:
    /// `e = dividend / price / risk_premium`.
    Fundamentalist { risk_premium: f64 },
    /// Lagged relative price trend:
    /// `e = (p_now - p_lag) / (p_lag * lag)`.
    /// With no usable history the expected price change is zero.
    TrendFollower { lag: usize },
    /// Median of single-step returns over a trailing window.
    MedianOverHistory { window: usize },
    /// A fixed constant.
    Trivial { value: f64 },
}

impl ReturnEstimator {
    /// Expected return for one instrument given the public history.
    pub fn expected_return(&self, instrument: &Instrument, history: &MarketHistory) -> f64 {
        let id = instrument.id();
        let price = history
            .latest(id)
            .unwrap_or_else(|| instrument.reference_price());

        match self {
            ReturnEstimator::Fundamentalist { risk_premium } => {
                if price <= 0.0 {
                    return 0.0;
                }
                instrument.dividend_per_share() / price / risk_premium
            }
            ReturnEstimator::TrendFollower { lag } => match history.lagged(id, *lag) {
                Some(old) if old > 0.0 => (price - old) / (old * *lag as f64),
                _ => 0.0,
            },
            ReturnEstimator::MedianOverHistory { window } => {
                median_return(history, id, *window)
            }
            ReturnEstimator::Trivial { value } => *value,
        }
    }
}

/// Median of the last `window` single-step returns, zero when fewer than
/// two prices are on record.
fn median_return(history: &MarketHistory, instrument: &InstrumentId, window: usize) -> f64 {
    let depth = history.depth(instrument);
    if depth < 2 || window == 0 {
        return 0.0;
    }
    let steps = window.min(depth - 1);
    let mut returns: Vec<f64> = (0..steps)
        .filter_map(|i| {
            let newer = history.lagged(instrument, i)?;
            let older = history.lagged(instrument, i + 1)?;
            if older > 0.0 {
                Some((newer - older) / older)
            } else {
                None
            }
        })
        .collect();
    if returns.is_empty() {
        return 0.0;
    }
    returns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = returns.len() / 2;
    if returns.len() % 2 == 1 {
        returns[mid]
    } else {
        0.5 * (returns[mid - 1] + returns[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instrument::InstrumentClass;

    fn stock(dividend: f64) -> Instrument {
        Instrument::new(
            InstrumentId::new("EQ-X"),
            InstrumentClass::Equity {
                issuer: crate::core::agent::AgentId::new("X"),
            },
            10.0,
        )
        .with_dividend(dividend)
    }

    #[test]
    fn test_fundamentalist_return() {
        let instrument = stock(0.5);
        let mut history = MarketHistory::new();
        history.record(instrument.id(), 10.0);

        let estimator = ReturnEstimator::Fundamentalist { risk_premium: 2.0 };
        // 0.5 / 10 / 2 = 0.025
        let e = estimator.expected_return(&instrument, &history);
        assert!((e - 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_trend_follower_no_history_expects_no_change() {
        let instrument = stock(0.0);
        let history = MarketHistory::new();
        let estimator = ReturnEstimator::TrendFollower { lag: 2 };
        assert_eq!(estimator.expected_return(&instrument, &history), 0.0);
    }

    #[test]
    fn test_trend_follower_lagged_trend() {
        let instrument = stock(0.0);
        let mut history = MarketHistory::new();
        for price in [8.0, 9.0, 10.0] {
            history.record(instrument.id(), price);
        }
        let estimator = ReturnEstimator::TrendFollower { lag: 2 };
        // (10 - 8) / (8 * 2) = 0.125
        let e = estimator.expected_return(&instrument, &history);
        assert!((e - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_median_over_history() {
        let instrument = stock(0.0);
        let mut history = MarketHistory::new();
        for price in [10.0, 11.0, 11.0, 13.2] {
            history.record(instrument.id(), price);
        }
        let estimator = ReturnEstimator::MedianOverHistory { window: 3 };
        // Step returns: 0.1, 0.0, 0.2 — median 0.1.
        let e = estimator.expected_return(&instrument, &history);
        assert!((e - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_trivial_is_constant() {
        let instrument = stock(0.0);
        let history = MarketHistory::new();
        let estimator = ReturnEstimator::Trivial { value: 0.07 };
        assert_eq!(estimator.expected_return(&instrument, &history), 0.07);
    }
}
