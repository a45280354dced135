use crate::core::agent::AgentId;
use crate::core::balance::{money_from_f64, Money};
use crate::core::instrument::InstrumentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A settled trade between a buyer and a seller.
///
/// Trades are immutable once created and are appended to the settlement
/// log by the clearing market. The id and timestamp are audit metadata;
/// no algorithm consults them, so they do not affect reproducibility of
/// the simulated trajectory.
///
/// # Examples
///
/// ```
/// use clearing_core::core::agent::AgentId;
/// use clearing_core::core::instrument::InstrumentId;
/// use clearing_core::core::trade::Trade;
/// use rust_decimal_macros::dec;
///
/// let trade = Trade::new(
///     AgentId::new("HH-001"),
///     AgentId::new("FIRM-001"),
///     InstrumentId::new("GOODS-GRAIN"),
///     4.0,
///     2.5,
///     0,
/// );
/// assert_eq!(trade.cost(), dec!(10));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    id: Uuid,
    buyer: AgentId,
    seller: AgentId,
    instrument: InstrumentId,
    quantity: f64,
    price: f64,
    round: u64,
    created_at: DateTime<Utc>,
}

impl Trade {
    /// Create a new trade record.
    ///
    /// # Panics
    ///
    /// Panics if `quantity` or `price` is negative or non-finite.
    pub fn new(
        buyer: AgentId,
        seller: AgentId,
        instrument: InstrumentId,
        quantity: f64,
        price: f64,
        round: u64,
    ) -> Self {
        assert!(
            quantity.is_finite() && quantity >= 0.0,
            "trade quantity must be non-negative, got {}",
            quantity
        );
        assert!(
            price.is_finite() && price >= 0.0,
            "trade price must be non-negative, got {}",
            price
        );
        Self {
            id: Uuid::new_v4(),
            buyer,
            seller,
            instrument,
            quantity,
            price,
            round,
            created_at: Utc::now(),
        }
    }

    /// Create a trade with a specific id (useful for testing).
    pub fn with_id(
        id: Uuid,
        buyer: AgentId,
        seller: AgentId,
        instrument: InstrumentId,
        quantity: f64,
        price: f64,
        round: u64,
    ) -> Self {
        let mut trade = Self::new(buyer, seller, instrument, quantity, price, round);
        trade.id = id;
        trade
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn buyer(&self) -> &AgentId {
        &self.buyer
    }

    pub fn seller(&self) -> &AgentId {
        &self.seller
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Monetary cost of the trade: quantity times price, as money.
    ///
    /// Settlement debits the buyer and credits the seller by this exact
    /// value, so total cash is invariant under a trade.
    pub fn cost(&self) -> Money {
        money_from_f64(self.quantity * self.price)
    }
}

/// Append-only log of settled trades, the audit trail of clearing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementLog {
    trades: Vec<Trade>,
}

impl SettlementLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    pub fn extend(&mut self, trades: impl IntoIterator<Item = Trade>) {
        self.trades.extend(trades);
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Trades settled in one round.
    pub fn trades_in_round(&self, round: u64) -> Vec<&Trade> {
        self.trades.iter().filter(|t| t.round() == round).collect()
    }

    /// Trades in which one agent appears on either side.
    pub fn trades_of(&self, agent: &AgentId) -> Vec<&Trade> {
        self.trades
            .iter()
            .filter(|t| t.buyer() == agent || t.seller() == agent)
            .collect()
    }

    /// Total traded value across the whole log.
    pub fn total_value(&self) -> Money {
        self.trades.iter().map(|t| t.cost()).sum()
    }

    /// Volume-weighted average price of an instrument in one round,
    /// or None if nothing traded.
    pub fn vwap(&self, instrument: &InstrumentId, round: u64) -> Option<f64> {
        let mut volume = 0.0;
        let mut value = 0.0;
        for trade in &self.trades {
            if trade.round() == round && trade.instrument() == instrument {
                volume += trade.quantity();
                value += trade.quantity() * trade.price();
            }
        }
        if volume > 0.0 {
            Some(value / volume)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_trade(qty: f64, price: f64, round: u64) -> Trade {
        Trade::new(
            AgentId::new("BUYER"),
            AgentId::new("SELLER"),
            InstrumentId::new("GRAIN"),
            qty,
            price,
            round,
        )
    }

    #[test]
    fn test_trade_cost_exact() {
        let trade = sample_trade(4.0, 2.5, 0);
        assert_eq!(trade.cost(), dec!(10));
    }

    #[test]
    fn test_log_query_by_round() {
        let mut log = SettlementLog::new();
        log.append(sample_trade(1.0, 1.0, 0));
        log.append(sample_trade(2.0, 1.0, 1));
        log.append(sample_trade(3.0, 1.0, 1));

        assert_eq!(log.trades_in_round(1).len(), 2);
        assert_eq!(log.trades_of(&AgentId::new("BUYER")).len(), 3);
        assert_eq!(log.total_value(), dec!(6));
    }

    #[test]
    fn test_vwap() {
        let mut log = SettlementLog::new();
        log.append(sample_trade(10.0, 2.0, 3));
        log.append(sample_trade(30.0, 4.0, 3));

        let vwap = log.vwap(&InstrumentId::new("GRAIN"), 3).unwrap();
        assert!((vwap - 3.5).abs() < 1e-12);
        assert!(log.vwap(&InstrumentId::new("GRAIN"), 4).is_none());
    }

    #[test]
    #[should_panic(expected = "non-negative")]
    fn test_negative_quantity_rejected() {
        sample_trade(-1.0, 1.0, 0);
    }
}
