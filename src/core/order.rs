use crate::core::agent::AgentId;
use crate::core::instrument::InstrumentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which side of the market an order sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Demand: an offer to buy.
    Bid,
    /// Supply: an offer to sell.
    Ask,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "bid"),
            Side::Ask => write!(f, "ask"),
        }
    }
}

/// Sequential order identifier, assigned at submission.
///
/// Ids encode arrival order: a lower id was submitted earlier in the
/// round, which is what the stable tie-breaks in matching rely on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A limit order for one instrument.
///
/// Orders are immutable once submitted and are consumed by matching
/// within a single clearing round.
///
/// # Examples
///
/// ```
/// use clearing_core::core::agent::AgentId;
/// use clearing_core::core::instrument::InstrumentId;
/// use clearing_core::core::order::{Order, OrderId, Side};
///
/// let order = Order::new(
///     OrderId(1),
///     AgentId::new("HH-001"),
///     InstrumentId::new("GOODS-GRAIN"),
///     Side::Bid,
///     10.0,
///     2.5,
/// );
/// assert_eq!(order.quantity(), 10.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    agent: AgentId,
    instrument: InstrumentId,
    side: Side,
    quantity: f64,
    limit_price: f64,
}

impl Order {
    /// Create a new order.
    ///
    /// # Panics
    ///
    /// Panics if `quantity` is not positive and finite, or if
    /// `limit_price` is negative or non-finite.
    pub fn new(
        id: OrderId,
        agent: AgentId,
        instrument: InstrumentId,
        side: Side,
        quantity: f64,
        limit_price: f64,
    ) -> Self {
        assert!(
            quantity.is_finite() && quantity > 0.0,
            "order quantity must be positive, got {}",
            quantity
        );
        assert!(
            limit_price.is_finite() && limit_price >= 0.0,
            "order limit price must be non-negative, got {}",
            limit_price
        );
        Self {
            id,
            agent,
            instrument,
            side,
            quantity,
            limit_price,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn agent(&self) -> &AgentId {
        &self.agent
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn limit_price(&self) -> f64 {
        self.limit_price
    }
}

/// An order as requested by an agent, before an id has been assigned.
///
/// The clearing market stamps the arrival-order id at submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub instrument: InstrumentId,
    pub side: Side,
    pub quantity: f64,
    pub limit_price: f64,
}

/// Pending orders for the instruments of one clearing market, held in
/// arrival order.
///
/// The order book is owned exclusively by its clearing market for the
/// duration of a round; agents interact with it only through the market's
/// submission API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    orders: Vec<Order>,
    next_id: u64,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp an arrival-order id onto a request and enqueue it.
    pub fn submit(&mut self, agent: AgentId, request: OrderRequest) -> OrderId {
        let id = OrderId(self.next_id);
        self.next_id += 1;
        self.orders.push(Order::new(
            id,
            agent,
            request.instrument,
            request.side,
            request.quantity,
            request.limit_price,
        ));
        id
    }

    /// All pending orders in arrival order.
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Pending orders for one instrument, split by side, arrival order
    /// preserved within each side.
    pub fn orders_for(&self, instrument: &InstrumentId) -> (Vec<&Order>, Vec<&Order>) {
        let mut bids = Vec::new();
        let mut asks = Vec::new();
        for order in &self.orders {
            if order.instrument() == instrument {
                match order.side() {
                    Side::Bid => bids.push(order),
                    Side::Ask => asks.push(order),
                }
            }
        }
        (bids, asks)
    }

    /// The distinct instruments with pending orders, in id order.
    pub fn instruments(&self) -> Vec<InstrumentId> {
        let mut set: BTreeMap<&InstrumentId, ()> = BTreeMap::new();
        for order in &self.orders {
            set.insert(order.instrument(), ());
        }
        set.into_keys().cloned().collect()
    }

    /// Drop all pending orders. Id assignment continues from where it was,
    /// so ids stay unique across rounds.
    pub fn drain(&mut self) -> Vec<Order> {
        std::mem::take(&mut self.orders)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(instrument: &str, side: Side, qty: f64, price: f64) -> OrderRequest {
        OrderRequest {
            instrument: InstrumentId::new(instrument),
            side,
            quantity: qty,
            limit_price: price,
        }
    }

    #[test]
    fn test_submission_assigns_sequential_ids() {
        let mut book = OrderBook::new();
        let a = book.submit(AgentId::new("A"), request("GRAIN", Side::Bid, 1.0, 2.0));
        let b = book.submit(AgentId::new("B"), request("GRAIN", Side::Ask, 1.0, 2.0));
        assert!(a < b);
        assert_eq!(book.len(), 2);
    }

    #[test]
    fn test_orders_for_splits_by_side() {
        let mut book = OrderBook::new();
        book.submit(AgentId::new("A"), request("GRAIN", Side::Bid, 1.0, 2.0));
        book.submit(AgentId::new("B"), request("GRAIN", Side::Ask, 3.0, 1.5));
        book.submit(AgentId::new("C"), request("LABOUR", Side::Ask, 8.0, 1.0));

        let (bids, asks) = book.orders_for(&InstrumentId::new("GRAIN"));
        assert_eq!(bids.len(), 1);
        assert_eq!(asks.len(), 1);
        assert_eq!(asks[0].agent().as_str(), "B");
    }

    #[test]
    fn test_drain_preserves_id_sequence() {
        let mut book = OrderBook::new();
        book.submit(AgentId::new("A"), request("GRAIN", Side::Bid, 1.0, 2.0));
        let drained = book.drain();
        assert_eq!(drained.len(), 1);
        assert!(book.is_empty());

        let next = book.submit(AgentId::new("B"), request("GRAIN", Side::Bid, 1.0, 2.0));
        assert_eq!(next, OrderId(1));
    }

    #[test]
    #[should_panic(expected = "must be positive")]
    fn test_zero_quantity_rejected() {
        Order::new(
            OrderId(0),
            AgentId::new("A"),
            InstrumentId::new("GRAIN"),
            Side::Bid,
            0.0,
            1.0,
        );
    }
}
