use crate::core::agent::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Unique identifier for a tradable instrument.
///
/// # Examples
///
/// ```
/// use clearing_core::core::instrument::InstrumentId;
///
/// let grain = InstrumentId::new("GOODS-GRAIN");
/// let labour = InstrumentId::new("LABOUR");
/// assert_ne!(grain, labour);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Class of a tradable instrument.
///
/// The class decides the settlement semantics of a trade:
///
/// - `Goods` and `Equity` transfer existing inventory, so the seller must
///   hold the quantity being sold;
/// - `Labour` is a flow sold into existence each round;
/// - `Loan` settles as discount paper: the buyer (lender) pays the price,
///   and a claim for the face value is registered against the seller
///   (borrower).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentClass {
    /// A goods sector, identified by an opaque sector name.
    Goods { sector: String },
    /// One unit of labour.
    Labour,
    /// A loan class. The quoted price is the discount price per unit of
    /// face value; the implied interest rate is `1/price - 1`.
    Loan,
    /// Shares issued by an agent.
    Equity { issuer: AgentId },
}

impl InstrumentClass {
    /// Whether trades in this class draw down existing seller inventory.
    pub fn requires_inventory(&self) -> bool {
        matches!(
            self,
            InstrumentClass::Goods { .. } | InstrumentClass::Equity { .. }
        )
    }
}

/// A tradable instrument: a goods sector, a labour unit, a loan class or
/// an equity issue.
///
/// Instruments carry a reference price (updated between rounds from
/// realised trades) and, for equity, a dividend per share. They hold no
/// other mutable state beyond registry membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    id: InstrumentId,
    class: InstrumentClass,
    /// Current reference price per unit. Must be positive.
    reference_price: f64,
    /// Dividend per share, used by fundamentalist return expectations.
    /// Zero for non-equity instruments.
    dividend_per_share: f64,
}

impl Instrument {
    /// Create a new instrument.
    ///
    /// # Panics
    ///
    /// Panics if `reference_price` is not positive and finite, or if
    /// `dividend_per_share` is negative or non-finite.
    pub fn new(id: InstrumentId, class: InstrumentClass, reference_price: f64) -> Self {
        assert!(
            reference_price.is_finite() && reference_price > 0.0,
            "instrument reference price must be positive, got {}",
            reference_price
        );
        Self {
            id,
            class,
            reference_price,
            dividend_per_share: 0.0,
        }
    }

    /// Set the dividend per share (builder style).
    pub fn with_dividend(mut self, dividend_per_share: f64) -> Self {
        assert!(
            dividend_per_share.is_finite() && dividend_per_share >= 0.0,
            "dividend per share must be non-negative, got {}",
            dividend_per_share
        );
        self.dividend_per_share = dividend_per_share;
        self
    }

    pub fn id(&self) -> &InstrumentId {
        &self.id
    }

    pub fn class(&self) -> &InstrumentClass {
        &self.class
    }

    pub fn reference_price(&self) -> f64 {
        self.reference_price
    }

    pub fn dividend_per_share(&self) -> f64 {
        self.dividend_per_share
    }
}

/// Registry of all tradable instruments known to the simulation.
///
/// Iteration order is the sort order of instrument ids, which keeps every
/// pass over the registry deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstrumentRegistry {
    instruments: BTreeMap<InstrumentId, Instrument>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an instrument, replacing any previous entry with the same id.
    pub fn insert(&mut self, instrument: Instrument) {
        self.instruments.insert(instrument.id().clone(), instrument);
    }

    pub fn get(&self, id: &InstrumentId) -> Option<&Instrument> {
        self.instruments.get(id)
    }

    /// Reference price for an instrument, if registered.
    pub fn reference_price(&self, id: &InstrumentId) -> Option<f64> {
        self.instruments.get(id).map(|i| i.reference_price)
    }

    /// Update the reference price of a registered instrument.
    ///
    /// Returns false if the instrument is unknown or the price invalid.
    pub fn set_reference_price(&mut self, id: &InstrumentId, price: f64) -> bool {
        if !(price.is_finite() && price > 0.0) {
            return false;
        }
        match self.instruments.get_mut(id) {
            Some(instrument) => {
                instrument.reference_price = price;
                true
            }
            None => false,
        }
    }

    /// All instruments in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }

    /// All instruments of a given issuer's equity.
    pub fn equity_of(&self, issuer: &AgentId) -> Vec<&Instrument> {
        self.instruments
            .values()
            .filter(|i| matches!(i.class(), InstrumentClass::Equity { issuer: who } if who == issuer))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}
