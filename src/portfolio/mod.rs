//! Portfolio allocation: return expectations, weighting, smoothing,
//! rebalancing and credit demand.

pub mod allocation;
pub mod credit;
pub mod returns;
pub mod smoothing;
pub mod weighting;
