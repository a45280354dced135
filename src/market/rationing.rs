use crate::core::agent::AgentId;
use crate::core::instrument::InstrumentId;
use crate::core::order::Side;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Strategy for allocating scarce quantity when aggregate supply and
/// demand do not meet.
///
/// Only the long side of the market is rationed; the short side trades
/// in full. Both variants iterate agents in id order and draw randomness
/// only from the per-round generator, so a round re-run with the same
/// seed produces bit-identical allocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RationingPolicy {
    /// Every agent receives the same fill ratio (pro-rata by requested
    /// quantity), ties broken by stable agent order.
    Homogeneous,
    /// A fraction of agents, drawn at random, is denied service entirely;
    /// the remainder is filled pro-rata from the rest.
    ///
    /// `inhomogeneity` is the denial probability per agent, in [0, 1].
    /// Zero degenerates exactly to homogeneous rationing.
    RandomDeny { inhomogeneity: f64 },
}

/// Per-round allocation of scarce quantity across the long side of one
/// instrument's market.
///
/// Transient: produced once per clearing round, consumed by settlement,
/// and kept only for audit. Guarantees, for every rationed agent `a`:
/// `allocated[a] <= requested[a]`, and `sum(allocated) <= min(supply,
/// demand)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RationingDecision {
    pub instrument: InstrumentId,
    /// The side that was cut back; None when the market already balanced
    /// (or was empty) and nobody was rationed.
    pub rationed_side: Option<Side>,
    /// Allocated quantity per agent on the rationed side.
    pub allocated: BTreeMap<AgentId, f64>,
    /// Requested quantity per agent on the rationed side, for audit.
    pub requested: BTreeMap<AgentId, f64>,
}

impl RationingDecision {
    /// A decision in which nobody was rationed.
    pub fn unconstrained(instrument: InstrumentId) -> Self {
        Self {
            instrument,
            rationed_side: None,
            allocated: BTreeMap::new(),
            requested: BTreeMap::new(),
        }
    }

    /// Allocated quantity for an agent on the given side. Agents on the
    /// unrationed side (or in an unconstrained round) keep their full
    /// requested quantity, signalled here by None.
    pub fn allocation_for(&self, agent: &AgentId, side: Side) -> Option<f64> {
        match self.rationed_side {
            Some(rationed) if rationed == side => {
                Some(self.allocated.get(agent).copied().unwrap_or(0.0))
            }
            _ => None,
        }
    }

    /// Total allocated quantity on the rationed side.
    pub fn total_allocated(&self) -> f64 {
        self.allocated.values().sum()
    }
}

/// Ration the long side of a market down to the short side's volume.
///
/// `demand` and `supply` are per-agent marketable volumes. A total of
/// exactly zero on either side yields an unconstrained decision (the
/// market simply does not trade), never a division fault.
pub fn ration(
    instrument: &InstrumentId,
    demand: &BTreeMap<AgentId, f64>,
    supply: &BTreeMap<AgentId, f64>,
    policy: &RationingPolicy,
    rng: &mut StdRng,
) -> RationingDecision {
    let total_demand: f64 = demand.values().sum();
    let total_supply: f64 = supply.values().sum();

    if total_demand <= 0.0 || total_supply <= 0.0 {
        return RationingDecision::unconstrained(instrument.clone());
    }

    let (side, requested, target) = if total_demand > total_supply {
        (Side::Bid, demand, total_supply)
    } else if total_supply > total_demand {
        (Side::Ask, supply, total_demand)
    } else {
        return RationingDecision::unconstrained(instrument.clone());
    };

    let allocated = match policy {
        RationingPolicy::Homogeneous => pro_rata(requested, target),
        RationingPolicy::RandomDeny { inhomogeneity } => {
            random_deny(requested, target, *inhomogeneity, rng)
        }
    };

    RationingDecision {
        instrument: instrument.clone(),
        rationed_side: Some(side),
        allocated,
        requested: requested.clone(),
    }
}

/// Uniform fill ratio: every agent gets `target / total` of its request.
fn pro_rata(requested: &BTreeMap<AgentId, f64>, target: f64) -> BTreeMap<AgentId, f64> {
    let total: f64 = requested.values().sum();
    let ratio = (target / total).min(1.0);
    requested
        .iter()
        .map(|(agent, &quantity)| (agent.clone(), quantity * ratio))
        .collect()
}

/// Deny each agent with probability `inhomogeneity`, then fill the
/// survivors pro-rata, capped at their requested quantities.
fn random_deny(
    requested: &BTreeMap<AgentId, f64>,
    target: f64,
    inhomogeneity: f64,
    rng: &mut StdRng,
) -> BTreeMap<AgentId, f64> {
    // Denial draws happen in agent-id order; the BTreeMap guarantees the
    // iteration sequence, so the same seed always denies the same agents.
    let denied: BTreeMap<&AgentId, bool> = requested
        .keys()
        .map(|agent| (agent, rng.gen_bool(inhomogeneity)))
        .collect();

    let surviving_total: f64 = requested
        .iter()
        .filter(|(agent, _)| !denied[*agent])
        .map(|(_, &q)| q)
        .sum();

    if surviving_total <= 0.0 {
        // Everyone denied: nobody trades this round.
        return requested.keys().map(|a| (a.clone(), 0.0)).collect();
    }

    let ratio = (target / surviving_total).min(1.0);
    requested
        .iter()
        .map(|(agent, &quantity)| {
            let fill = if denied[agent] { 0.0 } else { quantity * ratio };
            (agent.clone(), fill)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn volumes(entries: &[(&str, f64)]) -> BTreeMap<AgentId, f64> {
        entries
            .iter()
            .map(|(name, qty)| (AgentId::new(*name), *qty))
            .collect()
    }

    fn grain() -> InstrumentId {
        InstrumentId::new("GRAIN")
    }

    #[test]
    fn test_homogeneous_pro_rata_fairness() {
        // Demand 50 split equally across two agents against supply 30:
        // each receives exactly 15.
        let demand = volumes(&[("A", 25.0), ("B", 25.0)]);
        let supply = volumes(&[("S", 30.0)]);
        let mut rng = StdRng::seed_from_u64(1);

        let decision = ration(
            &grain(),
            &demand,
            &supply,
            &RationingPolicy::Homogeneous,
            &mut rng,
        );
        assert_eq!(decision.rationed_side, Some(Side::Bid));
        assert!((decision.allocated[&AgentId::new("A")] - 15.0).abs() < 1e-9);
        assert!((decision.allocated[&AgentId::new("B")] - 15.0).abs() < 1e-9);
        assert!((decision.total_allocated() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_supply_side_rationed_when_long() {
        let demand = volumes(&[("A", 10.0)]);
        let supply = volumes(&[("S1", 20.0), ("S2", 20.0)]);
        let mut rng = StdRng::seed_from_u64(1);

        let decision = ration(
            &grain(),
            &demand,
            &supply,
            &RationingPolicy::Homogeneous,
            &mut rng,
        );
        assert_eq!(decision.rationed_side, Some(Side::Ask));
        assert!((decision.total_allocated() - 10.0).abs() < 1e-9);
        assert!((decision.allocated[&AgentId::new("S1")] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_volume_is_not_a_fault() {
        let demand = volumes(&[("A", 10.0)]);
        let supply = BTreeMap::new();
        let mut rng = StdRng::seed_from_u64(1);

        let decision = ration(
            &grain(),
            &demand,
            &supply,
            &RationingPolicy::Homogeneous,
            &mut rng,
        );
        assert!(decision.rationed_side.is_none());
        assert!(decision.allocated.is_empty());
    }

    #[test]
    fn test_random_deny_zero_is_homogeneous() {
        let demand = volumes(&[("A", 10.0), ("B", 30.0), ("C", 5.0)]);
        let supply = volumes(&[("S", 20.0)]);

        for seed in 0..16 {
            let homogeneous = ration(
                &grain(),
                &demand,
                &supply,
                &RationingPolicy::Homogeneous,
                &mut StdRng::seed_from_u64(seed),
            );
            let random_deny = ration(
                &grain(),
                &demand,
                &supply,
                &RationingPolicy::RandomDeny { inhomogeneity: 0.0 },
                &mut StdRng::seed_from_u64(seed),
            );
            assert_eq!(homogeneous.allocated, random_deny.allocated);
        }
    }

    #[test]
    fn test_random_deny_never_over_allocates() {
        let demand = volumes(&[("A", 12.0), ("B", 7.0), ("C", 21.0), ("D", 3.0)]);
        let supply = volumes(&[("S", 25.0)]);

        for seed in 0..32 {
            let decision = ration(
                &grain(),
                &demand,
                &supply,
                &RationingPolicy::RandomDeny { inhomogeneity: 0.4 },
                &mut StdRng::seed_from_u64(seed),
            );
            assert!(decision.total_allocated() <= 25.0 + 1e-9);
            for (agent, &allocated) in &decision.allocated {
                assert!(allocated <= demand[agent] + 1e-9);
            }
        }
    }

    #[test]
    fn test_random_deny_is_seed_deterministic() {
        let demand = volumes(&[("A", 12.0), ("B", 7.0), ("C", 21.0)]);
        let supply = volumes(&[("S", 10.0)]);
        let policy = RationingPolicy::RandomDeny { inhomogeneity: 0.5 };

        let one = ration(
            &grain(),
            &demand,
            &supply,
            &policy,
            &mut StdRng::seed_from_u64(9),
        );
        let two = ration(
            &grain(),
            &demand,
            &supply,
            &policy,
            &mut StdRng::seed_from_u64(9),
        );
        assert_eq!(one.allocated, two.allocated);
    }

    #[test]
    fn test_balanced_market_is_unconstrained() {
        let demand = volumes(&[("A", 10.0)]);
        let supply = volumes(&[("S", 10.0)]);
        let mut rng = StdRng::seed_from_u64(1);

        let decision = ration(
            &grain(),
            &demand,
            &supply,
            &RationingPolicy::Homogeneous,
            &mut rng,
        );
        assert!(decision.rationed_side.is_none());
    }
}
