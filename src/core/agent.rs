use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an agent in the simulated economy.
///
/// An agent can represent a household, firm, commercial bank, investment
/// fund, government, or any other balance-sheet-carrying entity. The core
/// treats agent identifiers as opaque keys; naming conventions are the
/// responsibility of the surrounding model.
///
/// # Examples
///
/// ```
/// use clearing_core::core::agent::AgentId;
///
/// let bank = AgentId::new("BANK-001");
/// let fund = AgentId::new("FUND-001");
/// assert_ne!(bank, fund);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create a new agent identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this agent ID.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Economic role of an agent.
///
/// Roles are supplied by the external model taxonomy. The core consults
/// them in exactly one place: when a liquidated institution's former
/// counterparties must be reassigned to a surviving institution of the
/// same role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentRole {
    Household,
    Firm,
    Bank,
    Fund,
    Government,
    /// Asset-absorption role used during liquidation.
    BadBank,
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentRole::Household => "household",
            AgentRole::Firm => "firm",
            AgentRole::Bank => "bank",
            AgentRole::Fund => "fund",
            AgentRole::Government => "government",
            AgentRole::BadBank => "bad-bank",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_equality() {
        let a = AgentId::new("BANK-001");
        let b = AgentId::new("BANK-001");
        let c = AgentId::new("BANK-002");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_agent_display() {
        let a = AgentId::new("HH-042");
        assert_eq!(format!("{}", a), "HH-042");
    }

    #[test]
    fn test_agent_ordering() {
        let a = AgentId::new("A-FUND");
        let b = AgentId::new("B-FUND");
        assert!(a < b);
    }
}
