use crate::core::agent::{AgentId, AgentRole};
use crate::core::instrument::{InstrumentClass, InstrumentId, InstrumentRegistry};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Monetary amount. All cash stocks and flows use exact decimal
/// arithmetic so that conservation invariants hold to the last digit.
pub type Money = Decimal;

/// Convert a real-valued amount (a quantity times a price) into money.
///
/// The float-to-decimal conversion is exact for any finite `f64`; callers
/// are expected to pass finite values (order quantities and prices are
/// validated at construction). Non-finite input collapses to zero.
pub fn money_from_f64(value: f64) -> Money {
    Decimal::from_f64_retain(value).unwrap_or(Money::ZERO)
}

/// Seniority of a claim in the liquidation waterfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Seniority {
    /// Paid first, in claim registration order.
    Secured,
    /// Paid pro-rata from whatever remains.
    Unsecured,
}

/// A liability of one agent towards a named counterparty.
///
/// Claims are double-entry: registering a claim through the ledger writes
/// the debtor's liability and the creditor's receivable in one step, so
/// the two sides can never drift apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub creditor: AgentId,
    pub amount: Money,
    pub seniority: Seniority,
}

/// Per-agent balance sheet.
///
/// Equity is always derived — cash plus marked-to-market holdings plus
/// receivables, minus liabilities — and never stored, so it cannot be set
/// inconsistently. Mutation happens only through the settlement and
/// resolution APIs; everything public here is read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceSheet {
    cash: Money,
    /// Instrument holdings by quantity. Loan exposure is not held here;
    /// it lives in `receivables` as a monetary claim.
    holdings: BTreeMap<InstrumentId, f64>,
    /// Money owed to this agent, by debtor.
    receivables: BTreeMap<AgentId, Money>,
    /// Money this agent owes, in registration order.
    liabilities: Vec<Claim>,
}

impl BalanceSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a balance sheet with an opening cash position.
    ///
    /// # Panics
    ///
    /// Panics if `cash` is negative.
    pub fn with_cash(cash: Money) -> Self {
        assert!(cash >= Money::ZERO, "opening cash must be non-negative");
        Self {
            cash,
            ..Self::default()
        }
    }

    /// Add an opening holding (builder style). Opening state is the one
    /// write path outside settlement and resolution.
    ///
    /// # Panics
    ///
    /// Panics if `quantity` is negative or non-finite.
    pub fn with_holding(mut self, instrument: InstrumentId, quantity: f64) -> Self {
        assert!(
            quantity.is_finite() && quantity >= 0.0,
            "opening holding must be non-negative, got {}",
            quantity
        );
        if quantity > 0.0 {
            self.holdings.insert(instrument, quantity);
        }
        self
    }

    pub fn cash(&self) -> Money {
        self.cash
    }

    /// Quantity held of one instrument.
    pub fn holding(&self, instrument: &InstrumentId) -> f64 {
        self.holdings.get(instrument).copied().unwrap_or(0.0)
    }

    /// All holdings in instrument-id order.
    pub fn holdings(&self) -> &BTreeMap<InstrumentId, f64> {
        &self.holdings
    }

    /// Money owed to this agent by one debtor.
    pub fn receivable_from(&self, debtor: &AgentId) -> Money {
        self.receivables
            .get(debtor)
            .copied()
            .unwrap_or(Money::ZERO)
    }

    pub fn receivables(&self) -> &BTreeMap<AgentId, Money> {
        &self.receivables
    }

    /// Liabilities in registration order.
    pub fn liabilities(&self) -> &[Claim] {
        &self.liabilities
    }

    /// Sum of all liabilities.
    pub fn total_liabilities(&self) -> Money {
        self.liabilities.iter().map(|c| c.amount).sum()
    }

    /// Sum of all receivables.
    pub fn total_receivables(&self) -> Money {
        self.receivables.values().copied().sum()
    }

    /// Mark-to-market value of instrument holdings at registry prices.
    ///
    /// Unregistered instruments value at zero.
    pub fn holdings_value(&self, registry: &InstrumentRegistry) -> Money {
        self.holdings
            .iter()
            .map(|(id, &qty)| {
                let price = registry.reference_price(id).unwrap_or(0.0);
                money_from_f64(qty * price)
            })
            .sum()
    }

    /// Total assets: cash + holdings value + receivables.
    pub fn total_assets(&self, registry: &InstrumentRegistry) -> Money {
        self.cash + self.holdings_value(registry) + self.total_receivables()
    }

    /// Equity, derived as assets minus liabilities.
    pub fn equity(&self, registry: &InstrumentRegistry) -> Money {
        self.total_assets(registry) - self.total_liabilities()
    }

    // --- crate-internal mutators, reached only via settlement/resolution ---

    pub(crate) fn credit_cash(&mut self, amount: Money) {
        self.cash += amount;
    }

    /// Debit cash. Returns false (and leaves the sheet untouched) if the
    /// debit would drive cash negative.
    pub(crate) fn debit_cash(&mut self, amount: Money) -> bool {
        if amount > self.cash {
            return false;
        }
        self.cash -= amount;
        true
    }

    /// Apply a signed cash delta that has already been validated to keep
    /// the balance non-negative.
    ///
    /// # Panics
    ///
    /// Panics if the delta would drive cash negative — callers validate
    /// the whole settlement batch against the ledger first.
    pub(crate) fn apply_cash_delta(&mut self, delta: Money) {
        let next = self.cash + delta;
        assert!(
            next >= Money::ZERO,
            "cash delta {} drives balance {} negative",
            delta,
            self.cash
        );
        self.cash = next;
    }

    pub(crate) fn add_holding(&mut self, instrument: &InstrumentId, quantity: f64) {
        let entry = self.holdings.entry(instrument.clone()).or_insert(0.0);
        *entry += quantity;
        // Settlement residue from float arithmetic collapses to zero.
        if entry.abs() < 1e-12 {
            self.holdings.remove(instrument);
        }
    }

    pub(crate) fn remove_holding(&mut self, instrument: &InstrumentId) -> f64 {
        self.holdings.remove(instrument).unwrap_or(0.0)
    }

    pub(crate) fn add_receivable(&mut self, debtor: &AgentId, amount: Money) {
        *self
            .receivables
            .entry(debtor.clone())
            .or_insert(Money::ZERO) += amount;
    }

    /// Extinguish part of a receivable; the entry disappears at zero.
    pub(crate) fn reduce_receivable(&mut self, debtor: &AgentId, amount: Money) {
        if let Some(entry) = self.receivables.get_mut(debtor) {
            *entry -= amount;
            if *entry <= Money::ZERO {
                self.receivables.remove(debtor);
            }
        }
    }

    pub(crate) fn take_receivables(&mut self) -> BTreeMap<AgentId, Money> {
        std::mem::take(&mut self.receivables)
    }

    pub(crate) fn add_liability(&mut self, claim: Claim) {
        // Merge with an existing claim of the same counterparty and
        // seniority; registration order of the first entry is kept.
        for existing in &mut self.liabilities {
            if existing.creditor == claim.creditor && existing.seniority == claim.seniority {
                existing.amount += claim.amount;
                return;
            }
        }
        self.liabilities.push(claim);
    }

    pub(crate) fn take_liabilities(&mut self) -> Vec<Claim> {
        std::mem::take(&mut self.liabilities)
    }
}

/// The set of all balance sheets, keyed by agent.
///
/// The ledger is the single writer-of-record for agent state. Settlement
/// and bankruptcy resolution mutate it through crate-internal APIs; all
/// external access is read-only. Iteration is in agent-id order, which
/// keeps scans (bankruptcy detection in particular) deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    sheets: BTreeMap<AgentId, BalanceSheet>,
    roles: BTreeMap<AgentId, AgentRole>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent with its role and opening balance sheet.
    pub fn register(&mut self, agent: AgentId, role: AgentRole, sheet: BalanceSheet) {
        self.roles.insert(agent.clone(), role);
        self.sheets.insert(agent, sheet);
    }

    pub fn sheet(&self, agent: &AgentId) -> Option<&BalanceSheet> {
        self.sheets.get(agent)
    }

    pub fn role(&self, agent: &AgentId) -> Option<AgentRole> {
        self.roles.get(agent).copied()
    }

    /// All registered agents in id order.
    pub fn agents(&self) -> impl Iterator<Item = &AgentId> {
        self.sheets.keys()
    }

    /// All agents of a given role, in id order.
    pub fn agents_with_role(&self, role: AgentRole) -> Vec<AgentId> {
        self.roles
            .iter()
            .filter(|(_, r)| **r == role)
            .map(|(a, _)| a.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Total cash across all agents. Invariant under settlement: a trade
    /// moves cash, it never creates or destroys it.
    pub fn total_cash(&self) -> Money {
        self.sheets.values().map(|s| s.cash()).sum()
    }

    /// Total equity across all agents at registry prices.
    pub fn total_equity(&self, registry: &InstrumentRegistry) -> Money {
        self.sheets.values().map(|s| s.equity(registry)).sum()
    }

    /// Register a claim: the debtor's liability and the creditor's
    /// receivable are written together.
    ///
    /// # Panics
    ///
    /// Panics if either agent is unregistered or the amount not positive.
    pub fn add_claim(
        &mut self,
        debtor: &AgentId,
        creditor: &AgentId,
        amount: Money,
        seniority: Seniority,
    ) {
        assert!(amount > Money::ZERO, "claim amount must be positive");
        assert!(
            self.sheets.contains_key(debtor) && self.sheets.contains_key(creditor),
            "claim endpoints must be registered agents"
        );
        self.sheets.get_mut(debtor).unwrap().add_liability(Claim {
            creditor: creditor.clone(),
            amount,
            seniority,
        });
        self.sheets
            .get_mut(creditor)
            .unwrap()
            .add_receivable(debtor, amount);
    }

    pub(crate) fn sheet_mut(&mut self, agent: &AgentId) -> Option<&mut BalanceSheet> {
        self.sheets.get_mut(agent)
    }

    /// Move cash between two agents. Returns false (and changes nothing)
    /// if the payer cannot cover the amount or either agent is unknown.
    pub(crate) fn transfer_cash(&mut self, from: &AgentId, to: &AgentId, amount: Money) -> bool {
        if !self.sheets.contains_key(from) || !self.sheets.contains_key(to) {
            return false;
        }
        if !self.sheets.get_mut(from).unwrap().debit_cash(amount) {
            return false;
        }
        self.sheets.get_mut(to).unwrap().credit_cash(amount);
        true
    }

    /// Re-point every liability claim held against `old_creditor` to
    /// `new_creditor`, keeping seniority and registration order. Used
    /// when a liquidated institution's loan book moves to the absorber.
    pub(crate) fn retarget_claims(&mut self, old_creditor: &AgentId, new_creditor: &AgentId) {
        for sheet in self.sheets.values_mut() {
            for claim in &mut sheet.liabilities {
                if claim.creditor == *old_creditor {
                    claim.creditor = new_creditor.clone();
                }
            }
        }
    }

    /// Write off every agent's holding of the given instruments.
    ///
    /// Returns the total marked-to-market value destroyed. Used when an
    /// institution's equity issues are erased during resolution.
    pub(crate) fn write_off_holdings(
        &mut self,
        instruments: &[InstrumentId],
        registry: &InstrumentRegistry,
    ) -> Money {
        let mut destroyed = Money::ZERO;
        for sheet in self.sheets.values_mut() {
            for id in instruments {
                let qty = sheet.remove_holding(id);
                if qty != 0.0 {
                    let price = registry.reference_price(id).unwrap_or(0.0);
                    destroyed += money_from_f64(qty * price);
                }
            }
        }
        destroyed
    }
}

impl fmt::Display for BalanceSheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cash:        {}", self.cash)?;
        for (id, qty) in &self.holdings {
            writeln!(f, "holding:     {} x {}", qty, id)?;
        }
        for (debtor, amount) in &self.receivables {
            writeln!(f, "receivable:  {} from {}", amount, debtor)?;
        }
        for claim in &self.liabilities {
            writeln!(
                f,
                "liability:   {} to {} ({:?})",
                claim.amount, claim.creditor, claim.seniority
            )?;
        }
        Ok(())
    }
}
