use crate::core::agent::AgentId;
use crate::core::balance::{Ledger, Money, Seniority};
use crate::core::instrument::InstrumentRegistry;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What one creditor received out of a liquidation, and what it lost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditorPayout {
    pub creditor: AgentId,
    pub seniority: Seniority,
    pub claim: Money,
    pub paid: Money,
    /// The unpaid residue, absorbed by the creditor as a capital loss.
    pub loss: Money,
}

/// Full record of a liquidation.
///
/// Under-recovery is a recorded outcome, never an error: unpaid claims
/// show up as creditor losses, and the shortfall is the sum of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationReport {
    pub institution: AgentId,
    /// Marked-to-market value of assets sold to the absorber.
    pub asset_value: Money,
    /// Cash available to pay creditors (including pre-existing cash).
    pub proceeds: Money,
    pub payouts: Vec<CreditorPayout>,
    /// Total creditor losses.
    pub shortfall: Money,
    /// Value of the institution's issued equity erased from holders.
    pub equity_written_off: Money,
    /// Substitute counterparty assigned to each former creditor so the
    /// simulation can continue; empty when no same-role institution
    /// survives.
    pub reassignments: BTreeMap<AgentId, AgentId>,
}

/// Liquidate an institution as an atomic balance-sheet transition.
///
/// 1. The institution's issued equity is erased from every holder.
/// 2. All assets (holdings and receivables) transfer to the absorber at
///    face value for immediate cash, capped by the absorber's cash.
/// 3. Proceeds pay secured creditors first, in claim registration order,
///    then unsecured creditors pro-rata by claim size (ties resolved by
///    the same stable order).
/// 4. Former creditors are reassigned a substitute counterparty drawn
///    uniformly from the surviving same-role institutions.
pub(crate) fn liquidate(
    ledger: &mut Ledger,
    registry: &InstrumentRegistry,
    institution: &AgentId,
    absorber: &AgentId,
    rng: &mut StdRng,
) -> LiquidationReport {
    // (1) Erase the institution's issued shares; holders bear the loss.
    let issued: Vec<_> = registry
        .equity_of(institution)
        .iter()
        .map(|i| i.id().clone())
        .collect();
    let equity_written_off = ledger.write_off_holdings(&issued, registry);

    // (2) Sell the whole asset side to the absorber.
    let sheet = ledger.sheet(institution).expect("institution registered");
    let asset_value = sheet.holdings_value(registry) + sheet.total_receivables();
    let absorber_cash = ledger.sheet(absorber).map(|s| s.cash()).unwrap_or(Money::ZERO);
    let sale_price = asset_value.min(absorber_cash);
    if sale_price < asset_value {
        warn!(
            "liquidation of {}: absorber {} can fund only {} of {} asset value",
            institution, absorber, sale_price, asset_value
        );
    }

    let holdings: Vec<_> = ledger
        .sheet(institution)
        .expect("institution registered")
        .holdings()
        .iter()
        .map(|(id, &qty)| (id.clone(), qty))
        .collect();
    for (id, qty) in holdings {
        ledger
            .sheet_mut(institution)
            .expect("institution registered")
            .add_holding(&id, -qty);
        ledger
            .sheet_mut(absorber)
            .expect("absorber registered")
            .add_holding(&id, qty);
    }
    let receivables = ledger
        .sheet_mut(institution)
        .expect("institution registered")
        .take_receivables();
    for (debtor, amount) in receivables {
        ledger
            .sheet_mut(absorber)
            .expect("absorber registered")
            .add_receivable(&debtor, amount);
    }
    ledger.retarget_claims(institution, absorber);
    ledger.transfer_cash(absorber, institution, sale_price);

    // (3) Pay out the waterfall from everything the institution now has.
    let mut remaining = ledger
        .sheet(institution)
        .expect("institution registered")
        .cash();
    let proceeds = remaining;

    let claims = ledger
        .sheet_mut(institution)
        .expect("institution registered")
        .take_liabilities();
    let secured: Vec<_> = claims
        .iter()
        .filter(|c| c.seniority == Seniority::Secured)
        .cloned()
        .collect();
    let unsecured: Vec<_> = claims
        .iter()
        .filter(|c| c.seniority == Seniority::Unsecured)
        .cloned()
        .collect();

    let mut payouts = Vec::with_capacity(claims.len());

    for claim in &secured {
        let paid = claim.amount.min(remaining);
        remaining -= paid;
        settle_payout(ledger, institution, claim.creditor.clone(), paid);
        payouts.push(CreditorPayout {
            creditor: claim.creditor.clone(),
            seniority: Seniority::Secured,
            claim: claim.amount,
            paid,
            loss: claim.amount - paid,
        });
    }

    let unsecured_total: Money = unsecured.iter().map(|c| c.amount).sum();
    let unsecured_pool = remaining;
    for claim in &unsecured {
        let share = if unsecured_total > Money::ZERO {
            unsecured_pool * claim.amount / unsecured_total
        } else {
            Money::ZERO
        };
        let paid = share.min(claim.amount).min(remaining);
        remaining -= paid;
        settle_payout(ledger, institution, claim.creditor.clone(), paid);
        payouts.push(CreditorPayout {
            creditor: claim.creditor.clone(),
            seniority: Seniority::Unsecured,
            claim: claim.amount,
            paid,
            loss: claim.amount - paid,
        });
    }

    // Receivables for the extinguished claims come off the creditor
    // sheets: losses are absorbed, never backfilled.
    for payout in &payouts {
        if let Some(creditor) = ledger.sheet_mut(&payout.creditor) {
            creditor.reduce_receivable(institution, payout.claim);
        }
    }

    let shortfall: Money = payouts.iter().map(|p| p.loss).sum();

    // (4) Reassign counterparties to a surviving same-role institution.
    let reassignments = reassign_counterparties(ledger, institution, absorber, &payouts, rng);

    info!(
        "liquidated {}: assets {}, proceeds {}, shortfall {}, {} creditors",
        institution,
        asset_value,
        proceeds,
        shortfall,
        payouts.len()
    );

    LiquidationReport {
        institution: institution.clone(),
        asset_value,
        proceeds,
        payouts,
        shortfall,
        equity_written_off,
        reassignments,
    }
}

fn settle_payout(ledger: &mut Ledger, institution: &AgentId, creditor: AgentId, paid: Money) {
    if paid > Money::ZERO {
        ledger.transfer_cash(institution, &creditor, paid);
    }
}

fn reassign_counterparties(
    ledger: &Ledger,
    institution: &AgentId,
    absorber: &AgentId,
    payouts: &[CreditorPayout],
    rng: &mut StdRng,
) -> BTreeMap<AgentId, AgentId> {
    let role = match ledger.role(institution) {
        Some(role) => role,
        None => return BTreeMap::new(),
    };
    let survivors: Vec<AgentId> = ledger
        .agents_with_role(role)
        .into_iter()
        .filter(|a| a != institution && a != absorber)
        .collect();
    if survivors.is_empty() {
        warn!(
            "liquidation of {}: no surviving {} to take over counterparties",
            institution, role
        );
        return BTreeMap::new();
    }

    let mut reassignments = BTreeMap::new();
    for payout in payouts {
        // A creditor of the same role never substitutes for itself.
        let candidates: Vec<&AgentId> =
            survivors.iter().filter(|s| **s != payout.creditor).collect();
        if candidates.is_empty() {
            continue;
        }
        reassignments
            .entry(payout.creditor.clone())
            .or_insert_with(|| candidates[rng.gen_range(0..candidates.len())].clone());
    }
    reassignments
}
