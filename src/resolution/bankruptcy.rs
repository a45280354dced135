use crate::core::agent::AgentId;
use crate::core::balance::{money_from_f64, Ledger, Money};
use crate::core::instrument::{InstrumentClass, InstrumentId, InstrumentRegistry};
use crate::resolution::liquidation::{liquidate, LiquidationReport};
use chrono::{DateTime, Utc};
use log::{info, warn};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle of a bankruptcy case. Cases are created in `Detected` and
/// end in `Resolved`; the intermediate states record which path ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CaseStatus {
    Detected,
    BailoutAttempted,
    LiquidationAttempted,
    Resolved(ResolutionOutcome),
}

/// Terminal outcome of a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResolutionOutcome {
    /// External capital restored the institution to the target capital
    /// adequacy.
    BailedOut { injected: Money },
    /// The institution was wound down and its creditors paid from the
    /// proceeds.
    Liquidated,
}

/// An open insolvency, created when an institution's equity goes
/// negative after settlement and destroyed once a terminal outcome is
/// recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankruptcyCase {
    pub id: Uuid,
    pub institution: AgentId,
    /// `|equity|` at detection time.
    pub negative_equity: Money,
    /// Recapitalization that a bailout would need; zero until computed.
    pub required_recapitalization: Money,
    pub status: CaseStatus,
    pub opened_at: DateTime<Utc>,
}

impl BankruptcyCase {
    fn open(institution: AgentId, negative_equity: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            institution,
            negative_equity,
            required_recapitalization: Money::ZERO,
            status: CaseStatus::Detected,
            opened_at: Utc::now(),
        }
    }
}

/// Result of resolving one case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub case: BankruptcyCase,
    /// Why the bailout path fell through, when it did.
    pub bailout_refusal: Option<String>,
    /// Present when the case ended in liquidation.
    pub liquidation: Option<LiquidationReport>,
    /// Value of equity holdings written off during resolution.
    pub equity_written_off: Money,
}

/// Resolution failures. These are engine-contract violations, unlike
/// bailout refusal or under-recovery, which are ordinary outcomes.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("resolution role {role} ({agent}) is not a registered agent")]
    UnknownRoleAgent { role: &'static str, agent: AgentId },

    #[error(
        "resolution of {institution} violated conservation: system equity moved by {actual}, \
         accounted write-offs were {expected}"
    )]
    ConservationViolated {
        institution: AgentId,
        expected: Money,
        actual: Money,
    },
}

/// Which resolution paths an engine may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionStrategy {
    /// Try a bailout first; fall through to liquidation when the
    /// capital provider refuses or cannot fund it.
    BailoutThenLiquidate,
    /// Liquidate directly.
    LiquidateOnly,
}

/// Detects insolvent institutions and resolves them through a
/// bailout-or-liquidation decision that preserves system-wide
/// balance-sheet identities.
pub struct ResolutionEngine {
    strategy: ResolutionStrategy,
    /// Agent asked to fund bailouts in exchange for newly issued equity.
    capital_provider: AgentId,
    /// Agent that buys the assets of liquidated institutions.
    asset_absorber: AgentId,
    /// Capital adequacy target restored by a bailout, as a fraction of
    /// post-write-off assets.
    car_target: f64,
    /// Optional ceiling on any single bailout.
    max_support: Option<Money>,
}

impl ResolutionEngine {
    pub fn new(
        strategy: ResolutionStrategy,
        capital_provider: AgentId,
        asset_absorber: AgentId,
        car_target: f64,
    ) -> Self {
        Self {
            strategy,
            capital_provider,
            asset_absorber,
            car_target,
            max_support: None,
        }
    }

    /// Cap any single bailout at the given sum (builder style).
    pub fn with_max_support(mut self, max_support: Money) -> Self {
        self.max_support = Some(max_support);
        self
    }

    /// Scan the ledger for institutions whose equity went negative.
    ///
    /// The scan runs in agent-id order and skips the resolution roles
    /// themselves, so repeated runs over the same ledger produce the
    /// same case list.
    pub fn detect(&self, ledger: &Ledger, registry: &InstrumentRegistry) -> Vec<BankruptcyCase> {
        let mut cases = Vec::new();
        for agent in ledger.agents() {
            if *agent == self.capital_provider || *agent == self.asset_absorber {
                continue;
            }
            let equity = ledger
                .sheet(agent)
                .map(|s| s.equity(registry))
                .unwrap_or(Money::ZERO);
            if equity < Money::ZERO {
                info!("insolvency detected: {} equity {}", agent, equity);
                cases.push(BankruptcyCase::open(agent.clone(), -equity));
            }
        }
        cases
    }

    /// Detect and resolve every insolvency, verifying afterwards that no
    /// resolution step silently created or destroyed value.
    pub fn resolve_all(
        &self,
        ledger: &mut Ledger,
        registry: &InstrumentRegistry,
        rng: &mut StdRng,
    ) -> Result<Vec<ResolutionReport>, ResolutionError> {
        let cases = self.detect(ledger, registry);
        let mut reports = Vec::with_capacity(cases.len());
        for case in cases {
            reports.push(self.resolve(ledger, registry, case, rng)?);
        }
        Ok(reports)
    }

    /// Resolve one case as an atomic balance-sheet transition.
    pub fn resolve(
        &self,
        ledger: &mut Ledger,
        registry: &InstrumentRegistry,
        mut case: BankruptcyCase,
        rng: &mut StdRng,
    ) -> Result<ResolutionReport, ResolutionError> {
        self.check_role(ledger, "capital provider", &self.capital_provider)?;
        self.check_role(ledger, "asset absorber", &self.asset_absorber)?;

        let equity_before = ledger.total_equity(registry);
        let mut written_off = Money::ZERO;
        let mut bailout_refusal = None;
        let mut liquidation = None;

        match self.strategy {
            ResolutionStrategy::BailoutThenLiquidate => {
                case.status = CaseStatus::BailoutAttempted;
                match self.attempt_bailout(ledger, registry, &mut case) {
                    Ok(wiped) => {
                        written_off += wiped;
                        case.status = CaseStatus::Resolved(ResolutionOutcome::BailedOut {
                            injected: case.required_recapitalization,
                        });
                    }
                    Err((wiped, reason)) => {
                        // The failed bailout's equity write-off stands;
                        // the institution falls through to liquidation
                        // rather than lingering in an inconsistent state.
                        written_off += wiped;
                        warn!(
                            "bailout of {} refused ({}); falling through to liquidation",
                            case.institution, reason
                        );
                        bailout_refusal = Some(reason);
                        case.status = CaseStatus::LiquidationAttempted;
                        let report = liquidate(
                            ledger,
                            registry,
                            &case.institution,
                            &self.asset_absorber,
                            rng,
                        );
                        written_off += report.equity_written_off;
                        liquidation = Some(report);
                        case.status = CaseStatus::Resolved(ResolutionOutcome::Liquidated);
                    }
                }
            }
            ResolutionStrategy::LiquidateOnly => {
                case.status = CaseStatus::LiquidationAttempted;
                let report = liquidate(
                    ledger,
                    registry,
                    &case.institution,
                    &self.asset_absorber,
                    rng,
                );
                written_off += report.equity_written_off;
                liquidation = Some(report);
                case.status = CaseStatus::Resolved(ResolutionOutcome::Liquidated);
            }
        }

        // System equity may change only by what was explicitly written
        // off; anything else is silently created or destroyed value.
        let equity_after = ledger.total_equity(registry);
        let actual = equity_before - equity_after;
        if actual != written_off {
            return Err(ResolutionError::ConservationViolated {
                institution: case.institution.clone(),
                expected: written_off,
                actual,
            });
        }

        Ok(ResolutionReport {
            case,
            bailout_refusal,
            liquidation,
            equity_written_off: written_off,
        })
    }

    /// The bailout path.
    ///
    /// (a) Close the institution's equity-class holdings (in itself or
    /// others); (b) compute the recapitalization that restores the CAR
    /// target on top of the equity deficit; (c) request the sum from the
    /// capital provider in exchange for newly issued equity; (d) report
    /// refusal so the caller can fall through to liquidation.
    ///
    /// On refusal, returns the value already written off plus the reason.
    fn attempt_bailout(
        &self,
        ledger: &mut Ledger,
        registry: &InstrumentRegistry,
        case: &mut BankruptcyCase,
    ) -> Result<Money, (Money, String)> {
        let institution = case.institution.clone();

        // (a) Stock accounts this institution holds are terminated
        // without compensation; this can deepen the equity deficit.
        let equity_holdings: Vec<InstrumentId> = ledger
            .sheet(&institution)
            .map(|sheet| {
                sheet
                    .holdings()
                    .keys()
                    .filter(|id| {
                        matches!(
                            registry.get(id).map(|i| i.class()),
                            Some(InstrumentClass::Equity { .. })
                        )
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let mut wiped = Money::ZERO;
        for id in &equity_holdings {
            if let Some(sheet) = ledger.sheet_mut(&institution) {
                let qty = sheet.remove_holding(id);
                let price = registry.reference_price(id).unwrap_or(0.0);
                wiped += money_from_f64(qty * price);
            }
        }

        // (b) Deficit plus the overhead to reach the CAR target.
        let sheet = ledger.sheet(&institution).expect("institution registered");
        let deficit = -sheet.equity(registry);
        let overhead = money_from_f64(self.car_target) * sheet.total_assets(registry);
        let required = deficit + overhead;
        case.required_recapitalization = required;

        // (c) Request the sum from the capital provider.
        if let Some(cap) = self.max_support {
            if required > cap {
                return Err((wiped, format!("required {} exceeds support cap {}", required, cap)));
            }
        }
        let provider_cash = ledger
            .sheet(&self.capital_provider)
            .map(|s| s.cash())
            .unwrap_or(Money::ZERO);
        if provider_cash < required {
            return Err((
                wiped,
                format!(
                    "provider {} holds {} of required {}",
                    self.capital_provider, provider_cash, required
                ),
            ));
        }
        ledger.transfer_cash(&self.capital_provider, &institution, required);
        info!(
            "bailed out {}: injected {} (deficit {}, CAR overhead {})",
            institution, required, deficit, overhead
        );
        Ok(wiped)
    }

    fn check_role(
        &self,
        ledger: &Ledger,
        role: &'static str,
        agent: &AgentId,
    ) -> Result<(), ResolutionError> {
        if ledger.sheet(agent).is_none() {
            return Err(ResolutionError::UnknownRoleAgent {
                role,
                agent: agent.clone(),
            });
        }
        Ok(())
    }
}
