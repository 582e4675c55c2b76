//! Reconciliation: compares a contract's authorized terms against the
//! invoices claimed under it.
//!
//! Design:
//!   - Each invoice line is matched to a contract line by normalized
//!     description (exact first, then best token overlap ≥ floor)
//!   - Unmatched invoice line        → UnauthorizedCharge
//!   - Σ matched qty ≠ contract qty  → QuantityMismatch
//!   - Unit price outside tolerance  → PriceVariance
//!   - Σ invoiced > contract ceiling → Overbilling
//!   - Wrong vendor / outside term   → TermsViolation
//!   - Severity from |impact| / contract value via the indicator model;
//!     UnauthorizedCharge and TermsViolation are floored at High
//!
//! Pair lifecycle: Pending → {Compliant, Discrepant};
//! Discrepant → {UnderReview, Resolved, Escalated}; UnderReview → {Resolved, Escalated}.

use crate::{
    config::EngineConfig,
    document::DocumentRecord,
    error::{EngineError, EngineResult, EngineWarning},
    indicator::{IndicatorModel, Severity},
    types::{ContractId, DocumentId, MinorUnits, VendorId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ── Contract ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractLineItem {
    pub description: String,
    pub quantity: i64,
    pub unit_price: MinorUnits,
}

impl ContractLineItem {
    pub fn new(description: impl Into<String>, quantity: i64, unit_price: MinorUnits) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub contract_id: ContractId,
    pub vendor_id: VendorId,
    /// Authorized ceiling. Zero means "Σ line values".
    #[serde(default)]
    pub ceiling: MinorUnits,
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
    pub line_items: Vec<ContractLineItem>,
}

impl Contract {
    pub fn lines_value(&self) -> MinorUnits {
        self.line_items
            .iter()
            .map(|l| l.quantity.saturating_mul(l.unit_price))
            .fold(0, MinorUnits::saturating_add)
    }

    /// Contract value used for the ceiling and severity ratios.
    pub fn value(&self) -> MinorUnits {
        if self.ceiling > 0 {
            self.ceiling
        } else {
            self.lines_value()
        }
    }

    fn covers(&self, date: NaiveDate) -> bool {
        self.valid_from.map_or(true, |from| date >= from)
            && self.valid_until.map_or(true, |until| date <= until)
    }
}

// ── Discrepancies ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    Overbilling,
    UnauthorizedCharge,
    QuantityMismatch,
    PriceVariance,
    TermsViolation,
}

impl DiscrepancyKind {
    /// Kinds that are never below High regardless of amount.
    fn severity_floor(&self) -> Severity {
        match self {
            Self::UnauthorizedCharge | Self::TermsViolation => Severity::High,
            _ => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    pub severity: Severity,
    pub contract_value: MinorUnits,
    pub observed_value: MinorUnits,
    /// Signed: negative means under-billing relative to the contract.
    pub financial_impact: MinorUnits,
    /// Offending invoice when attributable to exactly one.
    pub document_id: Option<DocumentId>,
    pub detail: String,
}

// ── Pair state machine ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationState {
    Pending,
    Compliant,
    Discrepant,
    UnderReview,
    Resolved,
    Escalated,
}

impl fmt::Display for ReconciliationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Compliant => "compliant",
            Self::Discrepant => "discrepant",
            Self::UnderReview => "under_review",
            Self::Resolved => "resolved",
            Self::Escalated => "escalated",
        };
        f.write_str(s)
    }
}

/// Investigator actions on a discrepant pair. Applied by callers only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    BeginReview,
    Resolve,
    Escalate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub contract_id: ContractId,
    pub vendor_id: VendorId,
    pub state: ReconciliationState,
    pub discrepancies: Vec<Discrepancy>,
    pub compliance_score: u32,
    pub is_compliant: bool,
    pub warnings: Vec<EngineWarning>,
}

impl ReconciliationReport {
    /// Most severe discrepancy; the first one wins ties.
    pub fn headline(&self) -> Option<&Discrepancy> {
        self.discrepancies
            .iter()
            .fold(None, |best: Option<&Discrepancy>, d| match best {
                Some(b) if b.severity >= d.severity => Some(b),
                _ => Some(d),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractInvoicePair {
    pub contract: Contract,
    pub invoices: Vec<DocumentRecord>,
    pub state: ReconciliationState,
}

impl ContractInvoicePair {
    pub fn new(contract: Contract, invoices: Vec<DocumentRecord>) -> Self {
        Self {
            contract,
            invoices,
            state: ReconciliationState::Pending,
        }
    }

    /// Decide Compliant or Discrepant. Only legal from Pending.
    pub fn reconcile(&mut self, config: &EngineConfig) -> EngineResult<ReconciliationReport> {
        if self.state != ReconciliationState::Pending {
            return Err(EngineError::InvalidTransition {
                entity: "reconciliation",
                from: self.state.to_string(),
                to: "compliant|discrepant".into(),
            });
        }
        let report = reconcile(&self.contract, &self.invoices, config);
        self.state = report.state;
        Ok(report)
    }

    pub fn apply(&mut self, action: ReviewAction) -> EngineResult<ReconciliationState> {
        use ReconciliationState::*;
        let next = match (self.state, action) {
            (Discrepant, ReviewAction::BeginReview) => UnderReview,
            (Discrepant | UnderReview, ReviewAction::Resolve) => Resolved,
            (Discrepant | UnderReview, ReviewAction::Escalate) => Escalated,
            (from, action) => {
                return Err(EngineError::InvalidTransition {
                    entity: "reconciliation",
                    from: from.to_string(),
                    to: format!("{action:?}"),
                })
            }
        };
        self.state = next;
        Ok(next)
    }
}

// ── Comparison ──────────────────────────────────────────────────────────────

/// Pure comparison. State in the report is Compliant or Discrepant.
pub fn reconcile(
    contract: &Contract,
    invoices: &[DocumentRecord],
    config: &EngineConfig,
) -> ReconciliationReport {
    let model = &config.indicators;
    let cfg = &config.reconciliation;
    let contract_value = contract.value();

    let mut discrepancies = Vec::new();
    let mut warnings = Vec::new();

    // Per contract line: (Σ matched qty, invoices contributing).
    let mut billed_qty: Vec<(i64, BTreeSet<&str>)> =
        vec![(0, BTreeSet::new()); contract.line_items.len()];

    for invoice in invoices {
        if invoice.vendor_id != contract.vendor_id {
            let observed = invoice.billed_total();
            discrepancies.push(discrepancy(
                model,
                DiscrepancyKind::TermsViolation,
                contract_value,
                0,
                observed,
                observed,
                Some(invoice.id.as_str()),
                format!("invoice vendor {} is not party to the contract", invoice.vendor_id),
            ));
        }
        if let Some(date) = invoice.issue_date.filter(|d| !contract.covers(*d)) {
            let observed = invoice.billed_total();
            discrepancies.push(discrepancy(
                model,
                DiscrepancyKind::TermsViolation,
                contract_value,
                0,
                observed,
                observed,
                Some(invoice.id.as_str()),
                format!("issued {date} outside the contract period"),
            ));
        }

        for item in &invoice.line_items {
            let (matched, best_similarity) =
                match_contract_line(&item.description, contract, cfg.similarity_floor);

            let Some(index) = matched else {
                if best_similarity > 0.0 {
                    warnings.push(EngineWarning::AmbiguousMatch {
                        document_id: invoice.id.clone(),
                        description: item.description.clone(),
                        best_similarity,
                    });
                }
                let observed = item.billed();
                discrepancies.push(discrepancy(
                    model,
                    DiscrepancyKind::UnauthorizedCharge,
                    contract_value,
                    0,
                    observed,
                    observed,
                    Some(invoice.id.as_str()),
                    format!("'{}' is not on the contract", item.description),
                ));
                continue;
            };

            let line = &contract.line_items[index];
            let slot = &mut billed_qty[index];
            slot.0 = slot.0.saturating_add(item.quantity);
            slot.1.insert(invoice.id.as_str());

            if price_out_of_tolerance(item.unit_price, line.unit_price, cfg.price_tolerance) {
                let authorized = line.unit_price.saturating_mul(item.quantity);
                let observed = item.unit_price.saturating_mul(item.quantity);
                discrepancies.push(discrepancy(
                    model,
                    DiscrepancyKind::PriceVariance,
                    contract_value,
                    authorized,
                    observed,
                    observed.saturating_sub(authorized),
                    Some(invoice.id.as_str()),
                    format!(
                        "'{}' unit price {} vs contracted {}",
                        item.description, item.unit_price, line.unit_price
                    ),
                ));
            }
        }
    }

    for (line, (qty, contributors)) in contract.line_items.iter().zip(&billed_qty) {
        if contributors.is_empty() || *qty == line.quantity {
            continue;
        }
        let authorized = line.quantity.saturating_mul(line.unit_price);
        let observed = qty.saturating_mul(line.unit_price);
        discrepancies.push(discrepancy(
            model,
            DiscrepancyKind::QuantityMismatch,
            contract_value,
            authorized,
            observed,
            qty.saturating_sub(line.quantity).saturating_mul(line.unit_price),
            single(contributors),
            format!("'{}' billed qty {} vs contracted {}", line.description, qty, line.quantity),
        ));
    }

    let total_invoiced = invoices
        .iter()
        .map(DocumentRecord::billed_total)
        .fold(0, MinorUnits::saturating_add);
    if total_invoiced > contract_value {
        let ids: BTreeSet<&str> = invoices.iter().map(|i| i.id.as_str()).collect();
        discrepancies.push(discrepancy(
            model,
            DiscrepancyKind::Overbilling,
            contract_value,
            contract_value,
            total_invoiced,
            total_invoiced.saturating_sub(contract_value),
            single(&ids),
            format!("invoiced {total_invoiced} exceeds ceiling {contract_value}"),
        ));
    }

    let compliance_score = compliance_score(&discrepancies, model);
    let is_compliant = discrepancies.is_empty();
    let state = if is_compliant {
        ReconciliationState::Compliant
    } else {
        ReconciliationState::Discrepant
    };

    log::debug!(
        "contract {} reconciled against {} invoice(s): {} discrepancies, score {}",
        contract.contract_id,
        invoices.len(),
        discrepancies.len(),
        compliance_score
    );

    ReconciliationReport {
        contract_id: contract.contract_id.clone(),
        vendor_id: contract.vendor_id.clone(),
        state,
        discrepancies,
        compliance_score,
        is_compliant,
        warnings,
    }
}

/// 100 − Σ severity weights, clamped to [0, 100].
pub fn compliance_score(discrepancies: &[Discrepancy], model: &IndicatorModel) -> u32 {
    let penalty: u32 = discrepancies
        .iter()
        .map(|d| model.severity_weight(d.severity))
        .fold(0u32, u32::saturating_add);
    100u32.saturating_sub(penalty)
}

pub fn impact_severity(
    model: &IndicatorModel,
    kind: DiscrepancyKind,
    impact: MinorUnits,
    contract_value: MinorUnits,
) -> Severity {
    let by_amount = if contract_value > 0 {
        model.severity_for_ratio(impact.unsigned_abs() as f64 / contract_value as f64)
    } else if impact != 0 {
        Severity::Critical
    } else {
        Severity::Low
    };
    by_amount.max(kind.severity_floor())
}

#[allow(clippy::too_many_arguments)]
fn discrepancy(
    model: &IndicatorModel,
    kind: DiscrepancyKind,
    severity_base: MinorUnits,
    authorized: MinorUnits,
    observed: MinorUnits,
    impact: MinorUnits,
    document_id: Option<&str>,
    detail: String,
) -> Discrepancy {
    Discrepancy {
        kind,
        severity: impact_severity(model, kind, impact, severity_base),
        contract_value: authorized,
        observed_value: observed,
        financial_impact: impact,
        document_id: document_id.map(str::to_string),
        detail,
    }
}

fn single<'a>(ids: &BTreeSet<&'a str>) -> Option<&'a str> {
    match ids.len() {
        1 => ids.iter().next().copied(),
        _ => None,
    }
}

fn price_out_of_tolerance(observed: MinorUnits, contracted: MinorUnits, tolerance: f64) -> bool {
    if contracted == 0 {
        return observed != 0;
    }
    let variance = observed.abs_diff(contracted) as f64 / contracted.unsigned_abs() as f64;
    variance > tolerance
}

// ── Description matching ────────────────────────────────────────────────────

/// Returns (matched contract line index, best similarity seen).
fn match_contract_line(description: &str, contract: &Contract, floor: f64) -> (Option<usize>, f64) {
    let normalized = normalize_description(description);
    if let Some(index) = contract
        .line_items
        .iter()
        .position(|l| normalize_description(&l.description) == normalized)
    {
        return (Some(index), 1.0);
    }

    let mut best: Option<(usize, f64)> = None;
    for (index, line) in contract.line_items.iter().enumerate() {
        let similarity = token_similarity(&normalized, &normalize_description(&line.description));
        if best.map_or(true, |(_, s)| similarity > s) {
            best = Some((index, similarity));
        }
    }
    match best {
        Some((index, similarity)) if similarity >= floor => (Some(index), similarity),
        Some((_, similarity)) => (None, similarity),
        None => (None, 0.0),
    }
}

/// Lowercase, punctuation to spaces, whitespace collapsed.
pub fn normalize_description(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Jaccard overlap of the whitespace tokens of two normalized strings.
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let ta: BTreeSet<&str> = a.split_whitespace().collect();
    let tb: BTreeSet<&str> = b.split_whitespace().collect();
    let union = ta.union(&tb).count();
    if union == 0 {
        return 0.0;
    }
    ta.intersection(&tb).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_ignores_case_and_punctuation() {
        assert_eq!(normalize_description("  A4 Paper, Ream (500)  "), "a4 paper ream 500");
        assert_eq!(
            normalize_description("Consulting-Hours"),
            normalize_description("consulting hours")
        );
        assert_eq!(normalize_description("ÉTUDE, Øl-Lieferung"), "étude øl lieferung");
    }

    #[test]
    fn token_similarity_is_jaccard() {
        assert_eq!(token_similarity("a b c", "a b c"), 1.0);
        assert_eq!(token_similarity("a b", "c d"), 0.0);
        assert!((token_similarity("laptop dell latitude", "dell latitude laptop 14") - 0.75).abs() < 1e-9);
        assert_eq!(token_similarity("", ""), 0.0);
    }

    #[test]
    fn fuzzy_match_respects_floor() {
        let contract = Contract {
            contract_id: "c-1".into(),
            vendor_id: "v-1".into(),
            ceiling: 0,
            valid_from: None,
            valid_until: None,
            line_items: vec![
                ContractLineItem::new("Dell Latitude laptop", 5, 100_000),
                ContractLineItem::new("Docking station", 5, 20_000),
            ],
        };
        assert_eq!(match_contract_line("dell latitude laptop 14", &contract, 0.6).0, Some(0));
        let (matched, best) = match_contract_line("laptop bag", &contract, 0.6);
        assert_eq!(matched, None);
        assert!(best > 0.0 && best < 0.6);
    }
}
