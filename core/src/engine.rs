//! The decision engine: entry points callers use.
//!
//! PIPELINE per document (fixed order):
//!   1. Validate identity fields    (InvalidInput is the only hard error)
//!   2. Score                       (scoring.rs, pure)
//!   3. Duplicate scan              (duplicate.rs, pure)
//!   4. Reconcile, if a contract claim is attached (reconciliation.rs, pure)
//!   5. Qualifying signals → case aggregator (shared state, per-key lock)
//!   6. Every signal → alert dispatcher      (shared state, check-and-set)
//!
//! RULES:
//!   - The engine performs no I/O. History and corpus arrive as snapshots.
//!   - Cases and alerts come back as values; the caller persists them.
//!   - Batches run on a bounded pool; one item's failure never aborts
//!     the others.

use crate::{
    alert::{Alert, AlertDispatcher, AlertTrigger},
    case::{CaseAggregator, FraudCase},
    config::EngineConfig,
    document::DocumentRecord,
    duplicate::{find_duplicates, DuplicateMatch},
    error::{EngineError, EngineResult, EngineWarning},
    history::VendorHistory,
    reconciliation::{
        reconcile, Contract, ContractInvoicePair, Discrepancy, ReconciliationReport,
        ReconciliationState,
    },
    scoring::{score, RiskScore},
    signal::{window_start, Signal},
    types::DocumentId,
};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

// ── Requests and results ────────────────────────────────────────────────────

/// A contract the document is billed against, plus the invoices already
/// claimed under it.
#[derive(Debug, Clone, Copy)]
pub struct ContractClaim<'a> {
    pub contract: &'a Contract,
    pub other_invoices: &'a [DocumentRecord],
}

#[derive(Debug, Clone, Copy)]
pub struct DocumentRequest<'a> {
    pub record: &'a DocumentRecord,
    pub history: &'a VendorHistory,
    pub corpus: &'a [DocumentRecord],
    pub claim: Option<ContractClaim<'a>>,
    /// Decision timestamp; selects the case and alert window.
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub document_id: DocumentId,
    pub risk_score: RiskScore,
    pub duplicate_matches: Vec<DuplicateMatch>,
    pub discrepancies: Option<Vec<Discrepancy>>,
    pub compliance_score: Option<u32>,
    pub reconciliation_state: Option<ReconciliationState>,
    pub case_update: Option<FraudCase>,
    pub alerts: Vec<Alert>,
    pub warnings: Vec<EngineWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub report: ReconciliationReport,
    pub case_update: Option<FraudCase>,
    pub alerts: Vec<Alert>,
}

#[derive(Debug)]
pub struct BatchItem {
    pub document_id: DocumentId,
    pub outcome: EngineResult<DecisionResult>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    /// Same order as the submitted requests.
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.processed - self.failed
    }

    pub fn results(&self) -> impl Iterator<Item = &DecisionResult> {
        self.items.iter().filter_map(|i| i.outcome.as_ref().ok())
    }

    pub fn errors(&self) -> impl Iterator<Item = (&str, &EngineError)> {
        self.items
            .iter()
            .filter_map(|i| i.outcome.as_ref().err().map(|e| (i.document_id.as_str(), e)))
    }
}

// ── Engine ──────────────────────────────────────────────────────────────────

pub struct DecisionEngine {
    config: EngineConfig,
    cases: CaseAggregator,
    alerts: AlertDispatcher,
    pool: rayon::ThreadPool,
}

impl DecisionEngine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.batch.workers)
            .thread_name(|i| format!("decision-worker-{i}"))
            .build()?;
        Ok(Self {
            cases: CaseAggregator::new(config.cases.clone(), config.indicators.clone()),
            alerts: AlertDispatcher::new(
                config.alerts.clone(),
                config.indicators.clone(),
                config.cases.window_days,
            ),
            pool,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cases(&self) -> &CaseAggregator {
        &self.cases
    }

    pub fn alerts(&self) -> &AlertDispatcher {
        &self.alerts
    }

    /// Full decision for one document.
    pub fn analyze(&self, request: &DocumentRequest<'_>) -> EngineResult<DecisionResult> {
        let record = request.record;
        record.validate()?;

        let risk_score = score(record, request.history, &self.config);
        let duplicate_matches = find_duplicates(record, request.corpus, &self.config.duplicates);

        let report = request.claim.map(|claim| {
            let mut invoices = claim.other_invoices.to_vec();
            invoices.retain(|i| i.id != record.id);
            invoices.push(record.clone());
            reconcile(claim.contract, &invoices, &self.config)
        });

        let mut warnings = risk_score.notes.clone();
        if let Some(report) = &report {
            warnings.extend(report.warnings.iter().cloned());
        }

        let mut signals = vec![(
            Signal::RiskScore {
                document_id: record.id.clone(),
                score: risk_score.clone(),
            },
            risk_score.band >= self.config.cases.min_risk_band,
        )];
        for duplicate in &duplicate_matches {
            let aggregate = duplicate.confidence >= self.config.cases.min_duplicate_confidence;
            signals.push((Signal::Duplicate { duplicate: duplicate.clone() }, aggregate));
        }
        if let Some(report) = &report {
            signals.extend(discrepancy_signals(report));
        }

        let (case_update, alerts) = self.dispatch(signals, &record.vendor_id, request.at);

        log::debug!(
            "document {} scored {} ({}), {} duplicate(s), {} alert(s)",
            record.id,
            risk_score.value,
            risk_score.band,
            duplicate_matches.len(),
            alerts.len()
        );

        Ok(DecisionResult {
            document_id: record.id.clone(),
            risk_score,
            duplicate_matches,
            discrepancies: report.as_ref().map(|r| r.discrepancies.clone()),
            compliance_score: report.as_ref().map(|r| r.compliance_score),
            reconciliation_state: report.as_ref().map(|r| r.state),
            case_update,
            alerts,
            warnings,
        })
    }

    /// Reconciliation-only entry point. Moves the pair out of Pending and
    /// feeds the outcome to cases and alerts like `analyze` does.
    pub fn reconcile_pair(
        &self,
        pair: &mut ContractInvoicePair,
        at: DateTime<Utc>,
    ) -> EngineResult<ReconciliationOutcome> {
        for invoice in &pair.invoices {
            invoice.validate()?;
        }
        let report = pair.reconcile(&self.config)?;
        let vendor_id = pair.contract.vendor_id.clone();
        let (case_update, alerts) = self.dispatch(discrepancy_signals(&report), &vendor_id, at);
        Ok(ReconciliationOutcome {
            report,
            case_update,
            alerts,
        })
    }

    /// Release case and alert state for windows that ended before the
    /// window containing `at`. The tables otherwise grow with every window
    /// a long-lived engine sees.
    pub fn prune_before(&self, at: DateTime<Utc>) -> (usize, usize) {
        let cutoff = window_start(at, self.config.cases.window_days);
        let cases = self.cases.prune_before(cutoff);
        let alerts = self.alerts.prune_before(cutoff);
        if cases + alerts > 0 {
            log::info!("pruned {cases} case(s) and {alerts} alert key(s) before {cutoff}");
        }
        (cases, alerts)
    }

    /// Analyze many documents on the bounded worker pool.
    pub fn analyze_batch(&self, requests: &[DocumentRequest<'_>]) -> BatchReport {
        let items: Vec<BatchItem> = self.pool.install(|| {
            requests
                .par_iter()
                .map(|request| BatchItem {
                    document_id: request.record.id.clone(),
                    outcome: self.analyze(request),
                })
                .collect()
        });

        let failed = items.iter().filter(|i| i.outcome.is_err()).count();
        for item in &items {
            if let Err(e) = &item.outcome {
                log::warn!("document {} skipped: {e}", item.document_id);
            }
        }
        log::info!(
            "batch complete: {} processed, {} failed",
            items.len(),
            failed
        );

        BatchReport {
            processed: items.len(),
            failed,
            items,
        }
    }

    /// Aggregate the flagged signals, then offer every signal to the
    /// dispatcher. Returns the last case touched and the alerts raised.
    fn dispatch(
        &self,
        signals: Vec<(Signal, bool)>,
        vendor_id: &str,
        at: DateTime<Utc>,
    ) -> (Option<FraudCase>, Vec<Alert>) {
        let mut case_update: Option<FraudCase> = None;
        let mut alerts = Vec::new();

        for (signal, aggregate) in signals {
            if aggregate {
                case_update = Some(self.cases.aggregate(signal.clone(), vendor_id, at));
            }
            let trigger = AlertTrigger {
                vendor_id: vendor_id.to_string(),
                case_id: case_update.as_ref().map(|c| c.case_id.clone()),
                at,
                signal,
            };
            if let Some(alert) = self.alerts.maybe_alert(trigger) {
                alerts.push(alert);
            }
        }
        (case_update, alerts)
    }
}

/// One aggregated signal per discrepant reconciliation (its headline);
/// every discrepancy is still offered to the alert dispatcher.
fn discrepancy_signals(report: &ReconciliationReport) -> Vec<(Signal, bool)> {
    let headline = report.headline().cloned();
    let mut signals: Vec<(Signal, bool)> = Vec::new();
    if let Some(h) = &headline {
        signals.push((
            Signal::Discrepancy {
                contract_id: report.contract_id.clone(),
                discrepancy: h.clone(),
            },
            true,
        ));
    }
    let mut skipped_headline = false;
    for d in &report.discrepancies {
        if !skipped_headline && Some(d) == headline.as_ref() {
            skipped_headline = true;
            continue;
        }
        signals.push((
            Signal::Discrepancy {
                contract_id: report.contract_id.clone(),
                discrepancy: d.clone(),
            },
            false,
        ));
    }
    signals
}
