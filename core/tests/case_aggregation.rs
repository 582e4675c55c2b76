//! Case aggregation: one active case per (vendor, window), monotonic
//! severity, investigator transitions and supersede-on-close.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use docfraud_core::{
    case::{CaseAction, CaseAggregator, CaseState},
    config::{CaseConfig, EngineConfig},
    document::{DocumentRecord, DocumentType, LineItem},
    duplicate::{DuplicateMatch, MatchKind},
    engine::DecisionEngine,
    error::EngineError,
    history::VendorHistory,
    indicator::{IndicatorKind, IndicatorModel, Severity},
    reconciliation::{Contract, ContractInvoicePair, ContractLineItem, ReconciliationState},
    scoring::score,
    signal::Signal,
};

/// 2023-12-19 starts a 30-day epoch bucket; the window runs to 2024-01-17.
fn at(month: u32, day: u32) -> DateTime<Utc> {
    let year = if month == 12 { 2023 } else { 2024 };
    Utc.with_ymd_and_hms(year, month, day, 9, 30, 0).unwrap()
}

fn aggregator() -> CaseAggregator {
    CaseAggregator::new(CaseConfig::default(), IndicatorModel::default())
}

fn risk_signal(doc_id: &str, kinds: &[IndicatorKind]) -> Signal {
    let mut doc = DocumentRecord::new(doc_id, "N-1", DocumentType::Invoice, "vendor-1");
    for kind in kinds {
        doc = doc.with_indicator(*kind);
    }
    let score = score(&doc, &VendorHistory::empty("vendor-1"), &EngineConfig::default());
    Signal::RiskScore {
        document_id: doc_id.into(),
        score,
    }
}

fn duplicate_signal(doc_id: &str, confidence: u8) -> Signal {
    Signal::Duplicate {
        duplicate: DuplicateMatch {
            document_id: doc_id.into(),
            candidate_id: "d-earlier".into(),
            match_kind: MatchKind::CompositeKey,
            confidence,
            candidate_issue_date: None,
        },
    }
}

fn discrepant_pair(contract_id: &str, invoice_id: &str) -> ContractInvoicePair {
    let contract = Contract {
        contract_id: contract_id.into(),
        vendor_id: "vendor-1".into(),
        ceiling: 0,
        valid_from: None,
        valid_until: None,
        line_items: vec![ContractLineItem::new("Printing services flyers", 10, 3_200)],
    };
    let mut invoice = DocumentRecord::new(invoice_id, invoice_id, DocumentType::Invoice, "vendor-1")
        .with_line_item(LineItem::new("Printing services flyers", 10, 3_200))
        .with_line_item(LineItem::new("Miscellaneous services", 1, 900));
    invoice.total_amount = Some(32_900);
    ContractInvoicePair::new(contract, vec![invoice])
}

// ── Grouping ────────────────────────────────────────────────────────────────

/// Three discrepant reconciliations for one vendor inside one window
/// build a single case with three evidence entries.
#[test]
fn three_discrepant_reconciliations_share_one_case() {
    let engine = DecisionEngine::new(EngineConfig::default()).expect("engine");

    let mut last = None;
    for (i, when) in [at(12, 20), at(12, 28), at(1, 10)].into_iter().enumerate() {
        let mut pair = discrepant_pair(&format!("contract-{i}"), &format!("inv-{i}"));
        let outcome = engine.reconcile_pair(&mut pair, when).expect("reconcile");
        assert_eq!(pair.state, ReconciliationState::Discrepant);
        last = outcome.case_update;
    }

    let cases = engine.cases().cases();
    assert_eq!(cases.len(), 1, "Expected one case, got {}", cases.len());
    let case = &cases[0];
    assert_eq!(case.evidence.len(), 3);
    assert_eq!(case.vendor_id, "vendor-1");
    assert_eq!(case.window_start, NaiveDate::from_ymd_opt(2023, 12, 19).unwrap());
    assert_eq!(case.window_end, NaiveDate::from_ymd_opt(2024, 1, 17).unwrap());
    assert_eq!(case.severity, Severity::High);
    assert_eq!(last.as_ref(), Some(case), "last update is the current case");
}

#[test]
fn vendors_and_windows_are_separate_cases() {
    let agg = aggregator();
    agg.aggregate(risk_signal("d-1", &[IndicatorKind::DuplicateRisk, IndicatorKind::VendorRisk]), "vendor-1", at(12, 20));
    agg.aggregate(risk_signal("d-2", &[IndicatorKind::DuplicateRisk, IndicatorKind::VendorRisk]), "vendor-2", at(12, 20));
    // next bucket starts 2024-01-18
    agg.aggregate(risk_signal("d-3", &[IndicatorKind::DuplicateRisk, IndicatorKind::VendorRisk]), "vendor-1", at(1, 18));

    let cases = agg.cases();
    assert_eq!(cases.len(), 3);
    assert_eq!(cases[0].vendor_id, "vendor-1");
    assert!(cases[0].window_start < cases[1].window_start);
    assert_eq!(cases[2].vendor_id, "vendor-2");
}

#[test]
fn pruning_drops_cases_from_earlier_windows() {
    let agg = aggregator();
    let old = agg.aggregate(duplicate_signal("d-1", 95), "vendor-1", at(12, 20));
    let current = agg.aggregate(duplicate_signal("d-2", 95), "vendor-1", at(1, 20));

    let removed = agg.prune_before(NaiveDate::from_ymd_opt(2024, 1, 18).unwrap());

    assert_eq!(removed, 1);
    assert!(agg.get(&old.case_id).is_none());
    assert_eq!(agg.get(&current.case_id), Some(current));
    assert_eq!(agg.prune_before(NaiveDate::from_ymd_opt(2024, 1, 18).unwrap()), 0);
}

#[test]
fn case_id_is_stable_for_a_key() {
    let a = aggregator();
    let b = aggregator();
    let ca = a.aggregate(duplicate_signal("d-1", 95), "vendor-1", at(12, 20));
    let cb = b.aggregate(duplicate_signal("d-9", 70), "vendor-1", at(1, 2));
    assert_eq!(ca.case_id, cb.case_id);
}

// ── Monotonic severity ──────────────────────────────────────────────────────

#[test]
fn weaker_signals_never_lower_severity_or_risk() {
    let agg = aggregator();
    let first = agg.aggregate(
        risk_signal("d-1", &[IndicatorKind::DuplicateRisk, IndicatorKind::PriceAnomaly, IndicatorKind::VendorRisk]),
        "vendor-1",
        at(12, 20),
    );
    assert_eq!(first.severity, Severity::Critical);
    assert_eq!(first.max_risk_score, Some(75));
    assert_eq!(first.revision, 1);

    let second = agg.aggregate(duplicate_signal("d-2", 55), "vendor-1", at(12, 21));
    let third = agg.aggregate(risk_signal("d-3", &[IndicatorKind::MissingFields]), "vendor-1", at(12, 22));

    assert_eq!(second.severity, Severity::Critical);
    assert_eq!(third.severity, Severity::Critical);
    assert_eq!(third.max_risk_score, Some(75));
    assert_eq!(third.evidence.len(), 3);
    assert_eq!(third.revision, 3);
    assert_eq!(third.evidence[1].severity, Severity::Low, "evidence keeps its own severity");
}

// ── Transitions ─────────────────────────────────────────────────────────────

#[test]
fn investigator_actions_follow_the_lifecycle() {
    let agg = aggregator();
    let case = agg.aggregate(duplicate_signal("d-1", 95), "vendor-1", at(12, 20));

    let premature = agg.apply_action(&case.case_id, CaseAction::Resolve);
    assert!(matches!(premature, Err(EngineError::InvalidTransition { .. })));

    let investigating = agg
        .apply_action(&case.case_id, CaseAction::BeginInvestigation)
        .expect("begin");
    assert_eq!(investigating.state, CaseState::Investigating);
    assert_eq!(investigating.revision, case.revision + 1);

    let escalated = agg.apply_action(&case.case_id, CaseAction::Escalate).expect("escalate");
    assert_eq!(escalated.state, CaseState::Escalated);

    assert!(agg.apply_action(&case.case_id, CaseAction::Resolve).is_err());
}

#[test]
fn unknown_case_is_reported() {
    let agg = aggregator();
    let result = agg.apply_action("no-such-case", CaseAction::BeginInvestigation);
    assert!(matches!(result, Err(EngineError::CaseNotFound { .. })));
}

#[test]
fn signal_after_close_opens_a_new_generation() {
    let agg = aggregator();
    let original = agg.aggregate(duplicate_signal("d-1", 95), "vendor-1", at(12, 20));
    agg.apply_action(&original.case_id, CaseAction::BeginInvestigation).expect("begin");
    agg.apply_action(&original.case_id, CaseAction::Resolve).expect("resolve");

    let fresh = agg.aggregate(duplicate_signal("d-2", 95), "vendor-1", at(12, 22));

    assert_eq!(fresh.generation, 1);
    assert_ne!(fresh.case_id, original.case_id);
    assert_eq!(fresh.state, CaseState::Open);
    assert_eq!(fresh.evidence.len(), 1, "closed evidence is not carried over");
    assert_eq!(fresh.revision, 1);
    assert!(agg.get(&original.case_id).is_none());
    assert_eq!(agg.get(&fresh.case_id).as_ref(), Some(&fresh));
}

// ── Restore and concurrency ─────────────────────────────────────────────────

#[test]
fn restore_keeps_highest_generation() {
    let source = aggregator();
    let gen0 = source.aggregate(duplicate_signal("d-1", 95), "vendor-1", at(12, 20));
    source.apply_action(&gen0.case_id, CaseAction::BeginInvestigation).expect("begin");
    source.apply_action(&gen0.case_id, CaseAction::Escalate).expect("escalate");
    let gen1 = source.aggregate(duplicate_signal("d-2", 95), "vendor-1", at(12, 21));

    let restored = aggregator();
    restored.restore(vec![gen1.clone(), gen0.clone()]);

    let next = restored.aggregate(duplicate_signal("d-3", 95), "vendor-1", at(12, 22));
    assert_eq!(next.case_id, gen1.case_id);
    assert_eq!(next.evidence.len(), 2);
}

#[test]
fn concurrent_signals_for_one_key_land_in_one_case() {
    let agg = aggregator();
    std::thread::scope(|s| {
        for t in 0..8 {
            let agg = &agg;
            s.spawn(move || {
                for i in 0..25 {
                    agg.aggregate(duplicate_signal(&format!("d-{t}-{i}"), 80), "vendor-1", at(12, 20));
                }
            });
        }
    });

    let cases = agg.cases();
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].evidence.len(), 200, "no update may be lost");
    assert_eq!(cases[0].revision, 200);
}
