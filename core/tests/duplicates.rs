//! Duplicate detection: exact document numbers and the composite key.

use chrono::NaiveDate;
use docfraud_core::{
    config::DuplicateConfig,
    document::{DocumentRecord, DocumentType},
    duplicate::{best_match, find_duplicates, MatchKind},
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn invoice(id: &str, number: &str, vendor: &str, total: i64, issued: NaiveDate) -> DocumentRecord {
    DocumentRecord::new(id, number, DocumentType::Invoice, vendor)
        .with_total(total)
        .with_issue_date(issued)
}

// ── Exact number ────────────────────────────────────────────────────────────

#[test]
fn identical_number_is_an_exact_match() {
    let cfg = DuplicateConfig::default();
    let a = invoice("d-a", "INV-2024-001", "vendor-1", 10_000, day(1));
    let b = invoice("d-b", "INV-2024-001", "vendor-2", 55_000, day(28));

    let matches = find_duplicates(&a, [&b], &cfg);

    assert_eq!(matches.len(), 1, "Expected one match, got {matches:?}");
    assert_eq!(matches[0].match_kind, MatchKind::ExactNumber);
    assert_eq!(matches[0].confidence, 95);
    assert_eq!(matches[0].candidate_id, "d-b");
}

#[test]
fn blank_numbers_never_match_exactly() {
    let cfg = DuplicateConfig::default();
    let a = invoice("d-a", "  ", "vendor-1", 10_000, day(1));
    let b = invoice("d-b", "", "vendor-2", 10_000, day(1));

    assert!(best_match(&a, &b, &cfg).is_none());
}

#[test]
fn record_never_matches_itself() {
    let cfg = DuplicateConfig::default();
    let a = invoice("d-a", "INV-7", "vendor-1", 10_000, day(1));
    let corpus = vec![a.clone()];

    assert!(find_duplicates(&a, &corpus, &cfg).is_empty());
}

/// Re-extraction keeps the number but gets a new id; that is a duplicate.
#[test]
fn exact_rule_outranks_composite_for_the_same_pair() {
    let cfg = DuplicateConfig::default();
    let a = invoice("d-a", "INV-9", "vendor-1", 10_000, day(1));
    let b = invoice("d-b", "INV-9", "vendor-1", 10_000, day(1));

    let m = best_match(&a, &b, &cfg).expect("match");
    assert_eq!(m.match_kind, MatchKind::ExactNumber);
    assert_eq!(m.confidence, 95);
}

// ── Composite key ───────────────────────────────────────────────────────────

#[test]
fn composite_confidence_decays_across_the_window() {
    let cfg = DuplicateConfig::default();
    let a = invoice("d-a", "A-1", "vendor-1", 10_000, day(1));

    let same_day = invoice("d-b", "B-1", "vendor-1", 10_000, day(1));
    let mid = invoice("d-c", "C-1", "vendor-1", 10_000, day(16));
    let edge = invoice("d-d", "D-1", "vendor-1", 10_000, day(31));
    let outside = DocumentRecord::new("d-e", "E-1", DocumentType::Invoice, "vendor-1")
        .with_total(10_000)
        .with_issue_date(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());

    assert_eq!(best_match(&a, &same_day, &cfg).map(|m| m.confidence), Some(70));
    assert_eq!(best_match(&a, &mid, &cfg).map(|m| m.confidence), Some(60));
    assert_eq!(best_match(&a, &edge, &cfg).map(|m| m.confidence), Some(50));
    assert!(best_match(&a, &outside, &cfg).is_none(), "31-day gap is outside the window");
}

#[test]
fn composite_requires_vendor_type_and_amount() {
    let cfg = DuplicateConfig::default();
    let a = invoice("d-a", "A-1", "vendor-1", 10_000, day(1));

    let within_tolerance = invoice("d-b", "B-1", "vendor-1", 10_100, day(2));
    let too_far = invoice("d-c", "C-1", "vendor-1", 10_200, day(2));
    let other_vendor = invoice("d-d", "D-1", "vendor-2", 10_000, day(2));
    let mut receipt = invoice("d-e", "E-1", "vendor-1", 10_000, day(2));
    receipt.document_type = DocumentType::Receipt;
    let mut no_date = invoice("d-f", "F-1", "vendor-1", 10_000, day(2));
    no_date.issue_date = None;

    assert!(best_match(&a, &within_tolerance, &cfg).is_some());
    assert!(best_match(&a, &too_far, &cfg).is_none());
    assert!(best_match(&a, &other_vendor, &cfg).is_none());
    assert!(best_match(&a, &receipt, &cfg).is_none());
    assert!(best_match(&a, &no_date, &cfg).is_none());
}

/// Matching A against B and B against A agrees on kind and confidence.
#[test]
fn matching_is_symmetric() {
    let cfg = DuplicateConfig::default();
    let a = invoice("d-a", "A-1", "vendor-1", 10_000, day(3));
    let b = invoice("d-b", "B-1", "vendor-1", 9_950, day(12));

    let ab = best_match(&a, &b, &cfg).expect("a→b");
    let ba = best_match(&b, &a, &cfg).expect("b→a");

    assert_eq!(ab.match_kind, ba.match_kind);
    assert_eq!(ab.confidence, ba.confidence);
}

// ── Ordering ────────────────────────────────────────────────────────────────

#[test]
fn matches_ordered_by_confidence_then_recency_then_id() {
    let cfg = DuplicateConfig::default();
    let record = invoice("d-0", "INV-1", "vendor-1", 10_000, day(10));
    let corpus = vec![
        invoice("d-early", "X-1", "vendor-1", 10_000, day(5)),
        invoice("d-exact", "INV-1", "vendor-9", 1, day(2)),
        invoice("d-same-b", "X-2", "vendor-1", 10_000, day(10)),
        invoice("d-same-a", "X-3", "vendor-1", 10_000, day(10)),
        invoice("d-far", "X-4", "vendor-1", 10_000, day(25)),
        invoice("d-late", "X-5", "vendor-1", 10_000, day(15)),
    ];

    let ids: Vec<String> = find_duplicates(&record, &corpus, &cfg)
        .into_iter()
        .map(|m| m.candidate_id)
        .collect();

    assert_eq!(
        ids,
        vec!["d-exact", "d-same-a", "d-same-b", "d-late", "d-early", "d-far"],
        "unexpected order"
    );
}

#[test]
fn unrelated_corpus_yields_nothing() {
    let cfg = DuplicateConfig::default();
    let record = invoice("d-0", "INV-1", "vendor-1", 10_000, day(10));
    let corpus = vec![
        invoice("d-1", "INV-2", "vendor-2", 10_000, day(10)),
        invoice("d-2", "INV-3", "vendor-1", 50_000, day(10)),
    ];

    assert!(find_duplicates(&record, &corpus, &cfg).is_empty());
}
