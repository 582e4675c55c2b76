//! Duplicate detection against a caller-supplied corpus snapshot.
//!
//! Two independent rules per candidate, best one kept:
//!   1. ExactNumber   - identical non-empty document number
//!   2. CompositeKey  - same vendor + type, amount within tolerance,
//!                      issue dates within the window
//!
//! Every rule is symmetric in (record, candidate), so matching A against
//! {B} and B against {A} always agrees on kind and confidence.

use crate::{
    config::DuplicateConfig,
    document::DocumentRecord,
    types::DocumentId,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    ExactNumber,
    CompositeKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub document_id: DocumentId,
    pub candidate_id: DocumentId,
    pub match_kind: MatchKind,
    pub confidence: u8,
    /// Candidate issue date, used for ordering.
    pub candidate_issue_date: Option<NaiveDate>,
}

/// Single pass over `corpus`. The record itself (same id) is skipped.
pub fn find_duplicates<'a, I>(
    record: &DocumentRecord,
    corpus: I,
    config: &DuplicateConfig,
) -> Vec<DuplicateMatch>
where
    I: IntoIterator<Item = &'a DocumentRecord>,
{
    let mut matches: Vec<DuplicateMatch> = corpus
        .into_iter()
        .filter(|candidate| candidate.id != record.id)
        .filter_map(|candidate| best_match(record, candidate, config))
        .collect();

    matches.sort_by(|a, b| {
        b.confidence
            .cmp(&a.confidence)
            .then_with(|| newest_first(a.candidate_issue_date, b.candidate_issue_date))
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });

    log::debug!("document {} duplicate candidates: {}", record.id, matches.len());
    matches
}

/// Best rule outcome for one pair, if any rule fires.
pub fn best_match(
    record: &DocumentRecord,
    candidate: &DocumentRecord,
    config: &DuplicateConfig,
) -> Option<DuplicateMatch> {
    let exact = exact_number(record, candidate).then_some((MatchKind::ExactNumber, config.exact_confidence));
    let composite = composite_confidence(record, candidate, config).map(|c| (MatchKind::CompositeKey, c));

    let (match_kind, confidence) = match (exact, composite) {
        (Some(e), Some(c)) => if e.1 >= c.1 { e } else { c },
        (Some(e), None) => e,
        (None, Some(c)) => c,
        (None, None) => return None,
    };

    Some(DuplicateMatch {
        document_id: record.id.clone(),
        candidate_id: candidate.id.clone(),
        match_kind,
        confidence,
        candidate_issue_date: candidate.issue_date,
    })
}

fn exact_number(a: &DocumentRecord, b: &DocumentRecord) -> bool {
    match (a.number_key(), b.number_key()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn composite_confidence(
    a: &DocumentRecord,
    b: &DocumentRecord,
    config: &DuplicateConfig,
) -> Option<u8> {
    if a.vendor_id != b.vendor_id || a.document_type != b.document_type {
        return None;
    }
    let (amount_a, amount_b) = (a.known_total()?, b.known_total()?);
    let larger = amount_a.max(amount_b) as f64;
    let diff = (amount_a - amount_b).abs() as f64;
    if diff > larger * config.amount_tolerance {
        return None;
    }

    let gap = (a.issue_date? - b.issue_date?).num_days().abs();
    if gap > config.date_window_days {
        return None;
    }

    let top = config.composite_confidence as f64;
    let floor = config.composite_floor_confidence as f64;
    let fraction = gap as f64 / config.date_window_days as f64;
    Some((top - (top - floor) * fraction).round() as u8)
}

fn newest_first(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
