//! Risk scoring: document indicators + amount deviation → RiskScore.
//!
//! RULE: score() is a pure function of (record, history, config).
//! No clock, no RNG, no shared state. Scoring the same inputs twice
//! must produce an identical RiskScore.
//!
//! Composition:
//!   - each distinct indicator kind adds its weight from the model
//!   - amount z-score vs vendor history adds 0..=max points between
//!     the floor and cap sigmas, linearly
//!   - total clamped to [0, 100], band from the model breakpoints

use crate::{
    config::EngineConfig,
    document::DocumentRecord,
    error::EngineWarning,
    history::VendorHistory,
    indicator::{IndicatorKind, Severity},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MAX_SCORE: u32 = 100;

// ── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "kind", rename_all = "snake_case")]
pub enum ContributionSource {
    Indicator(IndicatorKind),
    AmountDeviation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub source: ContributionSource,
    pub points: u32,
    /// Indicator magnitude or the observed z-score.
    pub magnitude: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreConfidence {
    Full,
    Reduced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub value: u32,
    pub band: Severity,
    pub breakdown: Vec<Contribution>,
    pub confidence: ScoreConfidence,
    /// Why confidence is reduced. Empty when confidence is full.
    pub notes: Vec<EngineWarning>,
}

impl RiskScore {
    /// Raw sum of contributions before clamping.
    pub fn contribution_total(&self) -> u32 {
        self.breakdown.iter().map(|c| c.points).sum()
    }
}

// ── Scoring ─────────────────────────────────────────────────────────────────

pub fn score(record: &DocumentRecord, history: &VendorHistory, config: &EngineConfig) -> RiskScore {
    let model = &config.indicators;
    let mut breakdown = Vec::new();
    let mut notes = Vec::new();

    // Repeated flags of one kind count once; keep the largest magnitude.
    let mut kinds: BTreeMap<IndicatorKind, Option<f64>> = BTreeMap::new();
    for indicator in &record.indicators {
        let slot = kinds.entry(indicator.kind).or_insert(None);
        *slot = match (*slot, indicator.magnitude) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
    for (kind, magnitude) in kinds {
        breakdown.push(Contribution {
            source: ContributionSource::Indicator(kind),
            points: model.weight(kind),
            magnitude,
        });
    }

    match amount_deviation(record, history, config, &mut notes) {
        Some((points, z)) if points > 0 => breakdown.push(Contribution {
            source: ContributionSource::AmountDeviation,
            points,
            magnitude: Some(z),
        }),
        _ => {}
    }

    // Stable: equal points keep canonical indicator order, deviation last.
    breakdown.sort_by(|a, b| b.points.cmp(&a.points));

    let value = breakdown.iter().map(|c| c.points).sum::<u32>().min(MAX_SCORE);
    let confidence = if notes.is_empty() {
        ScoreConfidence::Full
    } else {
        ScoreConfidence::Reduced
    };

    RiskScore {
        value,
        band: model.band_for_score(value),
        breakdown,
        confidence,
        notes,
    }
}

/// Returns (points, z) when the signal can be computed, recording a note
/// explaining why otherwise.
fn amount_deviation(
    record: &DocumentRecord,
    history: &VendorHistory,
    config: &EngineConfig,
    notes: &mut Vec<EngineWarning>,
) -> Option<(u32, f64)> {
    let cfg = &config.scoring;

    let Some(amount) = record.known_total() else {
        notes.push(EngineWarning::MissingAmount {
            document_id: record.id.clone(),
        });
        return None;
    };

    let std_dev = history.std_dev();
    // A category-specific history only applies to records in that category.
    let same_bucket = history.vendor_id == record.vendor_id
        && history
            .category
            .as_deref()
            .map_or(true, |c| record.category.as_deref() == Some(c));
    let usable = same_bucket && history.sample_count >= cfg.min_history_samples && std_dev > 0.0;
    if !usable {
        notes.push(EngineWarning::InsufficientHistory {
            vendor_id: record.vendor_id.clone(),
            sample_count: if same_bucket { history.sample_count } else { 0 },
            required: cfg.min_history_samples,
        });
        return None;
    }

    let z = ((amount as f64) - history.mean).abs() / std_dev;
    Some((deviation_points(z, config), z))
}

pub(crate) fn deviation_points(z: f64, config: &EngineConfig) -> u32 {
    let cfg = &config.scoring;
    if !z.is_finite() || z <= cfg.deviation_floor_sigma {
        return 0;
    }
    if z >= cfg.deviation_cap_sigma {
        return cfg.deviation_max_points;
    }
    let fraction =
        (z - cfg.deviation_floor_sigma) / (cfg.deviation_cap_sigma - cfg.deviation_floor_sigma);
    (fraction * cfg.deviation_max_points as f64).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deviation_interpolates_between_two_and_four_sigma() {
        let cfg = EngineConfig::default();
        assert_eq!(deviation_points(1.5, &cfg), 0);
        assert_eq!(deviation_points(2.0, &cfg), 0);
        assert_eq!(deviation_points(3.0, &cfg), 10);
        assert_eq!(deviation_points(3.5, &cfg), 15);
        assert_eq!(deviation_points(4.0, &cfg), 20);
        assert_eq!(deviation_points(12.0, &cfg), 20);
        assert_eq!(deviation_points(f64::NAN, &cfg), 0);
    }
}
