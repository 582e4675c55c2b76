//! Indicator model: the static policy every other component reads.
//!
//! Holds the weight table for discrete fraud indicators and every
//! severity breakpoint the engine uses. Nothing here has behaviour
//! beyond lookups; values are auditor-tunable through EngineConfig.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ── Indicators ───────────────────────────────────────────────────────────────

/// Discrete fraud-risk signal kinds raised by the extraction collaborator.
/// Declaration order is the canonical breakdown order for equal contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    DuplicateRisk,
    PriceAnomaly,
    VendorRisk,
    MissingFields,
    TimingAnomaly,
    RoundNumberBias,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 6] = [
        Self::DuplicateRisk,
        Self::PriceAnomaly,
        Self::VendorRisk,
        Self::MissingFields,
        Self::TimingAnomaly,
        Self::RoundNumberBias,
    ];

    pub fn default_weight(&self) -> u32 {
        match self {
            Self::DuplicateRisk => 25,
            Self::PriceAnomaly => 25,
            Self::VendorRisk => 25,
            Self::MissingFields => 25,
            Self::TimingAnomaly => 15,
            Self::RoundNumberBias => 10,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DuplicateRisk => "duplicate_risk",
            Self::PriceAnomaly => "price_anomaly",
            Self::VendorRisk => "vendor_risk",
            Self::MissingFields => "missing_fields",
            Self::TimingAnomaly => "timing_anomaly",
            Self::RoundNumberBias => "round_number_bias",
        }
    }
}

/// A raw indicator flag. `magnitude` is informational (e.g. percentage
/// deviation reported by extraction) and never changes the weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudIndicator {
    pub kind: IndicatorKind,
    #[serde(default)]
    pub magnitude: Option<f64>,
}

impl FraudIndicator {
    pub fn new(kind: IndicatorKind) -> Self {
        Self { kind, magnitude: None }
    }

    pub fn with_magnitude(kind: IndicatorKind, magnitude: f64) -> Self {
        Self { kind, magnitude: Some(magnitude) }
    }
}

// ── Severity ─────────────────────────────────────────────────────────────────

/// Shared four-tier scale: risk bands, discrepancy and case severity.
/// Ordering is meaningful (Low < Medium < High < Critical).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Lower bounds of each risk band. A value equal to a bound belongs to
/// the higher band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreBands {
    pub medium: u32,
    pub high: u32,
    pub critical: u32,
}

impl Default for ScoreBands {
    fn default() -> Self {
        Self { medium: 25, high: 50, critical: 75 }
    }
}

/// Lower bounds of |financial impact| / contract value per severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactBands {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for ImpactBands {
    fn default() -> Self {
        Self { medium: 0.02, high: 0.10, critical: 0.25 }
    }
}

/// Points deducted from the compliance score per discrepancy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
    pub critical: u32,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self { low: 5, medium: 15, high: 30, critical: 50 }
    }
}

/// Confidence floors mapping a duplicate match onto the severity scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateSeverity {
    pub medium: u8,
    pub high: u8,
}

impl Default for DuplicateSeverity {
    fn default() -> Self {
        Self { medium: 70, high: 90 }
    }
}

// ── Model ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorModel {
    /// Kinds missing from the table fall back to `default_weight()`.
    pub weights: BTreeMap<IndicatorKind, u32>,
    pub score_bands: ScoreBands,
    pub impact_bands: ImpactBands,
    pub severity_weights: SeverityWeights,
    pub duplicate_severity: DuplicateSeverity,
}

impl Default for IndicatorModel {
    fn default() -> Self {
        Self {
            weights: IndicatorKind::ALL
                .iter()
                .map(|k| (*k, k.default_weight()))
                .collect(),
            score_bands: ScoreBands::default(),
            impact_bands: ImpactBands::default(),
            severity_weights: SeverityWeights::default(),
            duplicate_severity: DuplicateSeverity::default(),
        }
    }
}

impl IndicatorModel {
    pub fn weight(&self, kind: IndicatorKind) -> u32 {
        self.weights
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_weight())
    }

    pub fn band_for_score(&self, value: u32) -> Severity {
        let b = &self.score_bands;
        if value >= b.critical {
            Severity::Critical
        } else if value >= b.high {
            Severity::High
        } else if value >= b.medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn severity_for_ratio(&self, ratio: f64) -> Severity {
        let b = &self.impact_bands;
        if ratio >= b.critical {
            Severity::Critical
        } else if ratio >= b.high {
            Severity::High
        } else if ratio >= b.medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn severity_weight(&self, severity: Severity) -> u32 {
        let w = &self.severity_weights;
        match severity {
            Severity::Low => w.low,
            Severity::Medium => w.medium,
            Severity::High => w.high,
            Severity::Critical => w.critical,
        }
    }

    pub fn severity_for_confidence(&self, confidence: u8) -> Severity {
        let d = &self.duplicate_severity;
        if confidence >= d.high {
            Severity::High
        } else if confidence >= d.medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_boundaries_belong_to_higher_band() {
        let model = IndicatorModel::default();
        assert_eq!(model.band_for_score(0), Severity::Low);
        assert_eq!(model.band_for_score(24), Severity::Low);
        assert_eq!(model.band_for_score(25), Severity::Medium);
        assert_eq!(model.band_for_score(49), Severity::Medium);
        assert_eq!(model.band_for_score(50), Severity::High);
        assert_eq!(model.band_for_score(74), Severity::High);
        assert_eq!(model.band_for_score(75), Severity::Critical);
        assert_eq!(model.band_for_score(100), Severity::Critical);
    }

    #[test]
    fn impact_ratio_bands() {
        let model = IndicatorModel::default();
        assert_eq!(model.severity_for_ratio(0.019), Severity::Low);
        assert_eq!(model.severity_for_ratio(0.02), Severity::Medium);
        assert_eq!(model.severity_for_ratio(0.10), Severity::High);
        assert_eq!(model.severity_for_ratio(0.25), Severity::Critical);
    }

    #[test]
    fn missing_weight_falls_back_to_default() {
        let mut model = IndicatorModel::default();
        model.weights.remove(&IndicatorKind::TimingAnomaly);
        model.weights.insert(IndicatorKind::VendorRisk, 40);
        assert_eq!(model.weight(IndicatorKind::TimingAnomaly), 15);
        assert_eq!(model.weight(IndicatorKind::VendorRisk), 40);
    }

    #[test]
    fn weight_table_deserializes_from_snake_case_keys() {
        let json = r#"{ "weights": { "vendor_risk": 30 } }"#;
        let model: IndicatorModel = serde_json::from_str(json).unwrap();
        assert_eq!(model.weight(IndicatorKind::VendorRisk), 30);
        assert_eq!(model.weight(IndicatorKind::DuplicateRisk), 25);
        assert_eq!(model.score_bands, ScoreBands::default());
    }
}
