use crate::indicator::{IndicatorModel, Severity};
use serde::{Deserialize, Serialize};

// ── Scoring ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Below this many samples the amount-deviation signal is omitted.
    pub min_history_samples: u32,
    /// z-score at which the deviation bonus starts.
    pub deviation_floor_sigma: f64,
    /// z-score at which the deviation bonus reaches its cap.
    pub deviation_cap_sigma: f64,
    pub deviation_max_points: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_history_samples: 3,
            deviation_floor_sigma: 2.0,
            deviation_cap_sigma: 4.0,
            deviation_max_points: 20,
        }
    }
}

// ── Duplicates ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    pub exact_confidence: u8,
    /// Composite-key confidence at a zero-day date gap.
    pub composite_confidence: u8,
    /// Composite-key confidence at the window edge.
    pub composite_floor_confidence: u8,
    /// Relative amount tolerance, measured against the larger amount.
    pub amount_tolerance: f64,
    pub date_window_days: i64,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            exact_confidence: 95,
            composite_confidence: 70,
            composite_floor_confidence: 50,
            amount_tolerance: 0.01,
            date_window_days: 30,
        }
    }
}

// ── Reconciliation ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Minimum token-overlap similarity for a fuzzy description match.
    pub similarity_floor: f64,
    /// Relative unit-price variance tolerated before flagging.
    pub price_tolerance: f64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            similarity_floor: 0.6,
            price_tolerance: 0.05,
        }
    }
}

// ── Cases and alerts ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseConfig {
    pub window_days: i64,
    /// Risk scores at or above this band open/extend a case.
    pub min_risk_band: Severity,
    /// Duplicate matches at or above this confidence open/extend a case.
    pub min_duplicate_confidence: u8,
}

impl Default for CaseConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            min_risk_band: Severity::High,
            min_duplicate_confidence: 70,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub min_risk_band: Severity,
    pub min_discrepancy_severity: Severity,
    pub min_duplicate_confidence: u8,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            min_risk_band: Severity::High,
            min_discrepancy_severity: Severity::High,
            min_duplicate_confidence: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

// ── Engine config ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub indicators: IndicatorModel,
    pub scoring: ScoringConfig,
    pub duplicates: DuplicateConfig,
    pub reconciliation: ReconciliationConfig,
    pub cases: CaseConfig,
    pub alerts: AlertConfig,
    pub batch: BatchConfig,
}

impl EngineConfig {
    /// Load from a JSON file. Missing sections and fields take the
    /// reference defaults. In tests, use EngineConfig::default().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let config: EngineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cases.window_days <= 0 {
            anyhow::bail!("cases.window_days must be positive");
        }
        if self.duplicates.date_window_days <= 0 {
            anyhow::bail!("duplicates.date_window_days must be positive");
        }
        if self.scoring.deviation_cap_sigma <= self.scoring.deviation_floor_sigma {
            anyhow::bail!("scoring.deviation_cap_sigma must exceed deviation_floor_sigma");
        }
        if self.duplicates.composite_floor_confidence > self.duplicates.composite_confidence {
            anyhow::bail!("duplicates.composite_floor_confidence exceeds composite_confidence");
        }
        if self.duplicates.composite_confidence > self.duplicates.exact_confidence {
            anyhow::bail!("duplicates.composite_confidence exceeds exact_confidence");
        }
        if !(0.0..=1.0).contains(&self.reconciliation.similarity_floor) {
            anyhow::bail!("reconciliation.similarity_floor must be within [0, 1]");
        }
        if self.batch.workers == 0 {
            anyhow::bail!("batch.workers must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = EngineConfig::from_json(r#"{ "cases": { "window_days": 14 } }"#).unwrap();
        assert_eq!(cfg.cases.window_days, 14);
        assert_eq!(cfg.cases.min_risk_band, Severity::High);
        assert_eq!(cfg.duplicates, DuplicateConfig::default());
    }

    #[test]
    fn rejects_inverted_deviation_range() {
        let err = EngineConfig::from_json(
            r#"{ "scoring": { "deviation_floor_sigma": 4.0, "deviation_cap_sigma": 2.0 } }"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../data/engine_config.json");
        let cfg = EngineConfig::load(path).unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn composite_never_outranks_exact() {
        let err = EngineConfig::from_json(
            r#"{ "duplicates": { "exact_confidence": 60, "composite_confidence": 70 } }"#,
        );
        assert!(err.is_err());
    }
}
