//! Risk-bearing signals and rolling-window bucketing.
//!
//! A Signal is the unit both the case aggregator and the alert
//! dispatcher consume. Windows are fixed-size day buckets counted from
//! the Unix epoch, so every caller computes the same window start for
//! the same timestamp.

use crate::{
    duplicate::DuplicateMatch,
    indicator::{IndicatorModel, Severity},
    reconciliation::Discrepancy,
    scoring::RiskScore,
    types::{ContractId, DocumentId},
};
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    RiskScore {
        document_id: DocumentId,
        score: RiskScore,
    },
    Discrepancy {
        contract_id: ContractId,
        discrepancy: Discrepancy,
    },
    Duplicate {
        duplicate: DuplicateMatch,
    },
}

impl Signal {
    pub fn severity(&self, model: &IndicatorModel) -> Severity {
        match self {
            Self::RiskScore { score, .. } => score.band,
            Self::Discrepancy { discrepancy, .. } => discrepancy.severity,
            Self::Duplicate { duplicate } => model.severity_for_confidence(duplicate.confidence),
        }
    }

    /// Document the signal is about. Discrepancies not attributable to a
    /// single invoice fall back to the contract id.
    pub fn subject(&self) -> &str {
        match self {
            Self::RiskScore { document_id, .. } => document_id,
            Self::Discrepancy { contract_id, discrepancy } => {
                discrepancy.document_id.as_deref().unwrap_or(contract_id)
            }
            Self::Duplicate { duplicate } => &duplicate.document_id,
        }
    }

    pub fn risk_value(&self) -> Option<u32> {
        match self {
            Self::RiskScore { score, .. } => Some(score.value),
            _ => None,
        }
    }
}

/// Start of the `window_days` bucket containing `at`.
pub fn window_start(at: DateTime<Utc>, window_days: i64) -> NaiveDate {
    let days = at.timestamp().div_euclid(86_400);
    let bucket = days - days.rem_euclid(window_days.max(1));
    DateTime::from_timestamp(bucket * 86_400, 0)
        .map(|dt| dt.date_naive())
        .unwrap_or_else(|| at.date_naive())
}

/// Last day (inclusive) of the window starting at `start`.
pub fn window_end(start: NaiveDate, window_days: i64) -> NaiveDate {
    let span = u64::try_from(window_days.max(1) - 1).unwrap_or(0);
    start.checked_add_days(Days::new(span)).unwrap_or(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_in_one_bucket_share_a_window() {
        // 1970-01-01 + 19_710 days = 2023-12-19, a 30-day boundary.
        let a = Utc.with_ymd_and_hms(2023, 12, 19, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 1, 17, 23, 59, 59).unwrap();
        let c = Utc.with_ymd_and_hms(2024, 1, 18, 0, 0, 0).unwrap();
        assert_eq!(window_start(a, 30), window_start(b, 30));
        assert_ne!(window_start(b, 30), window_start(c, 30));
        assert_eq!(window_start(a, 30), NaiveDate::from_ymd_opt(2023, 12, 19).unwrap());
        assert_eq!(
            window_end(window_start(a, 30), 30),
            NaiveDate::from_ymd_opt(2024, 1, 17).unwrap()
        );
    }

    #[test]
    fn pre_epoch_timestamps_round_down() {
        let t = Utc.with_ymd_and_hms(1969, 12, 31, 12, 0, 0).unwrap();
        assert_eq!(window_start(t, 1), NaiveDate::from_ymd_opt(1969, 12, 31).unwrap());
    }
}
