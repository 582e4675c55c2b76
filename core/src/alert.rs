//! Alert dispatch: one alert per (document, rule) per case window.
//!
//! Rules:
//!   high_risk_score          - risk band ≥ configured band (default high)
//!   severe_discrepancy       - discrepancy severity ≥ configured (default high)
//!   high_confidence_duplicate - duplicate confidence ≥ configured (default 90)
//!
//! A repeat trigger for an already-alerted key is suppressed, not an
//! error. The check-and-set on the key happens under one lock so
//! concurrent triggers for the same document yield a single alert.

use crate::{
    config::AlertConfig,
    indicator::{IndicatorModel, Severity},
    signal::{window_start, Signal},
    types::{stable_id, DocumentId, VendorId},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertRule {
    HighRiskScore,
    SevereDiscrepancy,
    HighConfidenceDuplicate,
}

impl AlertRule {
    pub fn id(&self) -> &'static str {
        match self {
            Self::HighRiskScore => "high_risk_score",
            Self::SevereDiscrepancy => "severe_discrepancy",
            Self::HighConfidenceDuplicate => "high_confidence_duplicate",
        }
    }
}

impl fmt::Display for AlertRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Everything the dispatcher needs to decide on one signal.
#[derive(Debug, Clone)]
pub struct AlertTrigger {
    pub vendor_id: VendorId,
    pub case_id: Option<String>,
    pub at: DateTime<Utc>,
    pub signal: Signal,
}

/// Immutable once created. Delivery and acknowledgement are tracked by
/// the caller, never on this value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub rule: AlertRule,
    pub document_id: DocumentId,
    pub vendor_id: VendorId,
    pub case_id: Option<String>,
    pub window_start: NaiveDate,
    pub severity: Severity,
    pub raised_at: DateTime<Utc>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AlertKey {
    document_id: DocumentId,
    rule: AlertRule,
    window_start: NaiveDate,
}

pub struct AlertDispatcher {
    config: AlertConfig,
    model: IndicatorModel,
    window_days: i64,
    issued: Mutex<HashSet<AlertKey>>,
}

impl AlertDispatcher {
    /// `window_days` must match the case aggregator's window.
    pub fn new(config: AlertConfig, model: IndicatorModel, window_days: i64) -> Self {
        Self {
            config,
            model,
            window_days,
            issued: Mutex::new(HashSet::new()),
        }
    }

    /// Which rule (if any) the signal crosses.
    pub fn rule_for(&self, signal: &Signal) -> Option<AlertRule> {
        match signal {
            Signal::RiskScore { score, .. } if score.band >= self.config.min_risk_band => {
                Some(AlertRule::HighRiskScore)
            }
            Signal::Discrepancy { discrepancy, .. }
                if discrepancy.severity >= self.config.min_discrepancy_severity =>
            {
                Some(AlertRule::SevereDiscrepancy)
            }
            Signal::Duplicate { duplicate }
                if duplicate.confidence >= self.config.min_duplicate_confidence =>
            {
                Some(AlertRule::HighConfidenceDuplicate)
            }
            _ => None,
        }
    }

    pub fn maybe_alert(&self, trigger: AlertTrigger) -> Option<Alert> {
        let rule = self.rule_for(&trigger.signal)?;
        let document_id = trigger.signal.subject().to_string();
        let window = window_start(trigger.at, self.window_days);
        let key = AlertKey {
            document_id: document_id.clone(),
            rule,
            window_start: window,
        };

        let fresh = self
            .issued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key);
        if !fresh {
            log::debug!("alert {rule} for {document_id} suppressed (already raised this window)");
            return None;
        }

        let window_str = window.to_string();
        let alert = Alert {
            alert_id: stable_id(&["alert", &document_id, rule.id(), &window_str]),
            rule,
            document_id,
            vendor_id: trigger.vendor_id,
            case_id: trigger.case_id,
            window_start: window,
            severity: trigger.signal.severity(&self.model),
            raised_at: trigger.at,
            summary: summarize(&trigger.signal),
        };
        log::info!(
            "alert {} rule={} document={} severity={}",
            alert.alert_id,
            alert.rule,
            alert.document_id,
            alert.severity
        );
        Some(alert)
    }

    /// Mark keys as already alerted, e.g. from persisted alerts on restart.
    pub fn restore<'a, I>(&self, alerts: I)
    where
        I: IntoIterator<Item = &'a Alert>,
    {
        let mut issued = self.issued.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for alert in alerts {
            issued.insert(AlertKey {
                document_id: alert.document_id.clone(),
                rule: alert.rule,
                window_start: alert.window_start,
            });
        }
    }

    /// Forget alert keys for windows that start before `cutoff`.
    pub fn prune_before(&self, cutoff: NaiveDate) -> usize {
        let mut issued = self.issued.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = issued.len();
        issued.retain(|key| key.window_start >= cutoff);
        before - issued.len()
    }
}

fn summarize(signal: &Signal) -> String {
    match signal {
        Signal::RiskScore { score, .. } => format!("risk score {} ({})", score.value, score.band),
        Signal::Discrepancy { contract_id, discrepancy } => format!(
            "{:?} on contract {contract_id}: impact {}",
            discrepancy.kind, discrepancy.financial_impact
        ),
        Signal::Duplicate { duplicate } => format!(
            "{:?} duplicate of {} at confidence {}",
            duplicate.match_kind, duplicate.candidate_id, duplicate.confidence
        ),
    }
}
