//! Case aggregation: groups signals per (vendor, window) into FraudCases.
//!
//! RULES:
//!   - One active case per dedup key (vendor_id, window_start).
//!   - While a case is Open or Investigating, new signals only append
//!     evidence and raise severity / max risk score. Never lower them.
//!   - The engine never moves a case to Resolved or Escalated. Those
//!     are investigator actions applied through `apply_action`.
//!   - A closed case is superseded by a fresh one (generation + 1) on
//!     the next signal for its key.
//!
//! Locking: the outer table lock is held only to find or insert a key's
//! slot. Each slot has its own lock, so updates to one key are
//! serialized while different keys proceed independently.

use crate::{
    config::CaseConfig,
    error::{EngineError, EngineResult},
    indicator::{IndicatorModel, Severity},
    signal::{window_end, window_start, Signal},
    types::{stable_id, VendorId},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

// ── Case model ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseState {
    Open,
    Investigating,
    Resolved,
    Escalated,
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Investigating => "investigating",
            Self::Resolved => "resolved",
            Self::Escalated => "escalated",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseAction {
    BeginInvestigation,
    Resolve,
    Escalate,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseKey {
    pub vendor_id: VendorId,
    pub window_start: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseEvidence {
    pub severity: Severity,
    pub recorded_at: DateTime<Utc>,
    pub signal: Signal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudCase {
    pub case_id: String,
    pub vendor_id: VendorId,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    /// Bumped each time a closed case for the same key is superseded.
    pub generation: u32,
    pub state: CaseState,
    pub severity: Severity,
    pub max_risk_score: Option<u32>,
    pub evidence: Vec<CaseEvidence>,
    /// 1 on creation, +1 per evidence update or state change.
    pub revision: u32,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FraudCase {
    fn open(key: &CaseKey, generation: u32, at: DateTime<Utc>, window_days: i64) -> Self {
        let window = key.window_start.to_string();
        let generation_str = generation.to_string();
        Self {
            case_id: stable_id(&["case", &key.vendor_id, &window, &generation_str]),
            vendor_id: key.vendor_id.clone(),
            window_start: key.window_start,
            window_end: window_end(key.window_start, window_days),
            generation,
            state: CaseState::Open,
            severity: Severity::Low,
            max_risk_score: None,
            evidence: Vec::new(),
            revision: 0,
            opened_at: at,
            updated_at: at,
        }
    }

    pub fn key(&self) -> CaseKey {
        CaseKey {
            vendor_id: self.vendor_id.clone(),
            window_start: self.window_start,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, CaseState::Open | CaseState::Investigating)
    }

    fn record(&mut self, signal: Signal, severity: Severity, at: DateTime<Utc>) {
        self.severity = self.severity.max(severity);
        if let Some(value) = signal.risk_value() {
            self.max_risk_score = Some(self.max_risk_score.map_or(value, |m| m.max(value)));
        }
        self.evidence.push(CaseEvidence {
            severity,
            recorded_at: at,
            signal,
        });
        self.updated_at = self.updated_at.max(at);
        self.revision += 1;
    }

    /// Open → Investigating → Resolved | Escalated.
    pub fn apply(&mut self, action: CaseAction) -> EngineResult<CaseState> {
        let next = match (self.state, action) {
            (CaseState::Open, CaseAction::BeginInvestigation) => CaseState::Investigating,
            (CaseState::Investigating, CaseAction::Resolve) => CaseState::Resolved,
            (CaseState::Investigating, CaseAction::Escalate) => CaseState::Escalated,
            (from, action) => {
                return Err(EngineError::InvalidTransition {
                    entity: "case",
                    from: from.to_string(),
                    to: format!("{action:?}"),
                })
            }
        };
        self.state = next;
        self.revision += 1;
        Ok(next)
    }
}

// ── Aggregator ──────────────────────────────────────────────────────────────

type Slot = Arc<Mutex<FraudCase>>;

pub struct CaseAggregator {
    config: CaseConfig,
    model: IndicatorModel,
    slots: Mutex<HashMap<CaseKey, Slot>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CaseAggregator {
    pub fn new(config: CaseConfig, model: IndicatorModel) -> Self {
        Self {
            config,
            model,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn key_for(&self, vendor_id: &str, at: DateTime<Utc>) -> CaseKey {
        CaseKey {
            vendor_id: vendor_id.to_string(),
            window_start: window_start(at, self.config.window_days),
        }
    }

    /// Create-or-update the case for (vendor, window of `at`).
    /// Returns the case as it stands after this signal.
    pub fn aggregate(&self, signal: Signal, vendor_id: &str, at: DateTime<Utc>) -> FraudCase {
        let key = self.key_for(vendor_id, at);
        let window_days = self.config.window_days;

        let slot = {
            let mut slots = lock(&self.slots);
            Arc::clone(
                slots
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(FraudCase::open(&key, 0, at, window_days)))),
            )
        };

        let mut case = lock(&slot);
        if !case.is_active() {
            log::info!(
                "case {} for vendor {} is {}; superseding",
                case.case_id,
                case.vendor_id,
                case.state
            );
            let generation = case.generation + 1;
            *case = FraudCase::open(&key, generation, at, window_days);
        }

        let severity = signal.severity(&self.model);
        case.record(signal, severity, at);

        if case.revision == 1 {
            log::info!(
                "opened case {} vendor={} window={}..={} severity={}",
                case.case_id,
                case.vendor_id,
                case.window_start,
                case.window_end,
                case.severity
            );
        } else {
            log::debug!(
                "case {} updated: {} evidence, severity={}",
                case.case_id,
                case.evidence.len(),
                case.severity
            );
        }
        case.clone()
    }

    /// Apply an investigator action. Returns the updated case.
    pub fn apply_action(&self, case_id: &str, action: CaseAction) -> EngineResult<FraudCase> {
        let slot = {
            let slots = lock(&self.slots);
            slots
                .values()
                .find(|slot| {
                    let case = lock(slot);
                    case.case_id == case_id && case.revision > 0
                })
                .map(Arc::clone)
        };
        let slot = slot.ok_or_else(|| EngineError::CaseNotFound {
            case_id: case_id.to_string(),
        })?;

        let mut case = lock(&slot);
        if case.case_id != case_id {
            // superseded between lookup and lock
            return Err(EngineError::CaseNotFound {
                case_id: case_id.to_string(),
            });
        }
        case.apply(action)?;
        log::info!("case {} -> {}", case.case_id, case.state);
        Ok(case.clone())
    }

    /// Hydrate from a persisted snapshot. For a repeated key the highest
    /// generation wins.
    pub fn restore<I>(&self, cases: I)
    where
        I: IntoIterator<Item = FraudCase>,
    {
        let mut slots = lock(&self.slots);
        for case in cases {
            let key = case.key();
            let keep_existing = slots
                .get(&key)
                .map_or(false, |existing| lock(existing).generation >= case.generation);
            if !keep_existing {
                slots.insert(key, Arc::new(Mutex::new(case)));
            }
        }
    }

    /// Drop every key whose window starts before `cutoff`. Returns how many
    /// were removed. Dropped cases are no longer reachable by id, so persist
    /// them first.
    pub fn prune_before(&self, cutoff: NaiveDate) -> usize {
        let mut slots = lock(&self.slots);
        let before = slots.len();
        slots.retain(|key, _| key.window_start >= cutoff);
        before - slots.len()
    }

    pub fn get(&self, case_id: &str) -> Option<FraudCase> {
        let slots = lock(&self.slots);
        slots
            .values()
            .map(|slot| lock(slot))
            .find(|case| case.case_id == case_id && case.revision > 0)
            .map(|case| case.clone())
    }

    /// Current case per key, ordered by vendor then window.
    pub fn cases(&self) -> Vec<FraudCase> {
        let slots = lock(&self.slots);
        let mut cases: Vec<FraudCase> = slots
            .values()
            .map(|slot| lock(slot).clone())
            .filter(|case| case.revision > 0)
            .collect();
        cases.sort_by(|a, b| {
            a.vendor_id
                .cmp(&b.vendor_id)
                .then(a.window_start.cmp(&b.window_start))
        });
        cases
    }
}
