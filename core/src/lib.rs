//! docfraud-core: document fraud decision engine.
//!
//! Scores documents for fraud risk, detects duplicate submissions,
//! reconciles invoices against contracts, and groups the resulting
//! signals into fraud cases and alerts. Pure computation; callers own
//! extraction and persistence.

pub mod alert;
pub mod case;
pub mod config;
pub mod document;
pub mod duplicate;
pub mod engine;
pub mod error;
pub mod extraction;
pub mod history;
pub mod indicator;
pub mod reconciliation;
pub mod scoring;
pub mod signal;
pub mod synth;
pub mod types;
