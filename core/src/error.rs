use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid input for document '{document_id}': {reason}")]
    InvalidInput { document_id: String, reason: String },

    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Case '{case_id}' not found")]
    CaseNotFound { case_id: String },

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Non-fatal conditions. These never abort a decision; they lower the
/// confidence of the result and travel with it to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineWarning {
    /// Vendor history too thin (or mismatched) for the amount-deviation signal.
    InsufficientHistory {
        vendor_id: String,
        sample_count: u32,
        required: u32,
    },
    /// Total amount absent or invalid; amount-based signals were skipped.
    MissingAmount { document_id: String },
    /// A line item had no match at or above the similarity floor.
    AmbiguousMatch {
        document_id: String,
        description: String,
        best_similarity: f64,
    },
}
