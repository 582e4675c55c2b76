//! The extraction boundary.
//!
//! RULE: OCR and free-text parsing live behind this trait, outside the
//! engine. An extractor either returns a fully-typed DocumentRecord
//! (unknown fields as `None`) or an ExtractionError. The engine never
//! sees raw text.

use crate::document::DocumentRecord;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Source '{source_ref}' unreadable: {reason}")]
    Unreadable { source_ref: String, reason: String },

    #[error("Source '{source_ref}' is not a supported document")]
    Unsupported { source_ref: String },

    #[error("Malformed extraction output: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The contract every extraction collaborator must fulfill.
pub trait DocumentExtractor: Send + Sync {
    /// Unique stable name, recorded alongside decisions.
    fn name(&self) -> &'static str;

    /// Turn one source reference (path, object key, ...) into a record.
    fn extract(&self, source_ref: &str) -> Result<DocumentRecord, ExtractionError>;
}
