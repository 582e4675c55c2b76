//! File-backed extraction: one JSON document record per file.
//!
//! Stands in for the OCR collaborator. Anything it cannot turn into a
//! fully-typed record is reported, never guessed.

use docfraud_core::{
    document::DocumentRecord,
    extraction::{DocumentExtractor, ExtractionError},
    reconciliation::Contract,
    types::DocumentId,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONTRACTS_FILE: &str = "contracts.json";

pub struct JsonFileExtractor;

impl DocumentExtractor for JsonFileExtractor {
    fn name(&self) -> &'static str {
        "json-file"
    }

    fn extract(&self, source_ref: &str) -> Result<DocumentRecord, ExtractionError> {
        let path = Path::new(source_ref);
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            return Err(ExtractionError::Unsupported {
                source_ref: source_ref.to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| ExtractionError::Unreadable {
            source_ref: source_ref.to_string(),
            reason: e.to_string(),
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// A contract plus the invoices claimed under it, as listed in
/// `contracts.json`.
#[derive(Debug, Deserialize)]
pub struct ContractEntry {
    pub contract: Contract,
    pub invoice_ids: Vec<DocumentId>,
}

pub fn load_contracts(dir: &Path) -> anyhow::Result<Vec<ContractEntry>> {
    let path = dir.join(CONTRACTS_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&content)?)
}

/// Document sources in `dir`, sorted by file name.
pub fn document_sources(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut sources: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| p.file_name().and_then(|n| n.to_str()) != Some(CONTRACTS_FILE))
        .collect();
    sources.sort();
    Ok(sources)
}
