//! decision-runner: headless batch runner for the document fraud engine.
//!
//! Usage:
//!   decision-runner --seed 12345 --documents 500 --db run.db
//!   decision-runner --input ./inbox --config ./data/engine_config.json --db run.db
//!
//! With `--input`, every file in the directory is handed to the JSON
//! extractor; `contracts.json` (if present) lists contracts and the
//! invoice ids claimed under each. Without it a seeded synthetic corpus
//! is generated.

mod extract;
mod store;

use anyhow::Result;
use chrono::{DateTime, Utc};
use docfraud_core::{
    config::EngineConfig,
    document::DocumentRecord,
    engine::{BatchReport, ContractClaim, DecisionEngine, DocumentRequest},
    extraction::DocumentExtractor,
    history::VendorHistory,
    indicator::Severity,
    reconciliation::{Contract, ReconciliationState},
    synth::{generate, SynthSpec},
    types::DocumentId,
};
use extract::{document_sources, load_contracts, JsonFileExtractor};
use std::collections::HashMap;
use std::env;
use std::path::Path;
use store::DecisionStore;

/// Everything one run decides on.
struct Workload {
    source: String,
    documents: Vec<DocumentRecord>,
    contracts: Vec<(Contract, Vec<DocumentId>)>,
    /// (source ref, reason) for inputs the extractor could not read.
    rejected: Vec<(String, String)>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let documents = parse_arg(&args, "--documents", 500usize);
    let db = str_arg(&args, "--db").unwrap_or(":memory:");
    let config_path = str_arg(&args, "--config").unwrap_or("./data/engine_config.json");
    let input = str_arg(&args, "--input");
    let at: DateTime<Utc> = match str_arg(&args, "--at") {
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map_err(|e| anyhow::anyhow!("Invalid --at '{s}': {e}"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    println!("docfraud: decision-runner");
    println!("  config:    {config_path}");
    match input {
        Some(dir) => println!("  input:     {dir}"),
        None => println!("  synthetic: seed {seed}, {documents} documents"),
    }
    println!("  db:        {db}");
    println!("  at:        {}", at.to_rfc3339());
    println!();

    let config = if Path::new(config_path).exists() {
        EngineConfig::load(config_path)?
    } else {
        log::warn!("{config_path} not found; using reference defaults");
        EngineConfig::default()
    };

    let workload = match input {
        Some(dir) => load_workload(Path::new(dir))?,
        None => synthetic_workload(seed, documents),
    };

    let store = DecisionStore::open(db)?;
    store.migrate()?;
    let run_id = format!("run-{}", at.format("%Y%m%dT%H%M%S%.3f"));
    store.insert_run(
        &run_id,
        input.is_none().then_some(seed),
        env!("CARGO_PKG_VERSION"),
        &workload.source,
        &at.to_rfc3339(),
    )?;

    let engine = DecisionEngine::new(config)?;
    engine.cases().restore(store.load_cases()?);
    engine.alerts().restore(&store.load_alerts()?);
    // Earlier windows are already in the ledger; keep only the one `at` falls in.
    engine.prune_before(at);

    let report = run_batch(&engine, &workload, at);
    let alerts_recorded = persist(&store, &engine, &run_id, &workload, &report)?;
    print_summary(&store, &engine, &run_id, &workload, &report, alerts_recorded)?;

    Ok(())
}

fn load_workload(dir: &Path) -> Result<Workload> {
    let extractor = JsonFileExtractor;
    let mut documents = Vec::new();
    let mut rejected = Vec::new();

    for path in document_sources(dir)? {
        let source_ref = path.display().to_string();
        match extractor.extract(&source_ref) {
            Ok(record) => documents.push(record),
            Err(e) => {
                log::warn!("{} rejected {source_ref}: {e}", extractor.name());
                rejected.push((source_ref, e.to_string()));
            }
        }
    }

    let contracts = load_contracts(dir)?
        .into_iter()
        .map(|entry| (entry.contract, entry.invoice_ids))
        .collect();

    Ok(Workload {
        source: format!("{}:{}", extractor.name(), dir.display()),
        documents,
        contracts,
        rejected,
    })
}

fn synthetic_workload(seed: u64, documents: usize) -> Workload {
    let corpus = generate(&SynthSpec::new(seed, documents));
    Workload {
        source: "synthetic".into(),
        documents: corpus.documents,
        contracts: corpus.contracts,
        rejected: Vec::new(),
    }
}

fn run_batch(engine: &DecisionEngine, workload: &Workload, at: DateTime<Utc>) -> BatchReport {
    let docs = &workload.documents;

    // Each document is scored against its vendor's other documents.
    let histories: Vec<VendorHistory> = docs
        .iter()
        .map(|record| {
            VendorHistory::from_records(
                &record.vendor_id,
                None,
                docs.iter().filter(|d| d.id != record.id),
            )
        })
        .collect();

    let by_id: HashMap<&str, &DocumentRecord> = docs.iter().map(|d| (d.id.as_str(), d)).collect();
    let claimed: Vec<Vec<DocumentRecord>> = workload
        .contracts
        .iter()
        .map(|(_, ids)| {
            ids.iter()
                .filter_map(|id| by_id.get(id.as_str()).map(|d| (*d).clone()))
                .collect()
        })
        .collect();
    let mut claims: HashMap<&str, ContractClaim> = HashMap::new();
    for ((contract, ids), invoices) in workload.contracts.iter().zip(&claimed) {
        for id in ids {
            claims.insert(
                id.as_str(),
                ContractClaim {
                    contract,
                    other_invoices: invoices,
                },
            );
        }
    }

    let requests: Vec<DocumentRequest> = docs
        .iter()
        .zip(&histories)
        .map(|(record, history)| DocumentRequest {
            record,
            history,
            corpus: docs,
            claim: claims.get(record.id.as_str()).copied(),
            at,
        })
        .collect();

    engine.analyze_batch(&requests)
}

/// Write decisions, errors, cases and alerts. Returns how many alerts
/// were new to the ledger.
fn persist(
    store: &DecisionStore,
    engine: &DecisionEngine,
    run_id: &str,
    workload: &Workload,
    report: &BatchReport,
) -> Result<usize> {
    for (source_ref, reason) in &workload.rejected {
        store.insert_error(run_id, source_ref, reason)?;
    }

    let mut alerts_recorded = 0;
    for item in &report.items {
        match &item.outcome {
            Ok(result) => {
                store.insert_decision(run_id, result)?;
                for alert in &result.alerts {
                    if store.insert_alert(run_id, alert)? {
                        alerts_recorded += 1;
                    }
                }
            }
            Err(e) => store.insert_error(run_id, &item.document_id, &e.to_string())?,
        }
    }

    for case in engine.cases().cases() {
        store.upsert_case(&case)?;
    }
    Ok(alerts_recorded)
}

fn print_summary(
    store: &DecisionStore,
    engine: &DecisionEngine,
    run_id: &str,
    workload: &Workload,
    report: &BatchReport,
    alerts_recorded: usize,
) -> Result<()> {
    let decided = store.decision_count(run_id)?;
    let duplicates = report.results().filter(|r| !r.duplicate_matches.is_empty()).count();
    let discrepant = report
        .results()
        .filter(|r| r.reconciliation_state == Some(ReconciliationState::Discrepant))
        .count();
    let reconciled = report.results().filter(|r| r.reconciliation_state.is_some()).count();
    let cases = engine.cases().cases();
    let active = cases.iter().filter(|c| c.is_active()).count();
    let severe = cases.iter().filter(|c| c.severity >= Severity::High).count();

    println!("=== RUN SUMMARY ===");
    println!("  run_id:          {run_id}");
    println!("  source:          {}", workload.source);
    println!("  documents:       {}", workload.documents.len());
    println!("  decided:         {decided}");
    println!("  failed:          {}", report.failed);
    println!("  rejected:        {}", workload.rejected.len());
    println!("  with duplicates: {duplicates}");
    println!("  reconciled:      {reconciled} ({discrepant} discrepant)");
    println!("  active cases:    {active} ({severe} high or above)");
    println!("  new alerts:      {alerts_recorded}");

    println!();
    println!("=== RISK BANDS ===");
    for (band, count) in store.band_counts(run_id)? {
        println!("  {band:<9} {count}");
    }

    println!();
    println!("=== TOP CASES ===");
    let mut ranked: Vec<_> = cases.iter().filter(|c| c.is_active()).collect();
    ranked.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then(b.evidence.len().cmp(&a.evidence.len()))
            .then(a.case_id.cmp(&b.case_id))
    });
    if ranked.is_empty() {
        println!("  (No cases opened)");
    } else {
        for case in ranked.iter().take(5) {
            println!(
                "  {} | {} | {}..={} | {} | {} evidence",
                case.case_id,
                case.vendor_id,
                case.window_start,
                case.window_end,
                case.severity,
                case.evidence.len()
            );
        }
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
