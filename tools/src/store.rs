//! SQLite decision ledger.
//!
//! RULE: Only store.rs talks to the database. The engine returns cases
//! and alerts as values; the runner hands them here.

use anyhow::Result;
use docfraud_core::{alert::Alert, case::FraudCase, engine::DecisionResult};
use rusqlite::{params, Connection};

pub struct DecisionStore {
    conn: Connection,
}

impl DecisionStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only for real files; :memory: ignores it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_decisions.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(
        &self,
        run_id: &str,
        seed: Option<u64>,
        version: &str,
        source: &str,
        started_at: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, seed, version, source, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, seed.map(|s| s as i64), version, source, started_at],
        )?;
        Ok(())
    }

    // ── Decisions ──────────────────────────────────────────────

    pub fn insert_decision(&self, run_id: &str, result: &DecisionResult) -> Result<()> {
        let payload = serde_json::to_string(result)?;
        self.conn.execute(
            "INSERT INTO decision (
                run_id, document_id, risk_value, risk_band, confidence,
                duplicate_count, compliance_score, reconciliation_state, payload
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                run_id,
                &result.document_id,
                result.risk_score.value as i64,
                result.risk_score.band.to_string(),
                format!("{:?}", result.risk_score.confidence).to_lowercase(),
                result.duplicate_matches.len() as i64,
                result.compliance_score.map(|s| s as i64),
                result.reconciliation_state.map(|s| s.to_string()),
                payload,
            ],
        )?;
        Ok(())
    }

    pub fn insert_error(&self, run_id: &str, document_id: &str, message: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO decision_error (run_id, document_id, message) VALUES (?1, ?2, ?3)",
            params![run_id, document_id, message],
        )?;
        Ok(())
    }

    pub fn decision_count(&self, run_id: &str) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM decision WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn band_counts(&self, run_id: &str) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT risk_band, COUNT(*) FROM decision WHERE run_id = ?1
             GROUP BY risk_band ORDER BY risk_band ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Cases ──────────────────────────────────────────────────

    /// Insert or replace by case id. Later revisions overwrite earlier ones.
    pub fn upsert_case(&self, case: &FraudCase) -> Result<()> {
        let payload = serde_json::to_string(case)?;
        self.conn.execute(
            "INSERT INTO fraud_case (
                case_id, vendor_id, window_start, generation, state, severity, revision, payload
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(case_id) DO UPDATE SET
                state = excluded.state,
                severity = excluded.severity,
                revision = excluded.revision,
                payload = excluded.payload
            WHERE excluded.revision >= fraud_case.revision",
            params![
                &case.case_id,
                &case.vendor_id,
                case.window_start.to_string(),
                case.generation as i64,
                case.state.to_string(),
                case.severity.to_string(),
                case.revision as i64,
                payload,
            ],
        )?;
        Ok(())
    }

    pub fn load_cases(&self) -> Result<Vec<FraudCase>> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload FROM fraud_case ORDER BY vendor_id, window_start, generation")?;
        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(Into::into))
            .collect()
    }

    // ── Alerts ─────────────────────────────────────────────────

    /// Returns false when the alert id is already recorded.
    pub fn insert_alert(&self, run_id: &str, alert: &Alert) -> Result<bool> {
        let payload = serde_json::to_string(alert)?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO alert (
                alert_id, run_id, rule, document_id, vendor_id, case_id,
                window_start, severity, payload
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &alert.alert_id,
                run_id,
                alert.rule.id(),
                &alert.document_id,
                &alert.vendor_id,
                &alert.case_id,
                alert.window_start.to_string(),
                alert.severity.to_string(),
                payload,
            ],
        )?;
        Ok(inserted == 1)
    }

    pub fn load_alerts(&self) -> Result<Vec<Alert>> {
        let mut stmt = self.conn.prepare("SELECT payload FROM alert ORDER BY alert_id")?;
        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(Into::into))
            .collect()
    }
}
