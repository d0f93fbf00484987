//! SQLite persistence for backtest runs and their sample cohorts.
//!
//! RULE: Only store.rs talks to the database.
//! The driver hands whole `Samples` collections over; it never executes SQL.

use crate::{
    error::BacktestResult,
    features::FeatureIndex,
    sample::{Sample, Samples},
    types::{AgreementId, Cohort, CustomerId, Label},
};
use rusqlite::{params, Connection};

pub struct SampleStore {
    conn: Connection,
}

impl SampleStore {
    /// Open (or create) the sample database at `path`.
    pub fn open(path: &str) -> BacktestResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> BacktestResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> BacktestResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_samples.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, version: &str) -> BacktestResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, version, started_at) VALUES (?1, ?2, ?3)",
            params![run_id, version, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ── Samples ────────────────────────────────────────────────

    /// Persist one cohort. Saving the same cohort twice replaces it.
    pub fn save_samples(&self, run_id: &str, cohort: Cohort, samples: &Samples) -> BacktestResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM sample WHERE run_id = ?1 AND cohort = ?2",
            params![run_id, cohort.as_str()],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO cohort (run_id, cohort, feature_index) VALUES (?1, ?2, ?3)",
            params![run_id, cohort.as_str(), serde_json::to_string(samples.feature_index())?],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO sample (run_id, cohort, position, customer_id, agreements, features, label, predicted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for (position, sample) in samples.iter().enumerate() {
                stmt.execute(params![
                    run_id,
                    cohort.as_str(),
                    position as i64,
                    sample.customer().as_str(),
                    serde_json::to_string(sample.agreements())?,
                    serde_json::to_string(sample.x())?,
                    sample.y().as_i64(),
                    sample.y_pred().map(Label::as_i64),
                ])?;
            }
        }
        tx.commit()?;
        log::debug!("store: saved {} {cohort} samples for {run_id}", samples.len());
        Ok(())
    }

    /// Load a cohort in its saved order, predictions included. A stored
    /// vector whose width differs from the stored index is an error.
    pub fn load_samples(&self, run_id: &str, cohort: Cohort) -> BacktestResult<Samples> {
        let index_json: String = self.conn.query_row(
            "SELECT feature_index FROM cohort WHERE run_id = ?1 AND cohort = ?2",
            params![run_id, cohort.as_str()],
            |row| row.get(0),
        )?;
        let index: FeatureIndex = serde_json::from_str(&index_json)?;

        let mut stmt = self.conn.prepare(
            "SELECT customer_id, agreements, features, label, predicted
             FROM sample WHERE run_id = ?1 AND cohort = ?2
             ORDER BY position ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id, cohort.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut samples = Samples::new(index);
        for (customer, agreements, features, label, predicted) in rows {
            let agreements: Vec<AgreementId> = serde_json::from_str(&agreements)?;
            let x: Vec<f64> = serde_json::from_str(&features)?;
            let mut sample = Sample::new(CustomerId::new(customer), agreements, x, Label::from_f64(label as f64));
            if let Some(p) = predicted {
                sample.set_prediction(Label::from_f64(p as f64));
            }
            samples.push(sample)?;
        }
        Ok(samples)
    }

    pub fn sample_count(&self, run_id: &str, cohort: Cohort) -> BacktestResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM sample WHERE run_id = ?1 AND cohort = ?2",
            params![run_id, cohort.as_str()],
            |r| r.get(0),
        )?)
    }
}
