//! SQLite-backed relational persistence: benchmark runs and their
//! per-problem results, trajectories (stored as JSON blobs alongside
//! queryable columns), and the signatures computed over them.
//!
//! Every multi-statement write runs inside one transaction so a crash
//! mid-write never leaves a run's header committed without its results,
//! or vice versa.

use std::path::Path;

use miette::Diagnostic;
use rusqlite::{params, Connection};
use thiserror::Error;

use crate::memory::signature::ProblemSignature;
use crate::memory::PersistenceBackend;
use crate::problem::BenchmarkRun;
use crate::trajectory::Trajectory;

#[derive(Debug, Error, Diagnostic)]
pub enum SqliteError {
    #[error("sqlite error: {0}")]
    #[diagnostic(code(noesis::sqlite::driver))]
    Driver(#[from] rusqlite::Error),

    #[error("failed to serialize record: {0}")]
    #[diagnostic(code(noesis::sqlite::serialize))]
    Serialize(#[from] serde_json::Error),
}

pub type SqliteResult<T> = std::result::Result<T, SqliteError>;

/// A SQLite-backed store, opened at a file path or `:memory:`.
pub struct SqliteBackend {
    conn: std::sync::Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(path: &Path) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        let backend = Self { conn: std::sync::Mutex::new(conn) };
        backend.ensure_schema()?;
        Ok(backend)
    }

    pub fn open_in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        let backend = Self { conn: std::sync::Mutex::new(conn) };
        backend.ensure_schema()?;
        Ok(backend)
    }

    /// Create every table if it does not already exist. Safe to call
    /// repeatedly on an existing database.
    pub fn ensure_schema(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS benchmark_runs (
                run_id TEXT PRIMARY KEY,
                suite_name TEXT NOT NULL,
                git_commit TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                overall_accuracy REAL NOT NULL,
                overall_ece REAL NOT NULL,
                avg_latency_secs REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS benchmark_results (
                run_id TEXT NOT NULL REFERENCES benchmark_runs(run_id),
                problem_id TEXT NOT NULL,
                correct INTEGER NOT NULL,
                score REAL NOT NULL,
                confidence REAL NOT NULL,
                latency_secs REAL NOT NULL,
                mode TEXT NOT NULL,
                tokens INTEGER NOT NULL,
                error TEXT
            );

            CREATE TABLE IF NOT EXISTS trajectories (
                id TEXT PRIMARY KEY,
                domain TEXT NOT NULL,
                success_score REAL NOT NULL,
                created_at INTEGER NOT NULL,
                body TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS embeddings (
                trajectory_id TEXT PRIMARY KEY REFERENCES trajectories(id),
                provider TEXT NOT NULL,
                model TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                vector TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS problem_signatures (
                hash TEXT PRIMARY KEY,
                domain TEXT NOT NULL,
                problem_type TEXT NOT NULL,
                complexity_low REAL NOT NULL,
                complexity_high REAL NOT NULL,
                capability_tags TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub fn save_benchmark_run(&self, run: &BenchmarkRun) -> SqliteResult<()> {
        let mut conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR REPLACE INTO benchmark_runs
                (run_id, suite_name, git_commit, timestamp, overall_accuracy, overall_ece, avg_latency_secs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run.run_id,
                run.suite_name,
                run.git_commit,
                run.timestamp as i64,
                run.overall_accuracy,
                run.overall_ece,
                run.avg_latency.as_secs_f64(),
            ],
        )?;

        for result in &run.results {
            tx.execute(
                "INSERT INTO benchmark_results
                    (run_id, problem_id, correct, score, confidence, latency_secs, mode, tokens, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    run.run_id,
                    result.problem_id,
                    result.correct as i64,
                    result.score,
                    result.confidence,
                    result.latency.as_secs_f64(),
                    result.mode,
                    result.tokens as i64,
                    result.error,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn save_trajectory_record(&self, trajectory: &Trajectory) -> SqliteResult<()> {
        let body = serde_json::to_string(trajectory)?;
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO trajectories (id, domain, success_score, created_at, body)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![trajectory.id, trajectory.domain, trajectory.success_score, trajectory.created_at as i64, body],
        )?;
        Ok(())
    }

    pub fn save_signature(&self, signature: &ProblemSignature) -> SqliteResult<()> {
        let tags = signature.capability_tags.join(",");
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO problem_signatures
                (hash, domain, problem_type, complexity_low, complexity_high, capability_tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                signature.hash,
                signature.domain,
                signature.problem_type,
                signature.complexity_band.0,
                signature.complexity_band.1,
                tags,
            ],
        )?;
        Ok(())
    }

    pub fn load_trajectory(&self, id: &str) -> SqliteResult<Option<Trajectory>> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let mut stmt = conn.prepare("SELECT body FROM trajectories WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => {
                let body: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    pub fn count_trajectories(&self) -> SqliteResult<i64> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        conn.query_row("SELECT COUNT(*) FROM trajectories", [], |row| row.get(0))
            .map_err(SqliteError::from)
    }
}

impl PersistenceBackend for SqliteBackend {
    fn save_trajectory(&self, trajectory: &Trajectory) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.save_trajectory_record(trajectory).map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
    }
}
