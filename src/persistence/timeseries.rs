//! Append-only JSON timeseries of benchmark runs, for trend tracking
//! and naive regression detection between consecutive entries.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum TimeseriesError {
    #[error("failed to read timeseries file {path}: {source}")]
    #[diagnostic(code(noesis::timeseries::read_failed))]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write timeseries file {path}: {source}")]
    #[diagnostic(code(noesis::timeseries::write_failed))]
    WriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse timeseries entry: {0}")]
    #[diagnostic(code(noesis::timeseries::parse_failed))]
    ParseFailed(#[from] serde_json::Error),
}

pub type TimeseriesResult<T> = std::result::Result<T, TimeseriesError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeseriesEntry {
    pub run_id: String,
    pub suite_name: String,
    pub timestamp: u64,
    pub accuracy: f64,
    pub ece: f64,
    pub avg_latency_secs: f64,
}

/// An append-only, one-JSON-object-per-line timeseries of benchmark
/// runs, loaded entirely into memory and appended to on disk.
#[derive(Debug, Default)]
pub struct Timeseries {
    entries: Vec<TimeseriesEntry>,
}

impl Timeseries {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn add_entry(&mut self, entry: TimeseriesEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TimeseriesEntry] {
        &self.entries
    }

    /// The trend for `suite_name`: every recorded accuracy value for
    /// that suite, in insertion order.
    pub fn get_trend(&self, suite_name: &str) -> Vec<f64> {
        self.entries
            .iter()
            .filter(|e| e.suite_name == suite_name)
            .map(|e| e.accuracy)
            .collect()
    }

    /// A regression is flagged when the most recent entry for a suite
    /// drops accuracy by more than `threshold` relative to the entry
    /// before it. Returns `None` when there is no prior entry to
    /// compare against.
    pub fn detect_regression(&self, suite_name: &str, threshold: f64) -> Option<bool> {
        let trend = self.get_trend(suite_name);
        if trend.len() < 2 {
            return None;
        }
        let previous = trend[trend.len() - 2];
        let latest = trend[trend.len() - 1];
        Some(previous - latest > threshold)
    }

    pub fn save(&self, path: &Path) -> TimeseriesResult<()> {
        let mut file = std::fs::File::create(path)
            .map_err(|source| TimeseriesError::WriteFailed { path: path.to_path_buf(), source })?;
        for entry in &self.entries {
            let line = serde_json::to_string(entry)?;
            writeln!(file, "{line}")
                .map_err(|source| TimeseriesError::WriteFailed { path: path.to_path_buf(), source })?;
        }
        Ok(())
    }

    pub fn load(path: &Path) -> TimeseriesResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|source| TimeseriesError::ReadFailed { path: path.to_path_buf(), source })?;
        let mut entries = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(line)?);
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(run_id: &str, accuracy: f64) -> TimeseriesEntry {
        TimeseriesEntry {
            run_id: run_id.to_string(),
            suite_name: "logic".to_string(),
            timestamp: 0,
            accuracy,
            ece: 0.1,
            avg_latency_secs: 0.2,
        }
    }

    #[test]
    fn save_and_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        let mut series = Timeseries::new();
        series.add_entry(entry("r1", 0.8));
        series.add_entry(entry("r2", 0.9));
        series.save(&path).unwrap();

        let loaded = Timeseries::load(&path).unwrap();
        assert_eq!(loaded.entries().len(), 2);
        assert_eq!(loaded.get_trend("logic"), vec![0.8, 0.9]);
    }

    #[test]
    fn regression_is_detected_on_accuracy_drop() {
        let mut series = Timeseries::new();
        series.add_entry(entry("r1", 0.9));
        series.add_entry(entry("r2", 0.6));
        assert_eq!(series.detect_regression("logic", 0.1), Some(true));
    }

    #[test]
    fn no_regression_with_insufficient_history() {
        let mut series = Timeseries::new();
        series.add_entry(entry("r1", 0.9));
        assert_eq!(series.detect_regression("logic", 0.1), None);
    }
}
