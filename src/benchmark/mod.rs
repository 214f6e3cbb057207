//! Benchmark harness (C9): load a suite of problems, run them through a
//! pluggable executor, and aggregate accuracy, calibration, latency,
//! and (when the executor is RL-aware) bandit-specific metrics.

pub mod evaluator;
pub mod executor;

use std::path::{Path, PathBuf};
use std::time::Instant;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::problem::{unix_now, BenchmarkRun, Problem, ProblemResult, RlAggregates};

use self::evaluator::{compute_calibration, Evaluator};
use self::executor::Executor;

#[derive(Debug, Error, Diagnostic)]
pub enum BenchmarkError {
    #[error("suite path escapes the suite root: {path}")]
    #[diagnostic(
        code(noesis::benchmark::path_traversal),
        help("Suite paths must be relative and may not contain `..` or start with `/`.")
    )]
    PathTraversal { path: String },

    #[error("failed to read suite file {path}: {source}")]
    #[diagnostic(code(noesis::benchmark::suite_read_failed))]
    SuiteReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse suite file {path}: {source}")]
    #[diagnostic(code(noesis::benchmark::suite_parse_failed))]
    SuiteParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("suite \"{0}\" contains no problems")]
    #[diagnostic(code(noesis::benchmark::empty_suite))]
    EmptySuite(String),
}

pub type BenchmarkResult<T> = std::result::Result<T, BenchmarkError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suite {
    pub name: String,
    pub problems: Vec<Problem>,
}

/// Load a suite from `root/relative_path`, rejecting any path that
/// escapes `root` via an absolute component or a `..` segment. Mirrors
/// the teacher's refusal to follow untrusted paths outside a sandboxed
/// root.
pub fn load_suite(root: &Path, relative_path: &str) -> BenchmarkResult<Suite> {
    if relative_path.starts_with('/') || Path::new(relative_path).is_absolute() {
        return Err(BenchmarkError::PathTraversal { path: relative_path.to_string() });
    }
    if Path::new(relative_path).components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(BenchmarkError::PathTraversal { path: relative_path.to_string() });
    }

    let full_path = root.join(relative_path);
    let contents = std::fs::read_to_string(&full_path)
        .map_err(|source| BenchmarkError::SuiteReadFailed { path: full_path.clone(), source })?;
    let suite: Suite = serde_json::from_str(&contents)
        .map_err(|source| BenchmarkError::SuiteParseFailed { path: full_path, source })?;

    if suite.problems.is_empty() {
        return Err(BenchmarkError::EmptySuite(suite.name));
    }
    Ok(suite)
}

/// Run every problem in `suite` through `executor`, scoring each with
/// `evaluator`, and aggregate the results into a [`BenchmarkRun`].
///
/// Per spec §7, an executor failure on one problem is isolated into a
/// failed [`ProblemResult`] rather than aborting the run — one bad
/// problem should not cost the rest of the suite's data.
pub fn run_suite(run_id: &str, suite: &Suite, executor: &dyn Executor, evaluator: &dyn Evaluator) -> BenchmarkRun {
    let mut run = BenchmarkRun::new(run_id, suite.name.clone());
    run.timestamp = unix_now();

    let mut mode_distribution = std::collections::HashMap::new();
    let mut correct = 0usize;
    let mut total_latency = std::time::Duration::ZERO;

    for problem in &suite.problems {
        let started = Instant::now();
        let result = match executor.execute(problem) {
            Ok(mut r) => {
                r.latency = started.elapsed();
                r.correct = evaluator.score(problem, &r);
                r
            }
            Err(err) => {
                tracing::warn!(problem_id = %problem.id, error = %err, "executor failed on problem");
                let mut r = ProblemResult::failed(problem.id.clone(), err.to_string());
                r.latency = started.elapsed();
                r
            }
        };

        *mode_distribution.entry(result.mode.clone()).or_insert(0u64) += 1;
        total_latency += result.latency;
        if result.correct {
            correct += 1;
        }
        run.results.push(result);
    }

    let n = run.results.len().max(1) as f64;
    run.overall_accuracy = correct as f64 / n;
    run.overall_ece = compute_calibration(&run.results).ece;
    run.avg_latency = total_latency / run.results.len().max(1) as u32;
    run.mode_distribution = mode_distribution;

    if let Some(rl) = executor.rl_aggregates(&run.results) {
        run.rl = Some(rl);
    }

    run
}

/// Placeholder RL aggregation shared by executors that are not
/// RL-aware: no strategy distribution, flat learning curve.
pub fn empty_rl_aggregates() -> RlAggregates {
    RlAggregates::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::evaluator::ExactMatch;
    use crate::benchmark::executor::DirectExecutor;
    use crate::value::Value;
    use tempfile::tempdir;

    #[test]
    fn load_suite_rejects_absolute_paths() {
        let dir = tempdir().unwrap();
        let result = load_suite(dir.path(), "/etc/passwd");
        assert!(matches!(result, Err(BenchmarkError::PathTraversal { .. })));
    }

    #[test]
    fn load_suite_rejects_parent_dir_traversal() {
        let dir = tempdir().unwrap();
        let result = load_suite(dir.path(), "../outside.json");
        assert!(matches!(result, Err(BenchmarkError::PathTraversal { .. })));
    }

    #[test]
    fn load_suite_rejects_empty_suite() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("empty.json"), r#"{"name": "empty", "problems": []}"#).unwrap();
        let result = load_suite(dir.path(), "empty.json");
        assert!(matches!(result, Err(BenchmarkError::EmptySuite(_))));
    }

    #[test]
    fn load_suite_parses_valid_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("suite.json"),
            r#"{"name": "s1", "problems": [{"id": "p1", "description": "d", "category": "logic"}]}"#,
        )
        .unwrap();
        let suite = load_suite(dir.path(), "suite.json").unwrap();
        assert_eq!(suite.problems.len(), 1);
    }

    #[test]
    fn run_suite_isolates_executor_failures() {
        struct AlwaysFails;
        impl Executor for AlwaysFails {
            fn execute(&self, _problem: &Problem) -> Result<ProblemResult, executor::ExecutorError> {
                Err(executor::ExecutorError::Failed("boom".into()))
            }
        }

        let mut p1 = Problem::new("p1", "d1");
        p1.expected = Some(Value::from("x"));
        let suite = Suite { name: "s".into(), problems: vec![p1] };
        let run = run_suite("r1", &suite, &AlwaysFails, &ExactMatch);
        assert_eq!(run.results.len(), 1);
        assert!(!run.results[0].correct);
        assert!(run.results[0].error.is_some());
    }

    #[test]
    fn run_suite_computes_accuracy() {
        let mut p1 = Problem::new("p1", "d1");
        p1.expected = Some(Value::from("answer"));
        let suite = Suite { name: "s".into(), problems: vec![p1] };
        let executor = DirectExecutor::new();
        let run = run_suite("r1", &suite, &executor, &ExactMatch);
        assert_eq!(run.results.len(), 1);
        assert!((0.0..=1.0).contains(&run.overall_accuracy));
    }
}
