//! Evaluators (C10): score a [`ProblemResult`] against its problem's
//! expected answer, and compute cross-run calibration, latency, and
//! learning-improvement metrics.

use std::time::Duration;

use crate::problem::{Problem, ProblemResult};
use crate::value::Value;

/// Scores one problem result against its problem. Implementations may
/// be as simple as string equality or as involved as a rubric-matching
/// LLM judge; this crate only ships the simple ones.
pub trait Evaluator: Send + Sync {
    fn score(&self, problem: &Problem, result: &ProblemResult) -> bool;
}

/// Exact string match between the result's response and the problem's
/// expected value, case- and whitespace-insensitive.
pub struct ExactMatch;

impl Evaluator for ExactMatch {
    fn score(&self, problem: &Problem, result: &ProblemResult) -> bool {
        match &problem.expected {
            Some(Value::String(expected)) => {
                result.response.trim().to_lowercase() == expected.trim().to_lowercase()
            }
            Some(other) => result.response.trim().to_lowercase() == other.display().trim().to_lowercase(),
            None => false,
        }
    }
}

/// Substring match: the expected value must appear somewhere in the
/// response, case-insensitive.
pub struct Contains;

impl Evaluator for Contains {
    fn score(&self, problem: &Problem, result: &ProblemResult) -> bool {
        match &problem.expected {
            Some(expected) => result
                .response
                .to_lowercase()
                .contains(&expected.display().to_lowercase()),
            None => false,
        }
    }
}

const CALIBRATION_BUCKETS: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct CalibrationMetrics {
    /// Expected Calibration Error.
    pub ece: f64,
    /// Maximum Calibration Error.
    pub mce: f64,
    /// Brier score.
    pub brier: f64,
}

/// Bucket results into 10 confidence bands and compute ECE, MCE, and
/// the Brier score across all results.
pub fn compute_calibration(results: &[ProblemResult]) -> CalibrationMetrics {
    if results.is_empty() {
        return CalibrationMetrics::default();
    }

    let mut bucket_confidence_sum = vec![0.0_f64; CALIBRATION_BUCKETS];
    let mut bucket_accuracy_sum = vec![0.0_f64; CALIBRATION_BUCKETS];
    let mut bucket_count = vec![0usize; CALIBRATION_BUCKETS];

    let mut brier_sum = 0.0;
    for r in results {
        let confidence = r.confidence.clamp(0.0, 1.0);
        let bucket = ((confidence * CALIBRATION_BUCKETS as f64) as usize).min(CALIBRATION_BUCKETS - 1);
        bucket_confidence_sum[bucket] += confidence;
        bucket_accuracy_sum[bucket] += if r.correct { 1.0 } else { 0.0 };
        bucket_count[bucket] += 1;

        let outcome = if r.correct { 1.0 } else { 0.0 };
        brier_sum += (confidence - outcome).powi(2);
    }

    let n = results.len() as f64;
    let mut ece = 0.0;
    let mut mce: f64 = 0.0;
    for bucket in 0..CALIBRATION_BUCKETS {
        if bucket_count[bucket] == 0 {
            continue;
        }
        let count = bucket_count[bucket] as f64;
        let avg_confidence = bucket_confidence_sum[bucket] / count;
        let avg_accuracy = bucket_accuracy_sum[bucket] / count;
        let gap = (avg_confidence - avg_accuracy).abs();
        ece += (count / n) * gap;
        mce = mce.max(gap);
    }

    CalibrationMetrics { ece, mce, brier: brier_sum / n }
}

#[derive(Debug, Clone, Default)]
pub struct EfficiencyMetrics {
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub mean: Duration,
}

/// Compute latency percentiles via linear interpolation between the two
/// nearest ranks, the standard method for small, already-bounded sample
/// sets like one benchmark run's results.
pub fn compute_efficiency(results: &[ProblemResult]) -> EfficiencyMetrics {
    if results.is_empty() {
        return EfficiencyMetrics::default();
    }
    let mut latencies: Vec<f64> = results.iter().map(|r| r.latency.as_secs_f64()).collect();
    latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let percentile = |p: f64| -> Duration {
        if latencies.len() == 1 {
            return Duration::from_secs_f64(latencies[0]);
        }
        let rank = p * (latencies.len() - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = rank.ceil() as usize;
        let frac = rank - lower as f64;
        let value = latencies[lower] + frac * (latencies[upper] - latencies[lower]);
        Duration::from_secs_f64(value.max(0.0))
    };

    let mean = latencies.iter().sum::<f64>() / latencies.len() as f64;

    EfficiencyMetrics {
        p50: percentile(0.50),
        p95: percentile(0.95),
        p99: percentile(0.99),
        mean: Duration::from_secs_f64(mean),
    }
}

#[derive(Debug, Clone, Default)]
pub struct LearningMetrics {
    pub initial_accuracy: f64,
    pub final_accuracy: f64,
    pub improvement: f64,
    /// `improvement` amortized over the number of iteration-to-iteration
    /// steps, i.e. `improvement / (n_iterations - 1)`.
    pub learning_rate: f64,
    /// `improvement` as a percentage of `initial_accuracy`, or `0.0` when
    /// the initial accuracy was zero (percentage-of-zero is undefined).
    pub relative: f64,
    /// `true` when `improvement` exceeds the 0.10 significance bar.
    pub significant_improvement: bool,
}

/// Compare the first and last entries of a per-iteration accuracy series —
/// one accuracy value per repeated run over the same suite, not one per
/// problem — as a measure of whether the system got better over time.
pub fn compute_learning(per_iteration_accuracy: &[f64]) -> LearningMetrics {
    if per_iteration_accuracy.len() < 2 {
        return LearningMetrics::default();
    }
    let initial_accuracy = per_iteration_accuracy[0];
    let final_accuracy = *per_iteration_accuracy.last().unwrap();
    let improvement = final_accuracy - initial_accuracy;
    let learning_rate = improvement / (per_iteration_accuracy.len() - 1) as f64;
    let relative = if initial_accuracy > 0.0 { improvement / initial_accuracy * 100.0 } else { 0.0 };
    LearningMetrics {
        initial_accuracy,
        final_accuracy,
        improvement,
        learning_rate,
        relative,
        significant_improvement: improvement > 0.10,
    }
}
