//! Shared data model: problems, per-problem results, and run-level
//! aggregates. These types are produced by the benchmark harness (§4.9),
//! consumed by evaluators (§4.10) and executors (§4.11), and referenced
//! by trajectories (§4.5) via [`ContextSignature`](crate::memory::signature::ContextSignature).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::value::{Value, ValueMap};

/// Difficulty band for a [`Problem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Embedding metadata attached to a problem after [`crate::memory::embedding`]
/// generates a vector for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingMeta {
    pub model: String,
    pub provider: String,
    pub dimension: usize,
    pub source: String,
}

/// A problem to be solved, immutable once loaded from a suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub input: ValueMap,
    #[serde(default)]
    pub expected: Option<Value>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub metadata: ValueMap,

    /// Domain label used for similarity scoring and signature hashing.
    /// Distinct from `category` (the benchmark grouping); domain is the
    /// reasoning-content classification (e.g. "logic", "causal").
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub problem_type: String,
    /// Complexity estimate in `[0, 1]`.
    #[serde(default)]
    pub complexity: f64,
    /// Goal statements the solution must satisfy, used by
    /// `ProblemSimilarity`'s goal-overlap check.
    #[serde(default)]
    pub goals: Vec<String>,

    /// Vector embedding, populated on demand by the embedding integration.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub embedding_meta: Option<EmbeddingMeta>,
}

impl Problem {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            input: ValueMap::new(),
            expected: None,
            category: String::new(),
            difficulty: None,
            metadata: ValueMap::new(),
            domain: String::new(),
            problem_type: String::new(),
            complexity: 0.0,
            goals: Vec::new(),
            embedding: None,
            embedding_meta: None,
        }
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|v| !v.is_empty())
    }
}

/// Outcome of running a single problem through an executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemResult {
    pub problem_id: String,
    pub correct: bool,
    /// Score in `[0, 1]`.
    pub score: f64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub latency: std::time::Duration,
    pub mode: String,
    pub response: String,
    pub tokens: u64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: ValueMap,
}

impl ProblemResult {
    /// Build a failed result from an executor error, per spec §7: the
    /// runner isolates executor failures rather than propagating them.
    pub fn failed(problem_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            problem_id: problem_id.into(),
            correct: false,
            score: 0.0,
            confidence: 0.0,
            latency: std::time::Duration::ZERO,
            mode: String::new(),
            response: String::new(),
            tokens: 0,
            error: Some(error.into()),
            metadata: ValueMap::new(),
        }
    }
}

/// Reinforcement-learning aggregates attached to a [`BenchmarkRun`] when
/// the executor is RL-aware (§4.9 step 5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RlAggregates {
    pub strategy_distribution: HashMap<String, u64>,
    pub learning_curve: Vec<f64>,
    pub initial_accuracy: f64,
    pub final_accuracy: f64,
    pub improvement: f64,
    pub exploration_rate: f64,
    pub strategy_diversity_entropy: f64,
}

/// A complete benchmark run: one pass of a suite through an executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkRun {
    pub run_id: String,
    pub suite_name: String,
    pub git_commit: String,
    pub timestamp: u64,
    pub results: Vec<ProblemResult>,
    pub overall_accuracy: f64,
    pub overall_ece: f64,
    pub avg_latency: std::time::Duration,
    pub mode_distribution: HashMap<String, u64>,
    pub rl: Option<RlAggregates>,
}

impl BenchmarkRun {
    pub fn new(run_id: impl Into<String>, suite_name: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            suite_name: suite_name.into(),
            git_commit: String::new(),
            timestamp: unix_now(),
            results: Vec::new(),
            overall_accuracy: 0.0,
            overall_ece: 0.0,
            avg_latency: std::time::Duration::ZERO,
            mode_distribution: HashMap::new(),
            rl: None,
        }
    }
}

/// Seconds since the UNIX epoch, matching the teacher's timestamp
/// convention throughout (no `chrono` dependency needed for a value this
/// simple).
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Nanoseconds since the UNIX epoch, used where higher resolution is
/// needed for default id generation (`traj_{nano_timestamp}`).
pub fn unix_now_nanos() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}
