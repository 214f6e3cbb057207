//! Trajectories: the frozen record of one reasoning session, from
//! problem to outcome, synthesized by [`crate::session::SessionTracker`]
//! on completion (§4.5) and owned thereafter by
//! [`crate::memory::EpisodicStore`] (§4.3).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::problem::{unix_now, Problem};
use crate::value::ValueMap;

/// One numbered step within a reasoning session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// 1-based, monotonically increasing within its session.
    pub step_number: u64,
    pub timestamp: u64,
    pub tool: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub input: ValueMap,
    #[serde(default)]
    pub output: ValueMap,
    #[serde(default)]
    pub thought_id: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
    pub confidence: f64,
    pub duration: Duration,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub insights: Vec<String>,
}

impl ReasoningStep {
    /// A step under construction; the session tracker assigns
    /// `step_number` and `timestamp` when it is recorded.
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            step_number: 0,
            timestamp: 0,
            tool: tool.into(),
            mode: None,
            input: ValueMap::new(),
            output: ValueMap::new(),
            thought_id: None,
            branch_id: None,
            confidence: 0.0,
            duration: Duration::ZERO,
            success: true,
            error: None,
            insights: Vec::new(),
        }
    }
}

/// The inferred high-level approach a session took.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approach {
    pub strategy: String,
    pub modes_used: Vec<String>,
    pub tool_sequence: Vec<String>,
    pub key_decisions: Vec<String>,
}

/// Terminal status of a reasoning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Partial,
    Failure,
}

/// The caller-supplied (or inferred) result of a session, passed to
/// `complete_session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    #[serde(default)]
    pub goals_achieved: Vec<String>,
    #[serde(default)]
    pub goals_failed: Vec<String>,
    #[serde(default)]
    pub goals: Option<Vec<String>>,
    pub confidence: f64,
    #[serde(default)]
    pub solution: String,
}

/// Seven real-valued quality scores plus defect counts, all scores
/// clamped to `[0, 1]` by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub overall: f64,
    pub efficiency: f64,
    pub coherence: f64,
    pub completeness: f64,
    pub innovation: f64,
    pub reliability: f64,
    pub bias: f64,
    pub fallacy_count: u32,
    pub contradiction_count: u32,
    pub self_evaluation_score: f64,
}

impl QualityMetrics {
    pub fn clamp_scores(mut self) -> Self {
        self.overall = self.overall.clamp(0.0, 1.0);
        self.efficiency = self.efficiency.clamp(0.0, 1.0);
        self.coherence = self.coherence.clamp(0.0, 1.0);
        self.completeness = self.completeness.clamp(0.0, 1.0);
        self.innovation = self.innovation.clamp(0.0, 1.0);
        self.reliability = self.reliability.clamp(0.0, 1.0);
        self.bias = self.bias.clamp(0.0, 1.0);
        self.self_evaluation_score = self.self_evaluation_score.clamp(0.0, 1.0);
        self
    }
}

impl Default for QualityMetrics {
    fn default() -> Self {
        Self {
            overall: 0.0,
            efficiency: 0.0,
            coherence: 0.7,
            completeness: 0.0,
            innovation: 0.0,
            reliability: 0.0,
            bias: 0.0,
            fallacy_count: 0,
            contradiction_count: 0,
            self_evaluation_score: 0.0,
        }
    }
}

/// An immutable snapshot built at session completion. Owns its problem
/// and steps exclusively; readers hold a shared reference through the
/// episodic store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    pub id: String,
    pub problem: Problem,
    pub approach: Approach,
    pub steps: Vec<ReasoningStep>,
    pub outcome: Outcome,
    pub quality: QualityMetrics,
    pub tags: Vec<String>,
    pub domain: String,
    pub complexity: f64,
    /// In `[0, 1]`.
    pub success_score: f64,
    pub duration: Duration,
    pub created_at: u64,
}

impl Trajectory {
    pub fn tool_sequence(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.tool.clone()).collect()
    }
}

/// A group of trajectories that share a tool-sequence hash, aggregated
/// for the recommendation engine (§4.6). Derived, rebuilt per call.
#[derive(Debug, Clone)]
pub struct ToolSequencePattern {
    pub sequence_hash: String,
    pub sequence: Vec<String>,
    pub trajectory_ids: Vec<String>,
    pub success_rate: f64,
    pub average_quality: f64,
    pub usage_count: u64,
}

/// A `(trajectory, similarity)` pair returned by similarity search, used
/// throughout the recommendation and retrospective subsystems.
#[derive(Debug, Clone)]
pub struct TrajectoryMatch {
    pub trajectory: Trajectory,
    pub similarity: f64,
}

pub(crate) fn now() -> u64 {
    unix_now()
}
