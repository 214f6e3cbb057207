//! Session tracking: accumulate reasoning steps for an in-flight problem
//! and, on completion, synthesize an immutable [`Trajectory`].
//!
//! Two-level locking, mirroring the teacher's working-memory tracker: a
//! sharded concurrent map (`DashMap`) takes the place of an outer
//! `RwLock<HashMap<..>>` so a lookup on one session never blocks an
//! insert or removal of another, and each [`ActiveSession`] still
//! carries its own `Mutex` so concurrent steps on the *same* session
//! serialize without holding up the shard they live in.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::problem::{unix_now, Problem};
use crate::trajectory::{
    Approach, Outcome, OutcomeStatus, QualityMetrics, ReasoningStep, Trajectory,
};

/// State accumulated for one in-flight reasoning session.
pub struct ActiveSession {
    pub id: String,
    pub problem: Problem,
    pub steps: Mutex<Vec<ReasoningStep>>,
    pub started_at: Instant,
    pub started_at_unix: u64,
}

impl ActiveSession {
    fn new(id: String, problem: Problem) -> Self {
        Self {
            id,
            problem,
            steps: Mutex::new(Vec::new()),
            started_at: Instant::now(),
            started_at_unix: unix_now(),
        }
    }
}

/// Tracks every reasoning session currently in progress.
pub struct SessionTracker {
    sessions: DashMap<String, ActiveSession>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Begin tracking a new session under `session_id`, replacing any
    /// prior session with the same id.
    pub fn start_session(&self, session_id: impl Into<String>, problem: Problem) {
        let id = session_id.into();
        tracing::debug!(session_id = %id, problem_id = %problem.id, "session started");
        self.sessions.insert(id.clone(), ActiveSession::new(id, problem));
    }

    /// Append `step` to `session_id`, assigning its `step_number` and
    /// `timestamp`. If the session is unknown, it is implicitly created
    /// with a placeholder problem — a caller that calls `record_step`
    /// before `start_session` still gets a trajectory, just a thinner one.
    pub fn record_step(&self, session_id: &str, mut step: ReasoningStep) {
        if let Some(session) = self.sessions.get(session_id) {
            let mut steps = session.steps.lock().expect("steps lock poisoned");
            step.step_number = steps.len() as u64 + 1;
            step.timestamp = unix_now();
            steps.push(step);
            return;
        }

        tracing::debug!(session_id, "implicit session created from tool usage");
        let mut placeholder = Problem::new(session_id, "Implicit problem from tool usage");
        placeholder.domain = "unknown".to_string();
        self.start_session(session_id, placeholder);

        let session = self
            .sessions
            .get(session_id)
            .expect("just inserted above, under the same lock discipline");
        let mut steps = session.steps.lock().expect("steps lock poisoned");
        step.step_number = steps.len() as u64 + 1;
        step.timestamp = unix_now();
        steps.push(step);
    }

    /// Convenience wrapper over `record_step` for a pure-thought step
    /// (no tool invocation, just a recorded deliberation).
    pub fn record_thought(&self, session_id: &str, thought_id: impl Into<String>, content: impl Into<String>, confidence: f64) {
        let mut step = ReasoningStep::new("thought");
        step.thought_id = Some(thought_id.into());
        step.insights.push(content.into());
        step.confidence = confidence;
        self.record_step(session_id, step);
    }

    pub fn get_active_session_problem(&self, session_id: &str) -> Option<Problem> {
        self.sessions.get(session_id).map(|s| s.problem.clone())
    }

    pub fn list_active_sessions(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Remove the session from the active map and synthesize its
    /// [`Trajectory`]. Returns `None` if `session_id` was never started.
    pub fn complete_session(&self, session_id: &str, outcome: Outcome) -> Option<Trajectory> {
        let (_, session) = self.sessions.remove(session_id)?;

        let steps = session.steps.into_inner().expect("steps lock poisoned");
        let duration = session.started_at.elapsed();
        let approach = infer_approach(&steps);
        let quality = compute_quality_metrics(&steps, &outcome, duration);
        let success_score = compute_success_score(&outcome, &quality);
        let tags = generate_tags(&session.problem, &approach, &outcome);

        Some(Trajectory {
            id: format!(
                "traj_{}_{}_{}",
                session.id, session.problem.id, session.started_at_unix
            ),
            domain: session.problem.domain.clone(),
            complexity: session.problem.complexity,
            problem: session.problem,
            approach,
            steps,
            outcome,
            quality,
            tags,
            success_score,
            duration,
            created_at: unix_now(),
        })
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify the session's overall strategy from the tools and modes it
/// touched (§4.5): checkpoints imply backtracking; a mix of tree and
/// divergent exploration implies creative multi-branching; either alone
/// degrades to its single-mode label; linear-only is systematic; an
/// empty session has no inferrable strategy.
fn infer_approach(steps: &[ReasoningStep]) -> Approach {
    let tool_sequence: Vec<String> = steps.iter().map(|s| s.tool.clone()).collect();
    let modes_used: Vec<String> = {
        let mut seen = Vec::new();
        for step in steps {
            if let Some(mode) = &step.mode {
                if !seen.contains(mode) {
                    seen.push(mode.clone());
                }
            }
        }
        seen
    };

    let used_checkpoint = tool_sequence.iter().any(|t| t.contains("checkpoint"));
    let used_tree = modes_used.iter().any(|m| m == "tree");
    let used_divergent = modes_used.iter().any(|m| m == "divergent");
    let used_linear = modes_used.iter().any(|m| m == "linear");

    let strategy = if used_checkpoint {
        "exploratory-with-backtracking"
    } else if used_tree && used_divergent {
        "multi-branch-creative"
    } else if used_tree {
        "parallel-exploration"
    } else if used_divergent {
        "creative-divergent"
    } else if used_linear {
        "systematic-linear"
    } else if steps.is_empty() {
        "unknown"
    } else {
        "mixed-approach"
    }
    .to_string();

    let key_decisions = steps
        .iter()
        .filter(|s| s.confidence >= 0.8 && !s.insights.is_empty())
        .flat_map(|s| s.insights.iter().cloned())
        .collect();

    Approach {
        strategy,
        modes_used,
        tool_sequence,
        key_decisions,
    }
}

/// Tools whose use signals a deliberately creative/divergent move rather
/// than a routine step, counted toward `innovation` alongside divergent
/// mode usage.
const INNOVATION_TOOLS: &[&str] = &["find-analogy", "generate-hypotheses", "detect-emergent-patterns"];

/// Derive the five quality scores from the step record and outcome, per
/// the fixed formulas: fewer than eight steps is maximally efficient;
/// coherence holds at a flat baseline absent a real discourse analyzer;
/// completeness tracks stated-goal achievement; innovation rewards
/// exploratory tool use; reliability mirrors the outcome's own
/// confidence.
fn compute_quality_metrics(steps: &[ReasoningStep], outcome: &Outcome, _duration: Duration) -> QualityMetrics {
    let total = steps.len().max(1) as f64;

    let efficiency = if steps.len() <= 7 { 1.0 } else { (7.0 / total).max(0.3) };

    // Coherence: held at a constant baseline until a real discourse
    // consistency check replaces it.
    let coherence = 0.7;

    // Completeness: fraction of stated goals actually achieved; 1.0 when
    // no goals were stated, 0.5 when the outcome never recorded a goal
    // list at all.
    let completeness = match &outcome.goals {
        Some(goals) if goals.is_empty() => 1.0,
        Some(goals) => outcome.goals_achieved.len() as f64 / goals.len() as f64,
        None => 0.5,
    };

    // Innovation: use of analogy/hypothesis/pattern-detection tools, plus
    // any divergent-mode step, normalized against a budget of five.
    let innovation_tool_hits = steps.iter().filter(|s| INNOVATION_TOOLS.contains(&s.tool.as_str())).count() as f64;
    let used_divergent = steps.iter().any(|s| s.mode.as_deref() == Some("divergent"));
    let innovation = ((innovation_tool_hits + if used_divergent { 1.0 } else { 0.0 }) / 5.0).clamp(0.0, 1.0);

    // Reliability: the outcome's own stated confidence.
    let reliability = outcome.confidence;

    // Bias: placeholder signal held at 0 until a fallacy/bias detector
    // is wired in; left as a distinct field so downstream consumers
    // don't need a schema change when one is.
    let bias = 0.0;

    let mean_confidence = if steps.is_empty() {
        0.0
    } else {
        steps.iter().map(|s| s.confidence).sum::<f64>() / total
    };
    let self_evaluation_score = mean_confidence.clamp(0.0, 1.0);

    let overall =
        0.2 * efficiency + 0.2 * coherence + 0.2 * completeness + 0.1 * innovation + 0.3 * reliability;

    QualityMetrics {
        overall,
        efficiency,
        coherence,
        completeness,
        innovation,
        reliability,
        bias,
        fallacy_count: 0,
        contradiction_count: 0,
        self_evaluation_score,
    }
    .clamp_scores()
}

/// Blend the stated outcome's status, the derived quality score, and the
/// outcome's own confidence into one headline `success_score`, in two
/// stages: status and quality mix first, then confidence is folded in.
fn compute_success_score(outcome: &Outcome, quality: &QualityMetrics) -> f64 {
    let base = match outcome.status {
        OutcomeStatus::Success => 0.9,
        OutcomeStatus::Partial => 0.6,
        OutcomeStatus::Failure => 0.2,
    };
    let mix = base * 0.6 + quality.overall * 0.4;
    (mix * 0.7 + outcome.confidence * 0.3).clamp(0.0, 1.0)
}

fn generate_tags(problem: &Problem, approach: &Approach, outcome: &Outcome) -> Vec<String> {
    let mut tags = Vec::new();
    if !problem.domain.is_empty() {
        tags.push(problem.domain.clone());
    }
    if !problem.problem_type.is_empty() {
        tags.push(problem.problem_type.clone());
    }
    tags.push(approach.strategy.clone());
    tags.push(
        match outcome.status {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Partial => "partial",
            OutcomeStatus::Failure => "failure",
        }
        .to_string(),
    );
    tags.sort();
    tags.dedup();
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: OutcomeStatus) -> Outcome {
        Outcome {
            status,
            goals_achieved: Vec::new(),
            goals_failed: Vec::new(),
            goals: None,
            confidence: 0.9,
            solution: "done".into(),
        }
    }

    #[test]
    fn implicit_session_is_created_on_first_step() {
        let tracker = SessionTracker::new();
        tracker.record_step("s1", ReasoningStep::new("analyze"));
        let traj = tracker.complete_session("s1", outcome(OutcomeStatus::Success)).unwrap();
        assert_eq!(traj.problem.domain, "unknown");
        assert_eq!(traj.steps.len(), 1);
        assert_eq!(traj.steps[0].step_number, 1);
    }

    #[test]
    fn completing_unknown_session_returns_none() {
        let tracker = SessionTracker::new();
        assert!(tracker.complete_session("ghost", outcome(OutcomeStatus::Success)).is_none());
    }

    #[test]
    fn checkpoint_tool_infers_backtracking_strategy() {
        let tracker = SessionTracker::new();
        tracker.start_session("s1", Problem::new("p1", "desc"));
        tracker.record_step("s1", ReasoningStep::new("checkpoint_create"));
        tracker.record_step("s1", ReasoningStep::new("checkpoint_restore"));
        let traj = tracker.complete_session("s1", outcome(OutcomeStatus::Success)).unwrap();
        assert_eq!(traj.approach.strategy, "exploratory-with-backtracking");
    }

    #[test]
    fn empty_session_has_unknown_strategy() {
        let tracker = SessionTracker::new();
        tracker.start_session("s1", Problem::new("p1", "desc"));
        let traj = tracker.complete_session("s1", outcome(OutcomeStatus::Success)).unwrap();
        assert_eq!(traj.approach.strategy, "unknown");
    }

    #[test]
    fn quality_scores_stay_in_unit_interval() {
        let tracker = SessionTracker::new();
        tracker.start_session("s1", Problem::new("p1", "desc"));
        for i in 0..5 {
            let mut step = ReasoningStep::new(format!("tool_{i}"));
            step.confidence = if i % 2 == 0 { 0.95 } else { 0.1 };
            step.success = i != 2;
            tracker.record_step("s1", step);
        }
        let traj = tracker.complete_session("s1", outcome(OutcomeStatus::Partial)).unwrap();
        let q = &traj.quality;
        for v in [q.overall, q.efficiency, q.coherence, q.completeness, q.innovation, q.reliability] {
            assert!((0.0..=1.0).contains(&v), "score out of range: {v}");
        }
    }

    #[test]
    fn success_score_rewards_successful_confident_outcomes() {
        let tracker = SessionTracker::new();
        tracker.start_session("s1", Problem::new("p1", "desc"));
        tracker.record_step("s1", ReasoningStep::new("solve"));
        let traj = tracker.complete_session("s1", outcome(OutcomeStatus::Success)).unwrap();
        assert!(traj.success_score > 0.5);
    }

    #[test]
    fn tags_are_sorted_deduped_and_include_status() {
        let tracker = SessionTracker::new();
        let mut problem = Problem::new("p1", "desc");
        problem.domain = "logic".into();
        tracker.start_session("s1", problem);
        tracker.record_step("s1", ReasoningStep::new("solve"));
        let traj = tracker.complete_session("s1", outcome(OutcomeStatus::Success)).unwrap();
        assert!(traj.tags.contains(&"logic".to_string()));
        assert!(traj.tags.contains(&"success".to_string()));
        let mut sorted = traj.tags.clone();
        sorted.sort();
        assert_eq!(traj.tags, sorted);
    }
}
