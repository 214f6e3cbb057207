//! Learning engine (C8): periodically groups trajectories by problem
//! signature and extracts the approach pattern shared by their
//! successful members, so the recommendation engine has more than raw
//! trajectory matches to draw from.
//!
//! Structured the way the teacher's forward-chaining rule engine runs
//! to a fixpoint or iteration cap over a batch: a `LearningEngineConfig`
//! bounds the work, and `run` returns a result carrying per-group stats
//! alongside the derived patterns, rather than mutating shared state as
//! a side effect.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::memory::signature::ProblemSignature;
use crate::trajectory::{OutcomeStatus, Trajectory};

#[derive(Debug, Clone)]
pub struct LearningEngineConfig {
    /// A signature group needs at least this many trajectories before a
    /// pattern is extracted from it.
    pub min_group_size: usize,
    /// A candidate step is kept in the extracted pattern only if at
    /// least this fraction of the group's successful trajectories took
    /// it at the same position.
    pub min_step_agreement: f64,
    /// Hard cap on how many trajectories one run considers, applied
    /// after grouping so every processed group still sees its full
    /// membership.
    pub max_trajectories: usize,
    /// A group's successful fraction must reach this before a pattern
    /// is extracted from it at all — a group that is mostly failures
    /// has nothing worth generalizing into a pattern.
    pub min_success_rate: f64,
}

impl Default for LearningEngineConfig {
    fn default() -> Self {
        Self {
            min_group_size: 3,
            min_step_agreement: 0.6,
            max_trajectories: 10_000,
            min_success_rate: 0.6,
        }
    }
}

/// A pattern extracted from a signature group's successful members: the
/// tool sequence positions where most of the group agreed, plus the
/// group's overall success rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub signature_hash: String,
    pub domain: String,
    pub problem_type: String,
    pub group_size: usize,
    pub success_rate: f64,
    pub common_steps: Vec<String>,
    pub average_success_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct LearningRunResult {
    pub patterns: Vec<LearnedPattern>,
    pub groups_considered: usize,
    pub groups_skipped_too_small: usize,
}

pub struct LearningEngine {
    config: LearningEngineConfig,
}

impl LearningEngine {
    pub fn new(config: LearningEngineConfig) -> Self {
        Self { config }
    }

    /// Group `trajectories` by [`ProblemSignature`] hash and extract a
    /// [`LearnedPattern`] from each group large enough to be
    /// meaningful. Groups below `min_group_size` are counted but
    /// skipped, not treated as an error — a sparse history is the
    /// normal state early in a deployment's life.
    pub fn run(&self, trajectories: &[Trajectory]) -> LearningRunResult {
        let considered = &trajectories[..trajectories.len().min(self.config.max_trajectories)];

        let mut groups: HashMap<String, (ProblemSignature, Vec<&Trajectory>)> = HashMap::new();
        for trajectory in considered {
            let signature = ProblemSignature::compute(&trajectory.problem, &trajectory.tags);
            groups
                .entry(signature.hash.clone())
                .or_insert_with(|| (signature, Vec::new()))
                .1
                .push(trajectory);
        }

        let mut result = LearningRunResult::default();
        for (hash, (signature, group)) in groups {
            result.groups_considered += 1;
            if group.len() < self.config.min_group_size {
                result.groups_skipped_too_small += 1;
                continue;
            }
            if let Some(pattern) = self.extract_pattern(&hash, &signature, &group) {
                result.patterns.push(pattern);
            }
        }

        result.patterns.sort_by(|a, b| {
            b.success_rate
                .partial_cmp(&a.success_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        result
    }

    fn extract_pattern(
        &self,
        hash: &str,
        signature: &ProblemSignature,
        group: &[&Trajectory],
    ) -> Option<LearnedPattern> {
        let successful: Vec<&&Trajectory> = group
            .iter()
            .filter(|t| t.success_score >= self.config.min_success_rate)
            .collect();
        if successful.is_empty() {
            return None;
        }

        let success_rate = successful.len() as f64 / group.len() as f64;
        if success_rate < self.config.min_success_rate {
            return None;
        }
        let average_success_score =
            successful.iter().map(|t| t.success_score).sum::<f64>() / successful.len() as f64;

        let max_len = successful.iter().map(|t| t.steps.len()).max().unwrap_or(0);
        let mut common_steps = Vec::new();
        for position in 0..max_len {
            let mut votes: HashMap<&str, usize> = HashMap::new();
            for t in &successful {
                if let Some(step) = t.steps.get(position) {
                    *votes.entry(step.tool.as_str()).or_insert(0) += 1;
                }
            }
            if let Some((tool, count)) = votes.into_iter().max_by_key(|(_, count)| *count) {
                if count as f64 / successful.len() as f64 >= self.config.min_step_agreement {
                    common_steps.push(tool.to_string());
                }
            }
        }

        Some(LearnedPattern {
            signature_hash: hash.to_string(),
            domain: signature.domain.clone(),
            problem_type: signature.problem_type.clone(),
            group_size: group.len(),
            success_rate,
            common_steps,
            average_success_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Problem;
    use crate::trajectory::{Approach, Outcome, QualityMetrics, ReasoningStep};
    use std::time::Duration;

    fn trajectory(id: &str, status: OutcomeStatus, steps: &[&str]) -> Trajectory {
        let mut problem = Problem::new(format!("p_{id}"), "disjunctive syllogism about weather");
        problem.domain = "logic".into();
        problem.problem_type = "deduction".into();
        problem.complexity = 0.5;
        Trajectory {
            id: id.to_string(),
            problem,
            approach: Approach {
                strategy: "systematic-linear".into(),
                modes_used: Vec::new(),
                tool_sequence: steps.iter().map(|s| s.to_string()).collect(),
                key_decisions: Vec::new(),
            },
            steps: steps.iter().map(|s| ReasoningStep::new(*s)).collect(),
            outcome: Outcome {
                status,
                goals_achieved: Vec::new(),
                goals_failed: Vec::new(),
                goals: None,
                confidence: 0.9,
                solution: String::new(),
            },
            quality: QualityMetrics::default(),
            tags: Vec::new(),
            domain: "logic".into(),
            complexity: 0.5,
            success_score: if status == OutcomeStatus::Success { 0.9 } else { 0.1 },
            duration: Duration::from_secs(1),
            created_at: 0,
        }
    }

    #[test]
    fn groups_below_min_size_are_skipped() {
        let engine = LearningEngine::new(LearningEngineConfig::default());
        let trajectories = vec![trajectory("t1", OutcomeStatus::Success, &["analyze", "conclude"])];
        let result = engine.run(&trajectories);
        assert!(result.patterns.is_empty());
        assert_eq!(result.groups_skipped_too_small, 1);
    }

    #[test]
    fn common_steps_require_agreement_threshold() {
        let engine = LearningEngine::new(LearningEngineConfig::default());
        let trajectories = vec![
            trajectory("t1", OutcomeStatus::Success, &["analyze", "conclude"]),
            trajectory("t2", OutcomeStatus::Success, &["analyze", "verify"]),
            trajectory("t3", OutcomeStatus::Success, &["analyze", "check"]),
        ];
        let result = engine.run(&trajectories);
        assert_eq!(result.patterns.len(), 1);
        let pattern = &result.patterns[0];
        assert_eq!(pattern.common_steps[0], "analyze");
        assert_eq!(pattern.common_steps.len(), 1); // position 1 splits 1/1/1, below 0.6 of 3
    }

    #[test]
    fn groups_with_no_successes_produce_no_pattern() {
        let engine = LearningEngine::new(LearningEngineConfig::default());
        let trajectories = vec![
            trajectory("t1", OutcomeStatus::Failure, &["analyze"]),
            trajectory("t2", OutcomeStatus::Failure, &["analyze"]),
            trajectory("t3", OutcomeStatus::Failure, &["analyze"]),
        ];
        let result = engine.run(&trajectories);
        assert!(result.patterns.is_empty());
    }
}
