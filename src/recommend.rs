//! Recommendation engine (C6): turns similar past trajectories into
//! actionable guidance for a new problem — proven tool sequences,
//! warnings about approaches that have failed before, approaches worth
//! imitating, and optimizations worth trying.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::memory::compute_tool_sequence_hash;
use crate::problem::Problem;
use crate::trajectory::{Trajectory, TrajectoryMatch};

/// A trajectory counts as "successful" for recommendation purposes above
/// this `success_score`, and as "failed" below the low-water mark.
const SUCCESS_THRESHOLD: f64 = 0.7;
const FAILURE_THRESHOLD: f64 = 0.4;
/// A single high-success match is worth recommending as an approach on
/// its own, without needing a repeated group.
const HIGH_SUCCESS_THRESHOLD: f64 = 0.85;

/// Everything the recommendation engine needs about the current problem
/// and the candidate history to draw from.
pub struct RecommendationContext<'a> {
    pub problem: &'a Problem,
    pub matches: Vec<TrajectoryMatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationKind {
    ToolSequence,
    Warning,
    Approach,
    Optimization,
}

/// Tool-sequence-specific supporting detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSequenceDetail {
    pub confidence_range: (f64, f64),
    pub average_step_count: f64,
    pub example_problems: Vec<String>,
}

/// Warning-specific supporting detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningDetail {
    pub failure_root_cause: String,
    pub alternatives: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub description: String,
    pub reasoning: String,
    pub priority: f64,
    pub success_rate: f64,
    pub estimated_impact: f64,
    #[serde(default)]
    pub supporting_trajectory_ids: Vec<String>,
    #[serde(default)]
    pub tool_sequence_detail: Option<ToolSequenceDetail>,
    #[serde(default)]
    pub warning_detail: Option<WarningDetail>,
}

/// Partition `matches` by `success_score` (§4.6 step 1), derive
/// tool-sequence, warning, approach, and optimization recommendations,
/// and return the top 7 by priority.
pub fn generate_recommendations(ctx: &RecommendationContext) -> Vec<Recommendation> {
    let successful: Vec<&TrajectoryMatch> =
        ctx.matches.iter().filter(|m| m.trajectory.success_score > SUCCESS_THRESHOLD).collect();
    let failed: Vec<&TrajectoryMatch> =
        ctx.matches.iter().filter(|m| m.trajectory.success_score < FAILURE_THRESHOLD).collect();

    let successful_groups = group_by_tool_sequence(&successful);
    let failed_groups = group_by_tool_sequence(&failed);

    let mut recommendations = Vec::new();

    let tool_sequence_recs = tool_sequence_recommendations(&successful_groups);
    let cited: HashSet<String> = tool_sequence_recs
        .iter()
        .flat_map(|r| r.supporting_trajectory_ids.iter().cloned())
        .collect();
    recommendations.extend(tool_sequence_recs);

    recommendations.extend(warning_recommendations(&failed_groups, &successful_groups));
    recommendations.extend(approach_recommendations(&successful, &cited));

    recommendations.sort_by(|a, b| b.priority.partial_cmp(&a.priority).unwrap_or(std::cmp::Ordering::Equal));
    recommendations.truncate(7);
    recommendations
}

/// Group matches by tool-sequence hash, preserving insertion order within
/// each group.
fn group_by_tool_sequence<'a>(matches: &[&'a TrajectoryMatch]) -> HashMap<String, Vec<&'a TrajectoryMatch>> {
    let mut groups: HashMap<String, Vec<&TrajectoryMatch>> = HashMap::new();
    for &m in matches {
        let hash = compute_tool_sequence_hash(&m.trajectory.tool_sequence());
        groups.entry(hash).or_default().push(m);
    }
    groups
}

/// Each tool-sequence group with more than one member becomes a
/// recommendation with `priority = success_rate * (1 + 0.1 * usage_count)`,
/// where `success_rate` is the group's mean `success_score`.
fn tool_sequence_recommendations(groups: &HashMap<String, Vec<&TrajectoryMatch>>) -> Vec<Recommendation> {
    groups
        .iter()
        .filter(|(_, group)| group.len() > 1)
        .map(|(_, group)| {
            let usage_count = group.len() as f64;
            let success_rate = group.iter().map(|m| m.trajectory.success_score).sum::<f64>() / usage_count;
            let avg_quality = group.iter().map(|m| m.trajectory.quality.overall).sum::<f64>() / usage_count;
            let priority = (success_rate * (1.0 + 0.1 * usage_count)).min(1.0);

            let sequence = group[0].trajectory.tool_sequence();
            let description = if sequence.len() <= 3 {
                let steps: Vec<String> = sequence
                    .iter()
                    .enumerate()
                    .map(|(i, t)| format!("{}. {} ({t})", i + 1, generate_step_description(t)))
                    .collect();
                format!("This tool sequence has succeeded {usage_count} times: {}", steps.join(" -> "))
            } else {
                let first = generate_step_description(&sequence[0]);
                let last = generate_step_description(sequence.last().unwrap());
                format!(
                    "Recommended {}-step sequence that has succeeded {usage_count} times: start with {first}, then proceed through the middle steps, and conclude with {last}",
                    sequence.len()
                )
            };

            let confidences: Vec<f64> = group.iter().map(|m| m.trajectory.outcome.confidence).collect();
            let confidence_range = (
                confidences.iter().cloned().fold(f64::INFINITY, f64::min),
                confidences.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            );
            let average_step_count = group.iter().map(|m| m.trajectory.steps.len() as f64).sum::<f64>() / usage_count;
            let example_problems: Vec<String> = group
                .iter()
                .take(3)
                .map(|m| truncate(&m.trajectory.problem.description, 80))
                .collect();

            Recommendation {
                kind: RecommendationKind::ToolSequence,
                description,
                reasoning: format!(
                    "Seen {usage_count} times across similar problems with an average quality of {avg_quality:.2} and a {:.0}% success rate",
                    success_rate * 100.0
                ),
                priority,
                success_rate,
                estimated_impact: (success_rate * avg_quality).clamp(0.0, 1.0),
                supporting_trajectory_ids: group.iter().map(|m| m.trajectory.id.clone()).collect(),
                tool_sequence_detail: Some(ToolSequenceDetail { confidence_range, average_step_count, example_problems }),
                warning_detail: None,
            }
        })
        .collect()
}

/// Group failed trajectories by tool-sequence hash first, then classify
/// each group's root cause as a group-aggregate (not per-trajectory),
/// per §4.6 step 4. `priority = 0.8 * (1 + 0.05 * len(trajectories))`.
fn warning_recommendations(
    failed_groups: &HashMap<String, Vec<&TrajectoryMatch>>,
    successful_groups: &HashMap<String, Vec<&TrajectoryMatch>>,
) -> Vec<Recommendation> {
    failed_groups
        .values()
        .map(|group| {
            let trajectories: Vec<&Trajectory> = group.iter().map(|m| &m.trajectory).collect();
            let cause = classify_failure_root_cause(&trajectories);
            let priority = (0.8 * (1.0 + 0.05 * group.len() as f64)).min(1.0);
            let failed_sequence = group[0].trajectory.tool_sequence();
            let failed_tools: HashSet<&str> = failed_sequence.iter().map(String::as_str).collect();
            let alternatives = find_alternatives(&failed_tools, successful_groups);

            Recommendation {
                kind: RecommendationKind::Warning,
                description: format!(
                    "{} prior attempt(s) with this approach failed: {cause}",
                    group.len()
                ),
                reasoning: cause.clone(),
                priority,
                success_rate: 0.0,
                estimated_impact: priority,
                supporting_trajectory_ids: group.iter().map(|m| m.trajectory.id.clone()).collect(),
                tool_sequence_detail: None,
                warning_detail: Some(WarningDetail { failure_root_cause: cause, alternatives }),
            }
        })
        .collect()
}

/// Up to 3 successful tool sequences whose tool set overlaps the failed
/// group's tool set by at most half of the shorter sequence's length.
fn find_alternatives(
    failed_tools: &HashSet<&str>,
    successful_groups: &HashMap<String, Vec<&TrajectoryMatch>>,
) -> Vec<String> {
    let mut alternatives: Vec<(f64, String)> = Vec::new();
    for group in successful_groups.values() {
        let sequence = group[0].trajectory.tool_sequence();
        let candidate_tools: HashSet<&str> = sequence.iter().map(String::as_str).collect();
        let overlap = failed_tools.intersection(&candidate_tools).count() as f64;
        let shorter = failed_tools.len().min(candidate_tools.len()).max(1) as f64;
        if overlap / shorter <= 0.5 {
            let success_rate =
                group.iter().map(|m| m.trajectory.success_score).sum::<f64>() / group.len() as f64;
            let steps: Vec<String> = sequence.iter().map(|t| generate_step_description(t)).collect();
            alternatives.push((success_rate, steps.join(" -> ")));
        }
    }
    alternatives.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    alternatives.into_iter().take(3).map(|(_, desc)| desc).collect()
}

/// Every high-success match not already cited by a tool-sequence
/// recommendation becomes an approach recommendation,
/// `priority = similarity * success_score * 0.9`.
fn approach_recommendations(successful: &[&TrajectoryMatch], cited: &HashSet<String>) -> Vec<Recommendation> {
    successful
        .iter()
        .filter(|m| m.trajectory.success_score > HIGH_SUCCESS_THRESHOLD && !cited.contains(&m.trajectory.id))
        .map(|m| Recommendation {
            kind: RecommendationKind::Approach,
            description: format!(
                "Consider a \"{}\" approach, as used successfully for a similar problem",
                m.trajectory.approach.strategy
            ),
            reasoning: format!(
                "A similar problem (similarity {:.2}) was solved this way with success score {:.2}",
                m.similarity, m.trajectory.success_score
            ),
            priority: (m.similarity * m.trajectory.success_score * 0.9).min(1.0),
            success_rate: m.trajectory.success_score,
            estimated_impact: (m.similarity * m.trajectory.success_score).clamp(0.0, 1.0),
            supporting_trajectory_ids: vec![m.trajectory.id.clone()],
            tool_sequence_detail: None,
            warning_detail: None,
        })
        .collect()
}

/// Map a raw tool name to a human-readable step description, for
/// presenting recommended tool sequences.
pub fn generate_step_description(tool: &str) -> String {
    match tool {
        "checkpoint_create" => "save a checkpoint".to_string(),
        "checkpoint_restore" => "restore a prior checkpoint".to_string(),
        "analyze" => "analyze the problem".to_string(),
        "conclude" => "draw a conclusion".to_string(),
        "thought" => "record a reasoning step".to_string(),
        other => format!("invoke \"{other}\""),
    }
}

/// Classify why a *group* of trajectories sharing a tool sequence failed
/// (§4.6 step 4), applying the ordered aggregate rules rather than
/// inspecting any single trajectory in isolation: shallow analysis, a
/// missing validation step, widespread low confidence, a repeated error,
/// or — absent any of those signals — a poor fit between approach and
/// problem.
pub fn classify_failure_root_cause(group: &[&Trajectory]) -> String {
    let n = group.len().max(1) as f64;

    let shallow = group.iter().filter(|t| t.steps.len() < 3).count() as f64;
    if shallow / n > 0.5 {
        return "insufficient analysis depth — most attempts used fewer than 3 steps".to_string();
    }

    let lacks_validation = group
        .iter()
        .filter(|t| !t.steps.iter().any(|s| s.tool.contains("validate") || s.tool.contains("self-evaluate")))
        .count() as f64;
    if lacks_validation / n > 0.6 {
        return "missing a validation or self-evaluation step before concluding".to_string();
    }

    let low_confidence = group.iter().filter(|t| t.outcome.confidence < 0.5).count() as f64;
    if low_confidence / n > 0.5 {
        return "low confidence in the final answer across attempts".to_string();
    }

    let mut error_counts: HashMap<&str, usize> = HashMap::new();
    for t in group {
        for step in &t.steps {
            if let Some(error) = &step.error {
                *error_counts.entry(error.as_str()).or_insert(0) += 1;
            }
        }
    }
    if let Some((error, count)) = error_counts.into_iter().max_by_key(|(_, count)| *count) {
        if count as f64 / n > 0.3 {
            return format!("a common error recurs in over 30% of attempts: \"{error}\"");
        }
    }

    "this approach may not fit this problem type".to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::{Approach, Outcome, OutcomeStatus, QualityMetrics};
    use std::time::Duration;

    fn trajectory(id: &str, status: OutcomeStatus, tools: &[&str]) -> Trajectory {
        Trajectory {
            id: id.to_string(),
            problem: Problem::new(format!("p_{id}"), "desc"),
            approach: Approach {
                strategy: "systematic-linear".into(),
                modes_used: Vec::new(),
                tool_sequence: tools.iter().map(|s| s.to_string()).collect(),
                key_decisions: Vec::new(),
            },
            steps: tools
                .iter()
                .map(|t| {
                    let mut s = crate::trajectory::ReasoningStep::new(*t);
                    s.success = status != OutcomeStatus::Failure;
                    if status == OutcomeStatus::Failure {
                        s.error = Some("timeout waiting for response".to_string());
                    }
                    s
                })
                .collect(),
            outcome: Outcome {
                status,
                goals_achieved: Vec::new(),
                goals_failed: Vec::new(),
                goals: None,
                confidence: if status == OutcomeStatus::Failure { 0.2 } else { 0.9 },
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
    fn recommendations_are_capped_at_seven() {
        let problem = Problem::new("p", "desc");
        let matches: Vec<TrajectoryMatch> = (0..20)
            .map(|i| TrajectoryMatch {
                trajectory: trajectory(&format!("t{i}"), OutcomeStatus::Success, &["analyze", "conclude"]),
                similarity: 0.9,
            })
            .collect();
        let ctx = RecommendationContext { problem: &problem, matches };
        let recs = generate_recommendations(&ctx);
        assert!(recs.len() <= 7);
    }

    #[test]
    fn repeated_successful_sequence_becomes_tool_sequence_recommendation() {
        let problem = Problem::new("p", "desc");
        let matches = vec![
            TrajectoryMatch { trajectory: trajectory("t1", OutcomeStatus::Success, &["analyze", "conclude"]), similarity: 0.9 },
            TrajectoryMatch { trajectory: trajectory("t2", OutcomeStatus::Success, &["analyze", "conclude"]), similarity: 0.8 },
        ];
        let ctx = RecommendationContext { problem: &problem, matches };
        let recs = generate_recommendations(&ctx);
        let rec = recs.iter().find(|r| r.kind == RecommendationKind::ToolSequence).unwrap();
        assert!((rec.success_rate - 0.9).abs() < 1e-9);
    }

    #[test]
    fn failed_trajectories_produce_warnings_grouped_by_tool_sequence() {
        let problem = Problem::new("p", "desc");
        let matches = vec![
            TrajectoryMatch { trajectory: trajectory("t1", OutcomeStatus::Failure, &["analyze"]), similarity: 0.9 },
            TrajectoryMatch { trajectory: trajectory("t2", OutcomeStatus::Failure, &["analyze"]), similarity: 0.8 },
        ];
        let ctx = RecommendationContext { problem: &problem, matches };
        let recs = generate_recommendations(&ctx);
        let warning = recs.iter().find(|r| r.kind == RecommendationKind::Warning).unwrap();
        assert!(warning.description.contains('2'));
        assert!(warning.warning_detail.is_some());
    }

    #[test]
    fn root_cause_flags_shallow_groups() {
        let t1 = trajectory("t1", OutcomeStatus::Failure, &["call_tool"]);
        let t2 = trajectory("t2", OutcomeStatus::Failure, &["call_tool"]);
        let group = vec![&t1, &t2];
        assert!(classify_failure_root_cause(&group).contains("insufficient analysis depth"));
    }

    #[test]
    fn root_cause_flags_missing_validation_when_not_shallow() {
        let t1 = trajectory("t1", OutcomeStatus::Failure, &["analyze", "plan", "act"]);
        let mut t2 = trajectory("t2", OutcomeStatus::Failure, &["analyze", "plan", "act"]);
        t2.outcome.confidence = 0.2;
        let group = vec![&t1, &t2];
        assert!(classify_failure_root_cause(&group).contains("validation"));
    }

    #[test]
    fn mid_success_trajectories_are_excluded_from_both_buckets() {
        let problem = Problem::new("p", "desc");
        let mut mid = trajectory("t1", OutcomeStatus::Partial, &["analyze"]);
        mid.success_score = 0.5;
        let matches = vec![TrajectoryMatch { trajectory: mid, similarity: 0.9 }];
        let ctx = RecommendationContext { problem: &problem, matches };
        let recs = generate_recommendations(&ctx);
        assert!(recs.is_empty());
    }
}
