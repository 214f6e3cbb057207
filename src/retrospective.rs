//! Retrospective analysis (C7): per-trajectory strengths, weaknesses,
//! and improvement suggestions derived from its quality metrics, with
//! an optional percentile comparison against a reference population.

use serde::{Deserialize, Serialize};

use crate::trajectory::{QualityMetrics, Trajectory};

/// Per-metric (strong_threshold, weak_threshold) pairs. A score at or
/// above `strong` is a strength, below `weak` is a weakness; scores in
/// between are neither, which is why efficiency's two thresholds
/// coincide — it has no neutral band.
const EFFICIENCY_THRESHOLDS: (f64, f64) = (0.8, 0.8);
const COHERENCE_THRESHOLDS: (f64, f64) = (0.7, 0.5);
const COMPLETENESS_THRESHOLDS: (f64, f64) = (0.8, 0.5);
const INNOVATION_THRESHOLDS: (f64, f64) = (0.6, 0.3);
const RELIABILITY_THRESHOLDS: (f64, f64) = (0.8, 0.5);

const MAX_COMPARISON_POPULATION: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparativeAnalysis {
    pub percentile: f64,
    pub population_size: usize,
    pub average_success_score: f64,
    pub average_tool_count: f64,
    pub tool_count_diff: f64,
    pub success_score_diff: f64,
}

/// A categorical read of one quality metric, with the score it was
/// derived from and actionable follow-up suggestions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricAssessment {
    pub score: f64,
    pub assessment: String,
    pub explanation: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedMetrics {
    pub efficiency: MetricAssessment,
    pub coherence: MetricAssessment,
    pub completeness: MetricAssessment,
    pub innovation: MetricAssessment,
    pub reliability: MetricAssessment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Improvement {
    pub category: String,
    pub suggestion: String,
    pub priority: f64,
}

/// A retrospective report. List fields default to empty rather than
/// null so a caller serializing this never has to special-case absence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrospectiveAnalysis {
    pub trajectory_id: String,
    pub summary: String,
    pub overall_assessment: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<Improvement>,
    #[serde(default)]
    pub comparative_analysis: Option<ComparativeAnalysis>,
    pub detailed_metrics: DetailedMetrics,
}

fn assess(name: &str, score: f64, thresholds: (f64, f64)) -> (&'static str, Option<String>, Option<Improvement>) {
    let (strong, weak) = thresholds;
    if score >= strong {
        ("strong", Some(format!("Strong {name} ({score:.2})")), None)
    } else if score < weak {
        let suggestion = improvement_for(name);
        (
            "weak",
            Some(format!("Weak {name} ({score:.2})")),
            Some(Improvement {
                category: category_for(name).to_string(),
                suggestion,
                priority: 1.0 - score,
            }),
        )
    } else {
        ("adequate", None, None)
    }
}

fn metric_assessment(name: &str, score: f64, thresholds: (f64, f64)) -> MetricAssessment {
    let (label, _, improvement) = assess(name, score, thresholds);
    let explanation = match label {
        "strong" => format!("{name} is performing well at {score:.2}"),
        "weak" => format!("{name} is underperforming at {score:.2}"),
        _ => format!("{name} is in an acceptable range at {score:.2}"),
    };
    MetricAssessment {
        score,
        assessment: label.to_string(),
        explanation,
        suggestions: improvement.map(|i| vec![i.suggestion]).unwrap_or_default(),
    }
}

fn overall_assessment_label(success_score: f64) -> &'static str {
    if success_score >= 0.8 {
        "excellent"
    } else if success_score >= 0.6 {
        "good"
    } else if success_score >= 0.4 {
        "fair"
    } else {
        "poor"
    }
}

/// Build a retrospective for `trajectory`. `population` is an optional
/// slice of peer trajectories (same domain, typically) used to compute
/// a percentile comparison; pass an empty slice to skip it. Only the
/// first 20 entries are used, mirroring the bound on a real similarity
/// lookup against the episodic store.
pub fn analyze(trajectory: &Trajectory, population: &[Trajectory]) -> RetrospectiveAnalysis {
    let q = &trajectory.quality;

    let mut strengths = Vec::new();
    let mut weaknesses = Vec::new();
    let mut improvements = Vec::new();

    let named_scores: [(&str, f64, (f64, f64)); 5] = [
        ("efficiency", q.efficiency, EFFICIENCY_THRESHOLDS),
        ("coherence", q.coherence, COHERENCE_THRESHOLDS),
        ("completeness", q.completeness, COMPLETENESS_THRESHOLDS),
        ("innovation", q.innovation, INNOVATION_THRESHOLDS),
        ("reliability", q.reliability, RELIABILITY_THRESHOLDS),
    ];

    for (name, score, thresholds) in named_scores {
        let (label, message, improvement) = assess(name, score, thresholds);
        match label {
            "strong" => strengths.push(message.unwrap()),
            "weak" => {
                weaknesses.push(message.unwrap());
                improvements.push(improvement.unwrap());
            }
            _ => {}
        }
    }

    if q.fallacy_count > 3 {
        weaknesses.push(format!("{} logical fallacy(ies) detected", q.fallacy_count));
        improvements.push(Improvement {
            category: "quality".into(),
            suggestion: "Review intermediate conclusions for unsupported logical leaps".into(),
            priority: (q.fallacy_count as f64 / 10.0).min(1.0),
        });
    }
    if q.contradiction_count > 2 {
        weaknesses.push(format!("{} internal contradiction(s) detected", q.contradiction_count));
        improvements.push(Improvement {
            category: "quality".into(),
            suggestion: "Cross-check later steps against earlier conclusions".into(),
            priority: (q.contradiction_count as f64 / 10.0).min(1.0),
        });
    }
    if q.bias > 0.5 {
        weaknesses.push(format!("Elevated bias detected ({:.2})", q.bias));
        improvements.push(Improvement {
            category: "quality".into(),
            suggestion: "Seek disconfirming evidence before committing to a conclusion".into(),
            priority: q.bias,
        });
    }

    if !trajectory.steps.is_empty() {
        let total = trajectory.steps.len() as f64;
        let successful = trajectory.steps.iter().filter(|s| s.success).count() as f64;
        let step_success_rate = successful / total;
        let failure_fraction = 1.0 - step_success_rate;
        if step_success_rate >= 0.9 {
            strengths.push(format!("High step success rate ({:.0}%)", step_success_rate * 100.0));
        } else if failure_fraction > 0.25 {
            weaknesses.push(format!("{:.0}% of steps failed", failure_fraction * 100.0));
            improvements.push(Improvement {
                category: "tools".into(),
                suggestion: "Investigate the tools behind failing steps and address the root cause".into(),
                priority: failure_fraction,
            });
        }
    }

    if strengths.is_empty() && weaknesses.is_empty() {
        strengths.push("Balanced performance across all tracked dimensions".to_string());
    }

    improvements.sort_by(|a, b| b.priority.partial_cmp(&a.priority).unwrap_or(std::cmp::Ordering::Equal));

    let population = &population[..population.len().min(MAX_COMPARISON_POPULATION)];
    let comparative_analysis = if population.is_empty() {
        None
    } else {
        let better_than = population.iter().filter(|t| trajectory.success_score > t.success_score).count();
        let worse_than = population.iter().filter(|t| trajectory.success_score < t.success_score).count();
        let percentile = if better_than + worse_than == 0 {
            50.0
        } else {
            better_than as f64 / (better_than + worse_than) as f64 * 100.0
        };
        let average_success_score =
            population.iter().map(|t| t.success_score).sum::<f64>() / population.len() as f64;
        let average_tool_count = population.iter().map(|t| t.approach.tool_sequence.len() as f64).sum::<f64>()
            / population.len() as f64;
        let tool_count_diff = trajectory.approach.tool_sequence.len() as f64 - average_tool_count;
        let success_score_diff = trajectory.success_score - average_success_score;
        Some(ComparativeAnalysis {
            percentile,
            population_size: population.len(),
            average_success_score,
            average_tool_count,
            tool_count_diff,
            success_score_diff,
        })
    };

    let overall_assessment = overall_assessment_label(trajectory.success_score).to_string();
    let summary = format!(
        "Session for \"{}\" was {overall_assessment} ({:.2} overall, {} strength(s), {} weakness(es)).",
        trajectory.problem.id,
        q.overall,
        strengths.len(),
        weaknesses.len()
    );

    let detailed_metrics = DetailedMetrics {
        efficiency: metric_assessment("efficiency", q.efficiency, EFFICIENCY_THRESHOLDS),
        coherence: metric_assessment("coherence", q.coherence, COHERENCE_THRESHOLDS),
        completeness: metric_assessment("completeness", q.completeness, COMPLETENESS_THRESHOLDS),
        innovation: metric_assessment("innovation", q.innovation, INNOVATION_THRESHOLDS),
        reliability: metric_assessment("reliability", q.reliability, RELIABILITY_THRESHOLDS),
    };

    RetrospectiveAnalysis {
        trajectory_id: trajectory.id.clone(),
        summary,
        overall_assessment,
        strengths,
        weaknesses,
        improvements,
        comparative_analysis,
        detailed_metrics,
    }
}

fn category_for(dimension: &str) -> &'static str {
    match dimension {
        "efficiency" => "efficiency",
        "reliability" => "quality",
        _ => "approach",
    }
}

fn improvement_for(dimension: &str) -> String {
    match dimension {
        "efficiency" => "Reduce redundant tool calls and prefer the shortest path to a conclusion".to_string(),
        "coherence" => "Keep confidence stable across steps rather than oscillating".to_string(),
        "completeness" => "Revisit unmet goals before declaring the session complete".to_string(),
        "innovation" => "Vary the toolset used rather than repeating the same tool".to_string(),
        "reliability" => "Investigate why steps are failing and address the root cause".to_string(),
        other => format!("Improve {other}"),
    }
}
