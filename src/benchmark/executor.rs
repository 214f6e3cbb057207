//! Executors (C11): turn a [`Problem`] into a [`ProblemResult`].
//!
//! [`DirectExecutor`] applies a handful of category-specific heuristics
//! directly. [`RLExecutor`] wraps any executor with a
//! [`ThompsonSelector`], picking a strategy per problem and feeding the
//! outcome back as bandit feedback — the RL-aware path spec §4.9 step 5
//! expects a benchmark run to exercise.

use std::collections::HashMap;

use miette::Diagnostic;
use thiserror::Error;

use crate::problem::{Problem, ProblemResult, RlAggregates};
use crate::selector::{SelectorError, Strategy, ThompsonSelector};

#[derive(Debug, Error, Diagnostic)]
pub enum ExecutorError {
    #[error("executor failed: {0}")]
    #[diagnostic(code(noesis::executor::failed))]
    Failed(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Selector(#[from] SelectorError),
}

pub type ExecutorResult<T> = std::result::Result<T, ExecutorError>;

/// Executes a single problem and returns a result. Implementations
/// that track reinforcement-learning state across a run override
/// `rl_aggregates`; the default produces no RL section.
pub trait Executor: Send + Sync {
    fn execute(&self, problem: &Problem) -> ExecutorResult<ProblemResult>;

    fn rl_aggregates(&self, _results: &[ProblemResult]) -> Option<RlAggregates> {
        None
    }
}

/// A direct, heuristic executor: no learned strategy, just per-category
/// reasoning shortcuts good enough to exercise the benchmark harness
/// and evaluators end to end.
pub struct DirectExecutor;

impl DirectExecutor {
    pub fn new() -> Self {
        Self
    }

    fn solve(&self, problem: &Problem) -> (String, f64) {
        match problem.category.as_str() {
            "disjunctive-syllogism" => solve_disjunctive_syllogism(problem),
            "bayes" => solve_bayes(problem),
            "causal" => solve_causal(problem),
            _ => (problem.description.clone(), 0.3),
        }
    }
}

impl Default for DirectExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for DirectExecutor {
    fn execute(&self, problem: &Problem) -> ExecutorResult<ProblemResult> {
        let (response, raw_score) = self.solve(problem);
        let confidence = 0.5 + 0.4 * raw_score;
        Ok(ProblemResult {
            problem_id: problem.id.clone(),
            correct: false, // filled in by the evaluator
            score: raw_score,
            confidence: confidence.clamp(0.0, 1.0),
            latency: std::time::Duration::ZERO, // filled in by run_suite
            mode: "direct".to_string(),
            response,
            tokens: estimate_tokens(&problem.description),
            error: None,
            metadata: Default::default(),
        })
    }
}

/// Resolve a disjunctive syllogism (`P or Q`, `not P` implies `Q`) from
/// the problem's input fields `options` and `eliminated`.
fn solve_disjunctive_syllogism(problem: &Problem) -> (String, f64) {
    let options = problem.input.get("options").and_then(|v| v.as_list());
    let eliminated = problem.input.get("eliminated").and_then(|v| v.as_str());

    match (options, eliminated) {
        (Some(options), Some(eliminated)) => {
            let remaining: Vec<&str> = options
                .iter()
                .filter_map(|v| v.as_str())
                .filter(|o| *o != eliminated)
                .collect();
            if remaining.len() == 1 {
                (remaining[0].to_string(), 0.9)
            } else {
                ("indeterminate".to_string(), 0.2)
            }
        }
        _ => ("indeterminate".to_string(), 0.1),
    }
}

/// Apply a Bayes update given a `prior` and either (a) `sensitivity` and
/// `specificity` for a diagnostic test, honoring `test_positive` to
/// handle a negative result as well as a positive one, or (b) a directly
/// supplied `likelihood`/`evidence` pair as a base-rate heuristic fallback
/// for callers that have already done their own evidence accounting.
fn solve_bayes(problem: &Problem) -> (String, f64) {
    let prior = problem.input.get("prior").and_then(|v| v.as_f64());
    let sensitivity = problem.input.get("sensitivity").and_then(|v| v.as_f64());
    let specificity = problem.input.get("specificity").and_then(|v| v.as_f64());

    if let (Some(prior), Some(sensitivity), Some(specificity)) = (prior, sensitivity, specificity) {
        let test_positive = problem.input.get("test_positive").and_then(|v| v.as_bool()).unwrap_or(true);
        let (likelihood, evidence) = if test_positive {
            (sensitivity, sensitivity * prior + (1.0 - specificity) * (1.0 - prior))
        } else {
            (1.0 - sensitivity, (1.0 - sensitivity) * prior + specificity * (1.0 - prior))
        };
        if evidence > 0.0 {
            let posterior = (likelihood * prior) / evidence;
            return (format!("{:.4}", posterior.clamp(0.0, 1.0)), 0.85);
        }
    }

    let likelihood = problem.input.get("likelihood").and_then(|v| v.as_f64());
    let evidence = problem.input.get("evidence").and_then(|v| v.as_f64());
    match (prior, likelihood, evidence) {
        (Some(prior), Some(likelihood), Some(evidence)) if evidence > 0.0 => {
            let posterior = (likelihood * prior) / evidence;
            (format!("{:.4}", posterior.clamp(0.0, 1.0)), 0.85)
        }
        _ => ("0.5000".to_string(), 0.1),
    }
}

/// Match candidate causes against metadata hints that distinguish
/// causation from mere correlation: a `confounder` discounts a candidate
/// sharply, `reverse_causation` discounts it moderately, a `feedback_loop`
/// is noted but not disqualifying, and `evidence_count` breaks remaining
/// ties in favor of the better-attested candidate. Candidates without any
/// hints fall back to their `strength` field.
fn solve_causal(problem: &Problem) -> (String, f64) {
    let candidates = problem.input.get("candidates").and_then(|v| v.as_list());
    let candidates = match candidates {
        Some(c) if !c.is_empty() => c,
        _ => return ("unknown".to_string(), 0.1),
    };

    let scored: Vec<(&str, f64)> = candidates
        .iter()
        .filter_map(|v| v.as_map())
        .filter_map(|m| {
            let name = m.get("name").and_then(|v| v.as_str())?;
            let strength = m.get("strength").and_then(|v| v.as_f64()).unwrap_or(0.5);
            let confounder = m.get("confounder").and_then(|v| v.as_bool()).unwrap_or(false);
            let reverse_causation = m.get("reverse_causation").and_then(|v| v.as_bool()).unwrap_or(false);
            let evidence_count = m.get("evidence_count").and_then(|v| v.as_f64()).unwrap_or(0.0);

            let mut score = strength;
            if confounder {
                score *= 0.3;
            }
            if reverse_causation {
                score *= 0.5;
            }
            score += (evidence_count / 100.0).min(0.1);
            Some((name, score))
        })
        .collect();

    match scored.into_iter().max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)) {
        Some((name, score)) => {
            let best_candidate = candidates.iter().filter_map(|v| v.as_map()).find(|m| m.get("name").and_then(|v| v.as_str()) == Some(name));
            let flagged = best_candidate
                .map(|m| {
                    m.get("confounder").and_then(|v| v.as_bool()).unwrap_or(false)
                        || m.get("reverse_causation").and_then(|v| v.as_bool()).unwrap_or(false)
                        || m.get("feedback_loop").and_then(|v| v.as_bool()).unwrap_or(false)
                })
                .unwrap_or(false);
            let confidence = if flagged { score.clamp(0.0, 1.0) * 0.6 } else { score.clamp(0.0, 1.0) };
            (name.to_string(), confidence.clamp(0.0, 0.95))
        }
        None => ("unknown".to_string(), 0.2),
    }
}

/// A rough token estimate of one character per `1/4` token, matching
/// the approximation most tokenizers land near for English prose.
fn estimate_tokens(text: &str) -> u64 {
    (text.len() / 4) as u64
}

/// Outcome-feedback threshold: a result scoring at or above this value
/// counts as a bandit success.
const DEFAULT_SUCCESS_THRESHOLD: f64 = 0.7;

/// Wraps an inner executor with Thompson-sampling strategy selection:
/// each strategy maps to a distinct inner executor, one is sampled per
/// problem, and the result's score (once the evaluator has judged it —
/// approximated here via `result.score` before that judgment) feeds
/// back into the selector.
pub struct RLExecutor {
    selector: ThompsonSelector,
    strategies: HashMap<String, Box<dyn Executor>>,
    success_threshold: f64,
}

impl RLExecutor {
    pub fn new() -> Self {
        Self {
            selector: ThompsonSelector::new(),
            strategies: HashMap::new(),
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
        }
    }

    pub fn with_success_threshold(mut self, threshold: f64) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn register_strategy(mut self, id: impl Into<String>, executor: Box<dyn Executor>) -> Self {
        let id = id.into();
        self.selector.add_strategy(Strategy::new(id.clone()));
        self.strategies.insert(id, executor);
        self
    }
}

impl Default for RLExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for RLExecutor {
    fn execute(&self, problem: &Problem) -> ExecutorResult<ProblemResult> {
        let chosen = self.selector.select_strategy()?;
        let executor = self
            .strategies
            .get(&chosen.id)
            .ok_or_else(|| ExecutorError::Failed(format!("no executor registered for strategy {}", chosen.id)))?;

        let mut result = executor.execute(problem)?;
        result.mode = chosen.id.clone();

        let success = result.score >= self.success_threshold;
        self.selector.record_outcome(&chosen.id, success)?;
        Ok(result)
    }

    fn rl_aggregates(&self, results: &[ProblemResult]) -> Option<RlAggregates> {
        let mut strategy_distribution: HashMap<String, u64> = HashMap::new();
        for r in results {
            *strategy_distribution.entry(r.mode.clone()).or_insert(0) += 1;
        }

        let window = (results.len() / 10).max(1);
        let learning_curve: Vec<f64> = results
            .chunks(window)
            .map(|chunk| chunk.iter().filter(|r| r.correct).count() as f64 / chunk.len() as f64)
            .collect();
        let initial_accuracy = learning_curve.first().copied().unwrap_or(0.0);
        let final_accuracy = learning_curve.last().copied().unwrap_or(0.0);

        let total = results.len().max(1) as f64;
        let exploration_rate = {
            let counts: Vec<u64> = strategy_distribution.values().copied().collect();
            let max_count = counts.iter().copied().max().unwrap_or(0) as f64;
            1.0 - (max_count / total)
        };

        let entropy = shannon_entropy(&strategy_distribution, total);

        Some(RlAggregates {
            strategy_distribution,
            learning_curve,
            initial_accuracy,
            final_accuracy,
            improvement: final_accuracy - initial_accuracy,
            exploration_rate,
            strategy_diversity_entropy: entropy,
        })
    }
}

/// Shannon entropy (bits) of the strategy selection distribution,
/// measuring how evenly the bandit spread its choices across arms.
fn shannon_entropy(counts: &HashMap<String, u64>, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    -counts
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            if p > 0.0 {
                p * p.log2()
            } else {
                0.0
            }
        })
        .sum::<f64>()
}
