//! Thompson-sampling strategy selector: a multi-armed bandit over named
//! reasoning strategies with Bayesian posterior updates from outcome
//! feedback.
//!
//! One `RwLock` guards the whole strategy map. `select_strategy` and
//! `get_strategy_distribution` take a read lock while they draw samples;
//! `add_strategy`, `record_outcome`, and `reset_strategy` take the write
//! lock. The selector owns the RNG that backs every draw — no outside
//! code samples from it directly, which keeps selection reproducible
//! under a fixed seed even though callers never see the RNG.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use miette::Diagnostic;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sampling::sample_beta;

/// Errors from the strategy selector.
#[derive(Debug, Error, Diagnostic)]
pub enum SelectorError {
    #[error("unknown strategy: \"{id}\"")]
    #[diagnostic(
        code(noesis::selector::unknown_strategy),
        help("Register the strategy with `add_strategy` before recording an outcome for it.")
    )]
    UnknownStrategy { id: String },

    #[error("no active strategies registered")]
    #[diagnostic(
        code(noesis::selector::no_active_strategies),
        help("Call `add_strategy` at least once, or re-activate an existing strategy.")
    )]
    NoActiveStrategies,
}

pub type SelectorResult<T> = std::result::Result<T, SelectorError>;

/// A named reasoning strategy with a Beta(alpha, beta) posterior over its
/// success probability.
///
/// Invariant: `alpha >= 1 && beta >= 1` after any update, and
/// `total_successes <= total_trials`, always.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub alpha: f64,
    pub beta: f64,
    pub total_trials: u64,
    pub total_successes: u64,
    pub is_active: bool,
}

impl Strategy {
    /// Register a fresh strategy with a uniform Beta(1, 1) prior.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alpha: 1.0,
            beta: 1.0,
            total_trials: 0,
            total_successes: 0,
            is_active: true,
        }
    }

    /// Empirical success rate, 0 when no trials have been recorded.
    pub fn success_rate(&self) -> f64 {
        if self.total_trials == 0 {
            0.0
        } else {
            self.total_successes as f64 / self.total_trials as f64
        }
    }
}

/// Read-only snapshot of a strategy's posterior, for observability
/// (dashboards, tests) without holding the selector's lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySnapshot {
    pub id: String,
    pub alpha: f64,
    pub beta: f64,
    pub mean: f64,
    pub total_trials: u64,
    pub total_successes: u64,
    pub is_active: bool,
}

impl From<&Strategy> for StrategySnapshot {
    fn from(s: &Strategy) -> Self {
        Self {
            id: s.id.clone(),
            alpha: s.alpha,
            beta: s.beta,
            mean: crate::sampling::beta_mean(s.alpha, s.beta),
            total_trials: s.total_trials,
            total_successes: s.total_successes,
            is_active: s.is_active,
        }
    }
}

/// Thompson-sampling selector over a registry of [`Strategy`] arms.
pub struct ThompsonSelector {
    strategies: RwLock<HashMap<String, Strategy>>,
    rng: Mutex<StdRng>,
}

impl ThompsonSelector {
    /// Create a selector seeded from the OS entropy source.
    pub fn new() -> Self {
        Self {
            strategies: RwLock::new(HashMap::new()),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create a selector with a fixed seed, for reproducible tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            strategies: RwLock::new(HashMap::new()),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Register a strategy, overwriting any existing entry with the same
    /// id. Zero or negative shape parameters are normalized to 1.
    pub fn add_strategy(&self, mut strategy: Strategy) {
        if strategy.alpha <= 0.0 {
            strategy.alpha = 1.0;
        }
        if strategy.beta <= 0.0 {
            strategy.beta = 1.0;
        }
        tracing::debug!(id = %strategy.id, "registering strategy");
        self.strategies
            .write()
            .expect("strategy lock poisoned")
            .insert(strategy.id.clone(), strategy);
    }

    /// Sample `theta ~ Beta(alpha, beta)` for every active strategy and
    /// return the argmax. Errors if no strategy is active.
    pub fn select_strategy(&self) -> SelectorResult<Strategy> {
        let strategies = self.strategies.read().expect("strategy lock poisoned");
        let mut rng = self.rng.lock().expect("rng lock poisoned");

        let mut best: Option<(String, f64)> = None;
        let mut active_any = false;
        for s in strategies.values() {
            if !s.is_active {
                continue;
            }
            active_any = true;
            let theta = sample_beta(s.alpha, s.beta, &mut *rng);
            match &best {
                // Tie-break deterministically on id so repeated draws with
                // an identical RNG state always pick the same strategy.
                Some((_, best_theta)) if theta <= *best_theta => {}
                Some((best_id, best_theta)) if theta == *best_theta && s.id >= *best_id => {}
                _ => best = Some((s.id.clone(), theta)),
            }
        }

        if !active_any {
            return Err(SelectorError::NoActiveStrategies);
        }
        let (id, _) = best.expect("active_any implies a candidate was set");
        Ok(strategies.get(&id).cloned().expect("id came from the map"))
    }

    /// Record the outcome of applying `id`. Success increments `alpha`
    /// and `total_successes`; failure increments `beta`. `total_trials`
    /// increments in both cases.
    pub fn record_outcome(&self, id: &str, success: bool) -> SelectorResult<()> {
        let mut strategies = self.strategies.write().expect("strategy lock poisoned");
        let strategy = strategies
            .get_mut(id)
            .ok_or_else(|| SelectorError::UnknownStrategy { id: id.to_string() })?;

        strategy.total_trials += 1;
        if success {
            strategy.alpha += 1.0;
            strategy.total_successes += 1;
        } else {
            strategy.beta += 1.0;
        }
        Ok(())
    }

    /// Reset a strategy's posterior to the uniform prior and zero its
    /// counters, without removing it from the registry.
    pub fn reset_strategy(&self, id: &str) -> SelectorResult<()> {
        let mut strategies = self.strategies.write().expect("strategy lock poisoned");
        let strategy = strategies
            .get_mut(id)
            .ok_or_else(|| SelectorError::UnknownStrategy { id: id.to_string() })?;
        strategy.alpha = 1.0;
        strategy.beta = 1.0;
        strategy.total_trials = 0;
        strategy.total_successes = 0;
        Ok(())
    }

    /// Set a strategy's `is_active` flag without disturbing its posterior.
    pub fn set_active(&self, id: &str, active: bool) -> SelectorResult<()> {
        let mut strategies = self.strategies.write().expect("strategy lock poisoned");
        let strategy = strategies
            .get_mut(id)
            .ok_or_else(|| SelectorError::UnknownStrategy { id: id.to_string() })?;
        strategy.is_active = active;
        Ok(())
    }

    /// Pure exploitation: the strategy with the highest empirical success
    /// rate (`total_successes / total_trials`, 0 if no trials yet).
    pub fn get_best_strategy(&self) -> SelectorResult<Strategy> {
        let strategies = self.strategies.read().expect("strategy lock poisoned");
        strategies
            .values()
            .filter(|s| s.is_active)
            .max_by(|a, b| {
                a.success_rate()
                    .partial_cmp(&b.success_rate())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned()
            .ok_or(SelectorError::NoActiveStrategies)
    }

    /// Monte Carlo estimate of selection frequency: draw `rounds` Beta
    /// samples per active strategy, count how often each wins, and
    /// normalize. Used to characterize how confidently the bandit favors
    /// one arm over another.
    pub fn get_strategy_distribution(&self, rounds: usize) -> SelectorResult<HashMap<String, f64>> {
        let strategies = self.strategies.read().expect("strategy lock poisoned");
        let active: Vec<&Strategy> = strategies.values().filter(|s| s.is_active).collect();
        if active.is_empty() {
            return Err(SelectorError::NoActiveStrategies);
        }

        let mut rng = self.rng.lock().expect("rng lock poisoned");
        let mut wins: HashMap<String, u64> = HashMap::new();
        for _ in 0..rounds {
            let mut best_id: Option<&str> = None;
            let mut best_theta = f64::NEG_INFINITY;
            for s in &active {
                let theta = sample_beta(s.alpha, s.beta, &mut *rng);
                if theta > best_theta {
                    best_theta = theta;
                    best_id = Some(&s.id);
                }
            }
            if let Some(id) = best_id {
                *wins.entry(id.to_string()).or_insert(0) += 1;
            }
        }

        let total = rounds.max(1) as f64;
        Ok(wins
            .into_iter()
            .map(|(id, count)| (id, count as f64 / total))
            .collect())
    }

    /// Observability snapshot of every registered strategy (active or
    /// not), independent of any lock the caller might want to hold.
    pub fn snapshot(&self) -> Vec<StrategySnapshot> {
        self.strategies
            .read()
            .expect("strategy lock poisoned")
            .values()
            .map(StrategySnapshot::from)
            .collect()
    }
}

impl Default for ThompsonSelector {
    fn default() -> Self {
        Self::new()
    }
}
