//! Episodic trajectory store: every completed reasoning session,
//! indexed for similarity retrieval (§4.3).
//!
//! One `RwLock` guards the primary map and all four secondary indexes
//! together, so a write that touches the primary map and its indexes is
//! always atomic from a reader's perspective — a reader never observes
//! an id present in an index but absent from the primary map, or vice
//! versa.

pub mod embedding;
pub mod signature;

use std::collections::HashMap;
use std::sync::RwLock;

use miette::Diagnostic;
use thiserror::Error;

use crate::problem::Problem;
use crate::trajectory::{Trajectory, TrajectoryMatch};

use self::embedding::EmbeddingIntegration;
use self::signature::ContextSignature;

/// Errors from the episodic store.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("trajectory not found: \"{id}\"")]
    #[diagnostic(code(noesis::store::not_found))]
    NotFound { id: String },

    #[error("failed to persist trajectory \"{id}\" to backend storage: {source}")]
    #[diagnostic(
        code(noesis::store::persist_failed),
        help("The trajectory is still retrievable from the in-memory store; the backend write can be retried.")
    )]
    PersistFailed {
        id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("embedding generation failed for trajectory \"{id}\": {source}")]
    #[diagnostic(code(noesis::store::embedding_failed))]
    EmbeddingFailed {
        id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A pluggable backend persistence sink, implemented by
/// [`crate::persistence::sqlite::SqliteBackend`]. Backend failures are
/// logged and surfaced but never roll back the in-memory insert — the
/// store is the source of truth during a process's lifetime, and the
/// backend is durability on top of it.
pub trait PersistenceBackend: Send + Sync {
    fn save_trajectory(&self, trajectory: &Trajectory) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Default)]
struct Indexes {
    by_problem_hash: HashMap<String, Vec<String>>,
    by_domain: HashMap<String, Vec<String>>,
    by_tag: HashMap<String, Vec<String>>,
    by_tool_sequence_hash: HashMap<String, Vec<String>>,
}

struct Inner {
    trajectories: HashMap<String, Trajectory>,
    signatures: HashMap<String, ContextSignature>,
    indexes: Indexes,
}

/// The episodic trajectory store (C3). Thread-safe; callers share one
/// instance behind an `Arc`.
pub struct EpisodicStore {
    inner: RwLock<Inner>,
    embedding: Option<EmbeddingIntegration>,
    backend: Option<Box<dyn PersistenceBackend>>,
}

impl EpisodicStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                trajectories: HashMap::new(),
                signatures: HashMap::new(),
                indexes: Indexes::default(),
            }),
            embedding: None,
            backend: None,
        }
    }

    pub fn with_embedding(mut self, embedding: EmbeddingIntegration) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_backend(mut self, backend: Box<dyn PersistenceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Store a completed trajectory: assign an id if absent, compute and
    /// index its context signature, generate an embedding if a backend
    /// is attached, and best-effort persist to the backend store.
    ///
    /// Signature generation is a hard error (the indexes would otherwise
    /// silently omit the trajectory from similarity search); backend
    /// persistence and embedding generation are soft failures, logged
    /// and returned as the `Ok` value's warnings rather than aborting
    /// the store.
    pub fn store_trajectory(&self, mut trajectory: Trajectory) -> StoreResult<String> {
        if trajectory.id.is_empty() {
            trajectory.id = format!("traj_{}", crate::problem::unix_now_nanos());
        }
        let id = trajectory.id.clone();

        if let Some(embedding) = &self.embedding {
            if embedding.config().enabled && !trajectory.problem.has_embedding() {
                match embedding.generate_and_store(&mut trajectory.problem) {
                    Ok(()) => {}
                    Err(err) => {
                        tracing::warn!(id = %id, error = %err, "embedding generation failed, continuing without it");
                    }
                }
            }
        }

        let tool_sequence = trajectory.tool_sequence();
        let signature = ContextSignature::compute(&trajectory.problem, &tool_sequence);
        let tool_sequence_hash = compute_tool_sequence_hash(&tool_sequence);

        {
            let mut inner = self.inner.write().expect("store lock poisoned");
            inner
                .indexes
                .by_problem_hash
                .entry(signature.hash.clone())
                .or_default()
                .push(id.clone());
            inner
                .indexes
                .by_domain
                .entry(trajectory.domain.clone())
                .or_default()
                .push(id.clone());
            for tag in &trajectory.tags {
                inner.indexes.by_tag.entry(tag.clone()).or_default().push(id.clone());
            }
            inner
                .indexes
                .by_tool_sequence_hash
                .entry(tool_sequence_hash)
                .or_default()
                .push(id.clone());
            inner.signatures.insert(id.clone(), signature);
            inner.trajectories.insert(id.clone(), trajectory.clone());
        }

        if let Some(backend) = &self.backend {
            if let Err(err) = backend.save_trajectory(&trajectory) {
                tracing::warn!(id = %id, error = %err, "backend persistence failed");
            }
        }

        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<Trajectory> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .trajectories
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("store lock poisoned").trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hash-based similarity retrieval: candidates are trajectories
    /// sharing a problem-hash or domain index bucket with `problem`,
    /// scored by [`problem_similarity`] and truncated to `limit`.
    pub fn retrieve_similar_hash_based(&self, problem: &Problem, limit: usize) -> Vec<TrajectoryMatch> {
        let inner = self.inner.read().expect("store lock poisoned");
        let signature = ContextSignature::compute(problem, &[]);

        let mut candidate_ids: Vec<String> = Vec::new();
        if let Some(ids) = inner.indexes.by_problem_hash.get(&signature.hash) {
            candidate_ids.extend(ids.iter().cloned());
        }
        if let Some(ids) = inner.indexes.by_domain.get(&problem.domain) {
            for id in ids {
                if !candidate_ids.contains(id) {
                    candidate_ids.push(id.clone());
                }
            }
        }

        let mut matches: Vec<TrajectoryMatch> = candidate_ids
            .into_iter()
            .filter_map(|id| inner.trajectories.get(&id).cloned())
            .map(|trajectory| {
                let similarity = problem_similarity(problem, &trajectory.problem);
                TrajectoryMatch { trajectory, similarity }
            })
            .filter(|m| m.similarity > 0.3)
            .collect();

        matches.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(limit);
        matches
    }

    /// Similarity retrieval via the attached embedding integration, or a
    /// straight fallback to [`EpisodicStore::retrieve_similar_hash_based`]
    /// if none is attached.
    pub fn retrieve_similar_trajectories(&self, problem: &Problem, limit: usize) -> Vec<TrajectoryMatch> {
        match &self.embedding {
            Some(embedding) if embedding.config().enabled => {
                // Computed before the read guard below, since the store's
                // `RwLock` is not held recursively.
                let hash_ranked = self.retrieve_similar_hash_based(problem, limit * 2);
                let inner = self.inner.read().expect("store lock poisoned");
                let all: Vec<(&Trajectory, &ContextSignature)> = inner
                    .trajectories
                    .values()
                    .filter_map(|t| inner.signatures.get(&t.id).map(|s| (t, s)))
                    .collect();
                embedding.retrieve_similar_with_hybrid_search(problem, &all, hash_ranked, limit)
            }
            _ => self.retrieve_similar_hash_based(problem, limit),
        }
    }

    pub fn trajectories_by_tool_sequence_hash(&self, hash: &str) -> Vec<Trajectory> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner
            .indexes
            .by_tool_sequence_hash
            .get(hash)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.trajectories.get(id).cloned())
            .collect()
    }

    pub fn all_tool_sequence_hashes(&self) -> Vec<String> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .indexes
            .by_tool_sequence_hash
            .keys()
            .cloned()
            .collect()
    }

    pub fn all_trajectories(&self) -> Vec<Trajectory> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .trajectories
            .values()
            .cloned()
            .collect()
    }
}

impl Default for EpisodicStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Weighted similarity between two problems: domain match (0.3), problem
/// type match (0.3), complexity closeness (0.2), and goal-statement
/// overlap (0.2), normalized by the sum of weights whose inputs were
/// actually comparable — complexity only counts when both problems carry
/// a non-zero complexity, goal overlap only when both state at least one
/// goal. Must satisfy identity similarity >= 0.9 and cross-domain
/// similarity < 0.3 (§8).
pub fn problem_similarity(a: &Problem, b: &Problem) -> f64 {
    let mut score = 0.0;
    let mut applicable_weight = 0.0;

    if !a.domain.is_empty() && !b.domain.is_empty() {
        applicable_weight += 0.3;
        if a.domain == b.domain {
            score += 0.3;
        }
    }
    if !a.problem_type.is_empty() && !b.problem_type.is_empty() {
        applicable_weight += 0.3;
        if a.problem_type == b.problem_type {
            score += 0.3;
        }
    }

    if a.complexity > 0.0 && b.complexity > 0.0 {
        applicable_weight += 0.2;
        let max_complexity = a.complexity.max(b.complexity);
        let closeness = 1.0 - (a.complexity - b.complexity).abs() / max_complexity;
        score += 0.2 * closeness.clamp(0.0, 1.0);
    }

    if !a.goals.is_empty() && !b.goals.is_empty() {
        applicable_weight += 0.2;
        let a_set: std::collections::HashSet<&str> = a.goals.iter().map(String::as_str).collect();
        let b_set: std::collections::HashSet<&str> = b.goals.iter().map(String::as_str).collect();
        let intersection = a_set.intersection(&b_set).count() as f64;
        let denom = a_set.len().max(b_set.len()) as f64;
        score += 0.2 * (intersection / denom);
    }

    if applicable_weight <= 0.0 {
        0.0
    } else {
        (score / applicable_weight).clamp(0.0, 1.0)
    }
}

/// SHA-256 of the tool sequence joined by `|`, truncated to 16 hex
/// characters, used to key [`Indexes::by_tool_sequence_hash`].
pub fn compute_tool_sequence_hash(sequence: &[String]) -> String {
    use sha2::{Digest, Sha256};
    let joined = sequence.join("|");
    let digest = Sha256::digest(joined.as_bytes());
    format!("{:x}", digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::{Approach, Outcome, OutcomeStatus, QualityMetrics};
    use std::time::Duration;

    fn trajectory(id: &str, domain: &str) -> Trajectory {
        let mut problem = Problem::new(format!("p_{id}"), "A disjunctive syllogism problem");
        problem.domain = domain.to_string();
        problem.problem_type = "deduction".to_string();
        Trajectory {
            id: id.to_string(),
            problem,
            approach: Approach {
                strategy: "systematic-linear".into(),
                modes_used: vec!["linear".into()],
                tool_sequence: vec!["analyze".into(), "conclude".into()],
                key_decisions: Vec::new(),
            },
            steps: Vec::new(),
            outcome: Outcome {
                status: OutcomeStatus::Success,
                goals_achieved: Vec::new(),
                goals_failed: Vec::new(),
                goals: None,
                confidence: 0.9,
                solution: String::new(),
            },
            quality: QualityMetrics::default(),
            tags: vec![domain.to_string(), "success".to_string()],
            domain: domain.to_string(),
            complexity: 0.5,
            success_score: 0.9,
            duration: Duration::from_secs(1),
            created_at: 0,
        }
    }

    #[test]
    fn store_and_get_round_trips() {
        let store = EpisodicStore::new();
        let id = store.store_trajectory(trajectory("t1", "logic")).unwrap();
        assert_eq!(id, "t1");
        assert!(store.get("t1").is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn empty_id_gets_generated() {
        let store = EpisodicStore::new();
        let mut t = trajectory("", "logic");
        t.id = String::new();
        let id = store.store_trajectory(t).unwrap();
        assert!(id.starts_with("traj_"));
    }

    #[test]
    fn retrieval_ranks_same_domain_higher() {
        let store = EpisodicStore::new();
        store.store_trajectory(trajectory("t1", "logic")).unwrap();
        store.store_trajectory(trajectory("t2", "causal")).unwrap();

        let mut query = Problem::new("q", "query");
        query.domain = "logic".into();
        query.problem_type = "deduction".into();

        let matches = store.retrieve_similar_hash_based(&query, 5);
        assert!(!matches.is_empty());
        assert_eq!(matches[0].trajectory.id, "t1");
    }

    #[test]
    fn tool_sequence_hash_groups_identical_sequences() {
        let store = EpisodicStore::new();
        store.store_trajectory(trajectory("t1", "logic")).unwrap();
        store.store_trajectory(trajectory("t2", "logic")).unwrap();
        let hash = compute_tool_sequence_hash(&["analyze".into(), "conclude".into()]);
        let grouped = store.trajectories_by_tool_sequence_hash(&hash);
        assert_eq!(grouped.len(), 2);
    }

    #[test]
    fn problem_similarity_is_symmetric_and_bounded() {
        let mut a = Problem::new("a", "x");
        a.domain = "logic".into();
        a.complexity = 0.3;
        let mut b = Problem::new("b", "y");
        b.domain = "logic".into();
        b.complexity = 0.7;
        let sim = problem_similarity(&a, &b);
        assert!((0.0..=1.0).contains(&sim));
        assert_eq!(sim, problem_similarity(&b, &a));
    }

    #[test]
    fn problem_similarity_identity_and_cross_domain_bounds() {
        let mut a = Problem::new("a", "x");
        a.domain = "logic".into();
        a.problem_type = "deduction".into();
        a.complexity = 0.5;
        a.goals = vec!["solve".into()];

        let identity = problem_similarity(&a, &a.clone());
        assert!(identity >= 0.9, "identity similarity was {identity}");

        let mut b = Problem::new("b", "y");
        b.domain = "causal".into();
        b.problem_type = "induction".into();
        b.complexity = 0.5;
        b.goals = vec!["other".into()];

        let cross = problem_similarity(&a, &b);
        assert!(cross < 0.3, "cross-domain similarity was {cross}");
    }
}
