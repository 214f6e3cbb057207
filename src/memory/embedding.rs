//! Vector embedding integration (C4): a narrow seam onto an external
//! embedding provider, plus Reciprocal Rank Fusion to blend vector
//! search with the hash-based retrieval in [`super::EpisodicStore`].
//!
//! [`HttpEmbedder`] is the one concrete [`Embedder`] this crate ships,
//! built on the same synchronous `ureq` client the teacher uses for its
//! own outbound HTTP calls; callers needing a local model or a test
//! double supply their own `Embedder` instead.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use crate::problem::Problem;
use crate::trajectory::{Trajectory, TrajectoryMatch};

use super::signature::ContextSignature;

#[derive(Debug, Error, Diagnostic)]
pub enum EmbeddingError {
    #[error("embedding provider returned an empty vector")]
    #[diagnostic(code(noesis::embedding::empty_vector))]
    EmptyVector,

    #[error("embedding generation timed out after {0:?}")]
    #[diagnostic(code(noesis::embedding::timeout))]
    Timeout(Duration),

    #[error("embedding provider error: {0}")]
    #[diagnostic(code(noesis::embedding::provider))]
    Provider(String),
}

pub type EmbeddingResult<T> = std::result::Result<T, EmbeddingError>;

/// A vector embedding provider. Implementations own their own transport
/// (HTTP, local inference, a test double); this trait only constrains
/// the shape, not the mechanism.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;
    fn model_name(&self) -> &str;
    fn provider_name(&self) -> &str;
}

/// A synchronous HTTP [`Embedder`] over any OpenAI-style `POST
/// /embeddings` endpoint, built on the same `ureq` client the teacher
/// uses for its own outbound tool calls.
pub struct HttpEmbedder {
    endpoint: String,
    model: String,
    provider: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct EmbeddingResponseBody {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, provider: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            provider: provider.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
        let body = serde_json::json!({ "model": self.model, "input": text });

        let response = agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(body);

        match response {
            Ok(resp) => {
                let parsed: EmbeddingResponseBody = resp
                    .into_json()
                    .map_err(|e| EmbeddingError::Provider(format!("malformed embedding response: {e}")))?;
                parsed
                    .data
                    .into_iter()
                    .next()
                    .map(|d| d.embedding)
                    .ok_or_else(|| EmbeddingError::Provider("embedding response carried no data".to_string()))
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(EmbeddingError::Provider(format!("HTTP {code}: {body}")))
            }
            Err(ureq::Error::Transport(transport)) => Err(EmbeddingError::Provider(format!("transport error: {transport}"))),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        &self.provider
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub enabled: bool,
    pub provider: String,
    pub model: String,
    pub api_key: String,
    /// Vector matches below this cosine similarity are discarded before
    /// fusion.
    pub min_similarity: f64,
    /// `k` in the RRF formula `1 / (k + rank + 1)`.
    pub rrf_parameter: f64,
    pub cache_ttl: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: String::new(),
            model: String::new(),
            api_key: String::new(),
            min_similarity: 0.5,
            rrf_parameter: 60.0,
            cache_ttl: Duration::from_secs(3600),
        }
    }
}

struct CacheEntry {
    vector: Vec<f32>,
    inserted_at: Instant,
}

/// Wraps an [`Embedder`] with this crate's timeout, caching, and RRF
/// fusion policy.
pub struct EmbeddingIntegration {
    config: EmbeddingConfig,
    embedder: Box<dyn Embedder>,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl EmbeddingIntegration {
    pub fn new(config: EmbeddingConfig, embedder: Box<dyn Embedder>) -> Self {
        Self {
            config,
            embedder,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    /// Project a problem's textual fields down to the string the
    /// embedder sees: description, then goals, joined by newlines.
    fn project_text(problem: &Problem) -> String {
        let mut parts = vec![problem.description.clone()];
        parts.extend(problem.goals.iter().cloned());
        parts.join("\n")
    }

    /// Generate an embedding for `problem` and attach it, applying a 30s
    /// internal deadline independent of any caller-supplied timeout and
    /// rejecting an empty vector outright rather than caching it.
    pub fn generate_and_store(&self, problem: &mut Problem) -> EmbeddingResult<()> {
        const INTERNAL_TIMEOUT: Duration = Duration::from_secs(30);
        let text = Self::project_text(problem);

        if let Some(cached) = self.cached(&text) {
            problem.embedding = Some(cached);
        } else {
            let start = Instant::now();
            let vector = self.embedder.embed(&text)?;
            if start.elapsed() > INTERNAL_TIMEOUT {
                return Err(EmbeddingError::Timeout(INTERNAL_TIMEOUT));
            }
            if vector.is_empty() {
                return Err(EmbeddingError::EmptyVector);
            }
            self.cache(&text, vector.clone());
            problem.embedding = Some(vector);
        }

        problem.embedding_meta = Some(crate::problem::EmbeddingMeta {
            model: self.embedder.model_name().to_string(),
            provider: self.embedder.provider_name().to_string(),
            dimension: problem.embedding.as_ref().map(|v| v.len()).unwrap_or(0),
            source: "generated".to_string(),
        });
        Ok(())
    }

    fn cached(&self, text: &str) -> Option<Vec<f32>> {
        let mut cache = self.cache.lock().expect("embedding cache lock poisoned");
        if let Some(entry) = cache.get(text) {
            if entry.inserted_at.elapsed() < self.config.cache_ttl {
                return Some(entry.vector.clone());
            }
            cache.remove(text);
        }
        None
    }

    fn cache(&self, text: &str, vector: Vec<f32>) {
        self.cache.lock().expect("embedding cache lock poisoned").insert(
            text.to_string(),
            CacheEntry { vector, inserted_at: Instant::now() },
        );
    }

    /// Hybrid retrieval: rank candidates two ways (the hash-based
    /// ranking the store already computed, and a vector cosine-scan
    /// over every signature that carries an embedding), then fuse the
    /// two rankings with Reciprocal Rank Fusion, `score = sum(1 / (k +
    /// rank + 1))` across whichever lists a trajectory appears in.
    pub fn retrieve_similar_with_hybrid_search(
        &self,
        problem: &Problem,
        all: &[(&Trajectory, &ContextSignature)],
        hash_ranked: Vec<TrajectoryMatch>,
        limit: usize,
    ) -> Vec<TrajectoryMatch> {
        let query_vector = match &problem.embedding {
            Some(v) if !v.is_empty() => v.clone(),
            _ => return hash_ranked.into_iter().take(limit).collect(),
        };

        let mut vector_ranked: Vec<(String, f64)> = all
            .iter()
            .filter_map(|(trajectory, signature)| {
                let candidate = signature.embedding.as_ref()?;
                let similarity = cosine_similarity(&query_vector, candidate);
                if similarity >= self.config.min_similarity {
                    Some((trajectory.id.clone(), similarity))
                } else {
                    None
                }
            })
            .collect();
        vector_ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        vector_ranked.truncate(limit * 2);

        let k = self.config.rrf_parameter;
        let mut fused: HashMap<String, f64> = HashMap::new();
        for (rank, m) in hash_ranked.iter().enumerate() {
            *fused.entry(m.trajectory.id.clone()).or_insert(0.0) += 1.0 / (k + rank as f64 + 1.0);
        }
        for (rank, (id, _)) in vector_ranked.iter().enumerate() {
            *fused.entry(id.clone()).or_insert(0.0) += 1.0 / (k + rank as f64 + 1.0);
        }

        let by_id: HashMap<&str, &Trajectory> =
            all.iter().map(|(t, _)| (t.id.as_str(), *t)).collect();
        let mut hash_by_id: HashMap<&str, &Trajectory> = HashMap::new();
        for m in &hash_ranked {
            hash_by_id.insert(m.trajectory.id.as_str(), &m.trajectory);
        }

        let mut results: Vec<TrajectoryMatch> = fused
            .into_iter()
            .filter_map(|(id, score)| {
                let trajectory = by_id.get(id.as_str()).or_else(|| hash_by_id.get(id.as_str()))?;
                Some(TrajectoryMatch { trajectory: (*trajectory).clone(), similarity: score })
            })
            .collect();
        results.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        results
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)) as f64
    }
}
