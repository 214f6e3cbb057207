//! Problem and context signatures: compact, hashable fingerprints used
//! to group trajectories for the learning engine (§4.8) and to key the
//! similarity search's domain/tag indexes (§4.3).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::problem::Problem;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "have", "will", "what", "which",
    "when", "where", "does", "than", "then", "been", "were", "they", "their",
];

fn hash_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
}

/// Key concepts extracted from a free-text description: lowercase,
/// deduplicated tokens of at least 4 characters, stopwords removed.
pub fn extract_key_concepts(description: &str) -> Vec<String> {
    let mut concepts: BTreeSet<String> = BTreeSet::new();
    for raw in description.split(|c: char| !c.is_alphanumeric()) {
        let token = raw.to_lowercase();
        if token.len() >= 4 && !STOPWORDS.contains(&token.as_str()) {
            concepts.insert(token);
        }
    }
    concepts.into_iter().collect()
}

/// A fingerprint of a problem's semantic content, used for hash-based
/// similarity retrieval in [`crate::memory::EpisodicStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSignature {
    /// SHA-256 hex digest of the normalized (trimmed, lowercased)
    /// problem description — two problems with the same description
    /// hash identically regardless of domain or tooling.
    pub hash: String,
    pub key_concepts: Vec<String>,
    pub domain: String,
    pub tool_sequence: Vec<String>,
    pub complexity: f64,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl ContextSignature {
    pub fn compute(problem: &Problem, tool_sequence: &[String]) -> Self {
        let key_concepts = extract_key_concepts(&problem.description);
        let mut deduped_sequence = Vec::new();
        for tool in tool_sequence {
            if deduped_sequence.last() != Some(tool) {
                deduped_sequence.push(tool.clone());
            }
        }

        let normalized_description = problem.description.trim().to_lowercase();
        let hash = hash_hex(&[normalized_description.as_str()]);

        Self {
            hash,
            key_concepts,
            domain: problem.domain.clone(),
            tool_sequence: deduped_sequence,
            complexity: problem.complexity,
            embedding: problem.embedding.clone(),
        }
    }
}

/// A coarser fingerprint grouping problems by domain, type, and a
/// complexity band, used by the learning engine to batch trajectories
/// that represent "the same kind of problem" (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemSignature {
    pub domain: String,
    pub problem_type: String,
    /// `[low, high]` band the problem's complexity falls in, computed as
    /// `[complexity - 0.2, complexity + 0.2]` clamped to `[0, 1]`.
    pub complexity_band: (f64, f64),
    pub capability_tags: Vec<String>,
    pub hash: String,
}

impl ProblemSignature {
    pub fn compute(problem: &Problem, capability_tags: &[String]) -> Self {
        let low = (problem.complexity - 0.2).max(0.0);
        let high = (problem.complexity + 0.2).min(1.0);
        let keyword_fingerprint = extract_key_concepts(&problem.description).join(",");

        let mut tags = capability_tags.to_vec();
        tags.sort();
        tags.dedup();

        let hash_parts: Vec<&str> = vec![
            problem.domain.as_str(),
            problem.problem_type.as_str(),
            keyword_fingerprint.as_str(),
        ];
        let hash = hash_hex(&hash_parts);

        Self {
            domain: problem.domain.clone(),
            problem_type: problem.problem_type.clone(),
            complexity_band: (low, high),
            capability_tags: tags,
            hash,
        }
    }

    pub fn overlaps(&self, other: &ProblemSignature) -> bool {
        self.domain == other.domain
            && self.problem_type == other.problem_type
            && self.complexity_band.0 <= other.complexity_band.1
            && other.complexity_band.0 <= self.complexity_band.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problem() -> Problem {
        let mut p = Problem::new("p1", "Evaluate a disjunctive syllogism about weather patterns");
        p.domain = "logic".into();
        p.problem_type = "deduction".into();
        p.complexity = 0.5;
        p
    }

    #[test]
    fn key_concepts_drop_stopwords_and_short_tokens() {
        let concepts = extract_key_concepts("The weather patterns with a red herring");
        assert!(!concepts.contains(&"the".to_string()));
        assert!(!concepts.contains(&"red".to_string())); // 3 chars, dropped
        assert!(concepts.contains(&"weather".to_string()));
        assert!(concepts.contains(&"patterns".to_string()));
    }

    #[test]
    fn context_signature_hash_is_deterministic() {
        let p = problem();
        let a = ContextSignature::compute(&p, &["tool_a".into(), "tool_a".into(), "tool_b".into()]);
        let b = ContextSignature::compute(&p, &["tool_a".into(), "tool_a".into(), "tool_b".into()]);
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.tool_sequence, vec!["tool_a".to_string(), "tool_b".to_string()]);
        assert_eq!(a.complexity, p.complexity);
    }

    #[test]
    fn context_signature_hash_depends_only_on_normalized_description() {
        let mut p = problem();
        p.domain = "logic".into();
        let mut q = problem();
        q.domain = "causal".into();
        q.description = format!("  {}  ", p.description.to_uppercase());

        let a = ContextSignature::compute(&p, &[]);
        let b = ContextSignature::compute(&q, &[]);
        assert_eq!(a.hash, b.hash, "hash should ignore domain and description case/whitespace");
    }

    #[test]
    fn problem_signature_complexity_band_is_clamped() {
        let mut p = problem();
        p.complexity = 0.05;
        let sig = ProblemSignature::compute(&p, &[]);
        assert_eq!(sig.complexity_band.0, 0.0);
    }

    #[test]
    fn overlapping_bands_are_detected() {
        let mut p1 = problem();
        p1.complexity = 0.5;
        let mut p2 = problem();
        p2.complexity = 0.6;
        let s1 = ProblemSignature::compute(&p1, &[]);
        let s2 = ProblemSignature::compute(&p2, &[]);
        assert!(s1.overlaps(&s2));
    }
}
