//! Benchmarks for Thompson sampling and episodic trajectory retrieval.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use noesis::memory::EpisodicStore;
use noesis::problem::Problem;
use noesis::selector::{Strategy, ThompsonSelector};
use noesis::trajectory::{Approach, Outcome, OutcomeStatus, QualityMetrics, Trajectory};

fn bench_select_strategy(c: &mut Criterion) {
    let selector = ThompsonSelector::with_seed(0);
    for i in 0..10 {
        selector.add_strategy(Strategy::new(format!("strategy_{i}")));
    }
    for i in 0..200 {
        selector.record_outcome(&format!("strategy_{}", i % 10), i % 3 != 0).unwrap();
    }

    c.bench_function("select_strategy_10_arms", |bench| {
        bench.iter(|| black_box(selector.select_strategy().unwrap()))
    });
}

fn bench_strategy_distribution(c: &mut Criterion) {
    let selector = ThompsonSelector::with_seed(0);
    for i in 0..5 {
        selector.add_strategy(Strategy::new(format!("strategy_{i}")));
    }

    c.bench_function("strategy_distribution_1000_rounds", |bench| {
        bench.iter(|| black_box(selector.get_strategy_distribution(1000).unwrap()))
    });
}

fn sample_trajectory(id: &str, domain: &str) -> Trajectory {
    let mut problem = Problem::new(format!("p_{id}"), "A disjunctive syllogism about weather patterns");
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
        duration: std::time::Duration::from_secs(1),
        created_at: 0,
    }
}

fn bench_hash_based_retrieval(c: &mut Criterion) {
    let store = EpisodicStore::new();
    let domains = ["logic", "causal", "bayes", "planning"];
    for i in 0..1000 {
        let domain = domains[i % domains.len()];
        store.store_trajectory(sample_trajectory(&format!("t{i}"), domain)).unwrap();
    }

    let mut query = Problem::new("q", "query");
    query.domain = "logic".into();
    query.problem_type = "deduction".into();

    c.bench_function("retrieve_similar_hash_based_1000_trajectories", |bench| {
        bench.iter(|| black_box(store.retrieve_similar_hash_based(&query, 10)))
    });
}

criterion_group!(
    benches,
    bench_select_strategy,
    bench_strategy_distribution,
    bench_hash_based_retrieval
);
criterion_main!(benches);
