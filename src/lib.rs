//! # noesis
//!
//! A Thompson-sampling strategy selector, episodic trajectory memory,
//! and benchmark harness for an adaptive reasoning server.
//!
//! ## Architecture
//!
//! - **Selection** (`selector`, `sampling`): a multi-armed bandit over
//!   named reasoning strategies, backed by Beta-Bernoulli posteriors.
//! - **Episodic memory** (`session`, `trajectory`, `memory`): sessions
//!   accumulate steps, complete into immutable trajectories, and are
//!   indexed for hash- and embedding-based similarity retrieval.
//! - **Guidance** (`recommend`, `retrospective`, `learning`): turn
//!   stored trajectories into recommendations, retrospectives, and
//!   batch-extracted patterns for future problems.
//! - **Benchmarking** (`benchmark`): load a suite, run it through a
//!   pluggable executor, and score accuracy, calibration, and
//!   (for RL-aware executors) bandit-specific metrics.
//! - **Transport** (`rpc`): a JSON-RPC stdio client for MCP-style tool
//!   servers.
//! - **Durability** (`persistence`): an append-only benchmark
//!   timeseries and a SQLite-backed relational store.
//!
//! ## Library usage
//!
//! ```
//! use noesis::selector::{Strategy, ThompsonSelector};
//!
//! let selector = ThompsonSelector::with_seed(1);
//! selector.add_strategy(Strategy::new("systematic-linear"));
//! selector.add_strategy(Strategy::new("creative-divergent"));
//! let chosen = selector.select_strategy().unwrap();
//! selector.record_outcome(&chosen.id, true).unwrap();
//! ```

pub mod benchmark;
pub mod error;
pub mod learning;
pub mod memory;
pub mod persistence;
pub mod problem;
pub mod recommend;
pub mod retrospective;
pub mod rpc;
pub mod sampling;
pub mod selector;
pub mod session;
pub mod telemetry;
pub mod trajectory;
pub mod value;

pub use error::{NoesisError, NoesisResult};
