//! Durability (C13): an append-only JSON timeseries for benchmark
//! trend tracking, and a SQLite-backed relational store for
//! trajectories, benchmark runs, and their derived signatures.

pub mod sqlite;
pub mod timeseries;
