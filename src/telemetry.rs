//! Tracing setup for binaries embedding this crate. The library itself
//! only emits `tracing` events; it never installs a subscriber, since a
//! library that forces its own logging format on every consumer is a
//! poor citizen. `init_tracing` is here for a consumer (a CLI, a test
//! harness) that wants the same env-filtered format this crate's own
//! authors use.

/// Install a `tracing_subscriber::fmt` subscriber with an `EnvFilter`
/// read from `RUST_LOG`, defaulting to `info` with noisy dependencies
/// quieted. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,rusqlite=warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
