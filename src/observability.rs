// Centralized Observability Infrastructure
//
// Structured logging and a small set of process-wide counters surfaced through
// the health endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);
static ERROR_COUNTER: AtomicU64 = AtomicU64::new(0);
static RELOAD_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize the tracing subscriber. Safe to call more than once (later calls
/// are no-ops) so tests can call it freely.
pub fn init_logging(verbose: bool, quiet: bool) {
    let filter_level = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("publisher=debug,info")
    } else {
        EnvFilter::new("publisher=info,warn")
    };

    let env_filter = if quiet {
        EnvFilter::new("error")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or(filter_level)
    } else {
        filter_level
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(!quiet)
        .with_ansi(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

pub fn record_request() {
    REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
}

pub fn record_error() {
    ERROR_COUNTER.fetch_add(1, Ordering::Relaxed);
}

pub fn record_reload() {
    RELOAD_COUNTER.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct Counters {
    pub requests: u64,
    pub errors: u64,
    pub reloads: u64,
}

pub fn snapshot() -> Counters {
    Counters {
        requests: REQUEST_COUNTER.load(Ordering::Relaxed),
        errors: ERROR_COUNTER.load(Ordering::Relaxed),
        reloads: RELOAD_COUNTER.load(Ordering::Relaxed),
    }
}
