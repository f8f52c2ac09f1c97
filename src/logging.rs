//! Subscriber setup for binaries and benches. The library itself only emits events.

use tracing_subscriber::filter::EnvFilter;

/// Installs a `fmt` subscriber writing to stderr. Falls back to `info` on a bad filter.
/// Returns false if a global subscriber was already set.
pub fn init(filter: &str) -> bool {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
