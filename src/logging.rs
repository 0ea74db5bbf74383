//! Shared tracing setup for the command-line binaries.

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber, filtering by `verbosity` (a level name
/// like `info` or a full filter directive). Logs go to stderr so binary
/// output on stdout stays clean.
pub fn setup(verbosity: &str) {
    let filter = EnvFilter::try_new(verbosity).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
