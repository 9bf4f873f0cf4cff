//! Logging setup shared by the simulator binaries.
//!
//! The core only emits `tracing` events; installing a subscriber is left to
//! whoever drives the simulation.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging at INFO unless RUST_LOG says otherwise
///
/// Logs go to stderr; stdout is left to command output.
pub fn init() {
    init_with_level("info")
}

/// Initialize logging with a specific default level
///
/// Per-rule outcomes are logged at `debug`, so `init_with_level("debug")`
/// produces a full day-by-day trace of every entity. RUST_LOG still wins.
pub fn init_with_level(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second init (e.g. from an embedding host) is not an error for us.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

/// Map a `-v` count from a CLI to a default level
pub fn level_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Initialize logging for testing (captures logs for test output)
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
