//! Logging and tracing setup for the provider process.
//!
//! All logs are written to **stderr**: stdout carries the handshake line the
//! host reads to find the provider's address, so nothing else may go there.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `debug`, `hemmer_provider_xyz=debug`)
//!
//! ```bash
//! # Debug logs for the provider only
//! RUST_LOG=hemmer_provider_xyz=debug ./hemmer-provider-xyz
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default level used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Initialize the global logging subscriber.
///
/// Reads `RUST_LOG`, falling back to `info`, and writes compact
/// human-readable lines to stderr.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_LOG_LEVEL);
}

/// Initialize logging with a custom default level.
///
/// Like [`init_logging`], but `default_level` is used when `RUST_LOG` is not set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Try to initialize logging, returning false if already initialized.
///
/// Unlike [`init_logging`], this does not panic when a subscriber is
/// already installed, which makes it safe to call from tests.
pub fn try_init_logging() -> bool {
    subscriber(DEFAULT_LOG_LEVEL).try_init().is_ok()
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn subscriber(default_level: &str) -> impl Into<tracing::Dispatch> {
    tracing_subscriber::registry().with(env_filter(default_level)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

#[cfg(test)]
mod tests {
    // The global subscriber can only be set once per process, so only
    // try_init_logging is exercised here.

    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_LEVEL).is_ok());
        assert!(EnvFilter::try_new("hemmer_provider_xyz=debug").is_ok());
        assert!(EnvFilter::try_new("warn,hemmer_provider_xyz::infer=trace").is_ok());
    }

    #[test]
    fn test_try_init_logging_is_idempotent() {
        let _ = try_init_logging();
        assert!(!try_init_logging());
    }
}
