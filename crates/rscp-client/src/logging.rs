// ============================================
// File: crates/rscp-client/src/logging.rs
// ============================================
//! # Logging Setup
//!
//! Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG`, or by
//! the configured level when `RUST_LOG` is unset. Calling `init` twice is
//! harmless; the first subscriber stays installed.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Initializes the global subscriber.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}
