//! Logging setup for binaries and tests.
//!
//! The library itself only uses the `log` facade; this module wires it to
//! `env_logger` for callers that want output.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the logger with the default filter (`RUST_LOG` respected,
/// warnings and above otherwise). Safe to call more than once.
pub fn init() {
    INIT.call_once(|| {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Warn)
            .init();
    });
}

/// Initializes the logger at a specific level, ignoring the environment.
pub fn init_with_level(level: log::LevelFilter) {
    INIT.call_once(|| {
        env_logger::Builder::new().filter_level(level).init();
    });
}
