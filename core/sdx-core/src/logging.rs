//! Tracing subscriber setup for hosts running the index.
//!
//! Statement logging in the DAO goes to the `sdx_core::storage` target at
//! `info`; slow statements and dropped upserts are emitted at `warn`.

use crate::config::IndexConfig;

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt};

const STORAGE_TARGET: &str = "sdx_core::storage";

/// Filter directives used when `RUST_LOG` is unset. `detailed_logging`
/// opens the storage target so per-statement lines survive a quieter
/// global level.
pub fn default_directives(level: &str, config: &IndexConfig) -> String {
    let level = match level.trim() {
        "" => "info",
        other => other,
    };
    if config.detailed_logging {
        format!("{level},{STORAGE_TARGET}=info")
    } else {
        level.to_string()
    }
}

/// Install a subscriber at `info`, honoring `RUST_LOG`.
///
/// ```rust
/// sdx_core::logging::init();
/// ```
pub fn init() {
    init_with_level("info", &IndexConfig::default())
}

/// Install a subscriber for an index running with `config`.
pub fn init_for(config: &IndexConfig) {
    init_with_level("info", config)
}

#[cfg(feature = "logging")]
pub fn init_with_level(level: &str, config: &IndexConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level, config)));

    // a host embedding the index may already own the global subscriber
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .try_init();
}

/// Debug output for the index captured by the test harness.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("sdx_core=debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str, _config: &IndexConfig) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        let mut config = IndexConfig::default();
        assert_eq!(default_directives("warn", &config), "warn");
        assert_eq!(default_directives(" ", &config), "info");

        config.detailed_logging = true;
        assert_eq!(default_directives("warn", &config), "warn,sdx_core::storage=info");
    }
}
