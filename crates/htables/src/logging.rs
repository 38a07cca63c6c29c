//! Tracing subscriber installation for hosts and tests.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Installs a global `fmt` subscriber filtered by `config.level`.
///
/// An unparsable level falls back to `info`. Returns `false` when another
/// subscriber was already installed, which is not treated as an error.
pub fn init(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    installed.is_ok()
}

/// Test-friendly variant that routes output through the libtest capture.
pub fn init_for_tests(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_test_writer()
        .try_init();
}
