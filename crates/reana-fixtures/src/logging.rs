//! Log output for test runs.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

use reana_fixtures_core::config::{LoggingConfig, LOG_FILTER_ENV};

static INIT: Once = Once::new();

/// Install a fmt subscriber writing through the test harness, once per
/// process.
///
/// `REANA_FIXTURES_LOG` overrides the configured filter. Does nothing when
/// logging is disabled or another subscriber is already installed.
pub fn init_test_logging(config: &LoggingConfig) {
    if !config.enabled {
        return;
    }

    INIT.call_once(|| {
        let filter = std::env::var(LOG_FILTER_ENV).unwrap_or_else(|_| config.filter.clone());
        let installed = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_test_writer()
            .try_init()
            .is_ok();

        if installed {
            tracing::debug!("Test logging initialized");
        }
    });
}
