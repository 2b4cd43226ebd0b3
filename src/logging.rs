//! Tracing subscriber setup

use crate::config::Config;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered at the configured level.
///
/// `RUST_LOG`, when set, takes precedence over the configuration. Calling
/// this again after a subscriber is installed does nothing.
pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level()));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.debug)
        .try_init()
        .is_ok();

    if installed {
        debug!(
            "Logging initialised (backend: {}, level: {})",
            config.state_backend,
            config.log_level()
        );
    }
}
