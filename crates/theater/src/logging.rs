//! Logging setup for processes embedding the server.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `filter` is used (see
/// [`TheaterConfig::log_filter`](crate::TheaterConfig::log_filter)).
/// Returns `false` if a subscriber was already installed, which is
/// harmless: the first one stays in place.
pub fn init_logging(filter: &str) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_names(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init()
        .is_ok()
}
