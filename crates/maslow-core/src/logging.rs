//! Logging initialization.

use tracing_subscriber::EnvFilter;

/// Environment variable controlling the log filter, `env_filter` syntax.
pub const LOG_ENV_VAR: &str = "MASLOW_LOG";

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops. Filter defaults to
/// `info` and is overridden by `MASLOW_LOG`.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }
}
