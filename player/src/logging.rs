use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ConfigError, LoggingConfig};

/// Installs the global tracing subscriber. `RUST_LOG` overrides the
/// configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.level.to_ascii_lowercase().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(config.with_target))
        .try_init()
        .map_err(|e| ConfigError::Logging {
            message: e.to_string(),
        })
}
