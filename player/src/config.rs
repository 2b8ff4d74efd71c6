//! Player configuration: TOML file, environment overrides and per-call
//! option merging.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Failed to initialize logging: {message}")]
    Logging { message: String },
}

/// Player configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Audio language to prefer when choosing the initial variant; empty for none
    pub preferred_audio_language: String,

    /// Subtitle language to prefer; also drives automatic text visibility
    pub preferred_text_language: String,

    /// Retry policy applied to manifest requests
    pub manifest_retry: RetryPolicy,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            preferred_audio_language: String::new(),
            preferred_text_language: String::new(),
            manifest_retry: RetryPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    pub level: String,

    /// Include the module path in log lines
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: false,
        }
    }
}

/// Partial configuration for [`crate::Player::configure`]. Unset fields keep
/// their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerOptions {
    pub preferred_audio_language: Option<String>,
    pub preferred_text_language: Option<String>,
    pub manifest_retry: Option<RetryPolicy>,
}

impl PlayerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preferred_audio_language(mut self, language: impl Into<String>) -> Self {
        self.preferred_audio_language = Some(language.into());
        self
    }

    pub fn preferred_text_language(mut self, language: impl Into<String>) -> Self {
        self.preferred_text_language = Some(language.into());
        self
    }

    pub fn manifest_retry(mut self, policy: RetryPolicy) -> Self {
        self.manifest_retry = Some(policy);
        self
    }
}

impl PlayerConfig {
    /// Load configuration from a TOML file
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let config: PlayerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as TOML
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Returns a copy with `options` applied
    pub fn merged(&self, options: PlayerOptions) -> Self {
        let mut config = self.clone();
        if let Some(language) = options.preferred_audio_language {
            config.preferred_audio_language = language;
        }
        if let Some(language) = options.preferred_text_language {
            config.preferred_text_language = language;
        }
        if let Some(policy) = options.manifest_retry {
            config.manifest_retry = policy;
        }
        config
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        use std::env;

        if let Ok(language) = env::var("PLAYBACK_PREFERRED_AUDIO_LANGUAGE") {
            self.preferred_audio_language = language;
        }
        if let Ok(language) = env::var("PLAYBACK_PREFERRED_TEXT_LANGUAGE") {
            self.preferred_text_language = language;
        }
        if let Ok(attempts) = env::var("PLAYBACK_MANIFEST_MAX_ATTEMPTS") {
            if let Ok(attempts) = attempts.parse::<u32>() {
                self.manifest_retry.max_attempts = attempts;
            }
        }
        if let Ok(level) = env::var("PLAYBACK_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let retry = &self.manifest_retry;

        if retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "manifest_retry.max_attempts must be at least 1".to_string(),
            });
        }

        if retry.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid {
                message: "manifest_retry.backoff_factor must be >= 1.0".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&retry.fuzz_factor) {
            return Err(ConfigError::Invalid {
                message: "manifest_retry.fuzz_factor must be between 0 and 1".to_string(),
            });
        }

        if retry.timeout.map_or(false, |t| t.is_zero()) {
            return Err(ConfigError::Invalid {
                message: "manifest_retry.timeout must be greater than 0".to_string(),
            });
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
            return Err(ConfigError::Invalid {
                message: format!("unknown log level '{}'", self.logging.level),
            });
        }

        Ok(())
    }
}
