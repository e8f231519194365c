//! Generator endpoint configuration.

use std::time::Duration;

use thiserror::Error;

/// Default generation endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/generate";

/// Default request timeout; generation on a local model can be slow.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Invalid configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds a value that does not parse.
    #[error("{name} is invalid: {reason}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Parse failure.
        reason: String,
    },
}

/// Where and how to reach the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// URL that accepts the form-encoded prompt.
    pub endpoint: String,
    /// Upper bound for one request, connection included.
    pub timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl GeneratorConfig {
    /// Reads `SCENARIO_GENERATOR_URL` and `SCENARIO_GENERATOR_TIMEOUT_SECS`,
    /// falling back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the timeout is not a whole number of
    /// seconds.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`GeneratorConfig::from_env`] with an explicit variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the timeout is not a whole number of
    /// seconds.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let endpoint =
            lookup("SCENARIO_GENERATOR_URL").unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned());
        let timeout = match lookup("SCENARIO_GENERATOR_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.trim().parse().map_err(|e| {
                ConfigError::Invalid {
                    name: "SCENARIO_GENERATOR_TIMEOUT_SECS",
                    reason: format!("{e}"),
                }
            })?),
            None => DEFAULT_TIMEOUT,
        };
        Ok(Self { endpoint, timeout })
    }
}
