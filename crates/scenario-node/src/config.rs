//! Node configuration from the environment.

use std::time::Duration;

use scenario_generator::{ConfigError, GeneratorConfig};
use scenario_sync::application::protocol::{DEFAULT_PROMPT, ProtocolSettings};

const DEFAULT_PARTICIPANTS: usize = 3;
const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(180);

/// Everything the demo room needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Generator endpoint settings.
    pub generator: GeneratorConfig,
    /// Protocol settings (prompt).
    pub protocol: ProtocolSettings,
    /// Participants in the room; the last one joins late.
    pub participants: usize,
    /// How long to wait for each participant to settle.
    pub ready_timeout: Duration,
}

impl NodeConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a numeric variable does not parse or
    /// the participant count is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration from an explicit variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a numeric variable does not parse or
    /// the participant count is zero.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let generator = GeneratorConfig::from_lookup(&lookup)?;
        let prompt = lookup("SCENARIO_PROMPT").unwrap_or_else(|| DEFAULT_PROMPT.to_owned());
        let participants = parse_or("SCENARIO_DEMO_PARTICIPANTS", &lookup, DEFAULT_PARTICIPANTS)?;
        if participants == 0 {
            return Err(ConfigError::Invalid {
                name: "SCENARIO_DEMO_PARTICIPANTS",
                reason: "must be at least 1".into(),
            });
        }
        let ready_timeout = parse_or(
            "SCENARIO_READY_TIMEOUT_SECS",
            &lookup,
            DEFAULT_READY_TIMEOUT.as_secs(),
        )
        .map(Duration::from_secs)?;

        Ok(Self {
            generator,
            protocol: ProtocolSettings { prompt },
            participants,
            ready_timeout,
        })
    }
}

fn parse_or<T>(
    name: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
