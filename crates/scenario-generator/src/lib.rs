//! Scenario Generator: HTTP adapter for the content generation endpoint.

pub mod config;
pub mod http_generator;

pub use config::{ConfigError, GeneratorConfig};
pub use http_generator::HttpGeneratorClient;
