//! Content generator port.

use async_trait::async_trait;
use thiserror::Error;

/// Failure of a single generation request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The endpoint could not be reached or the connection broke.
    #[error("generator transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("generator returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The response body could not be parsed, or held no usable text.
    #[error("malformed generator response: {0}")]
    MalformedResponse(String),
}

/// An external content generator.
///
/// Implementations issue one request per call and always resolve to a
/// result. Callers must not issue a second request while one is in flight.
#[async_trait]
pub trait ScenarioGenerator: Send + Sync {
    /// Sends `prompt` to the generator and returns the raw response text.
    ///
    /// The returned text is not cleaned; it may echo the prompt and contain
    /// escaped line breaks.
    async fn request(&self, prompt: &str) -> Result<String, GenerationError>;
}
