//! reqwest-backed implementation of the `ScenarioGenerator` port.
//!
//! Wire format: `POST <endpoint>` with the form field `prompt`; a successful
//! response is JSON `{"response": "<text>"}`.

use async_trait::async_trait;
use reqwest::Client;
use scenario_core::generator::{GenerationError, ScenarioGenerator};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::GeneratorConfig;

const MAX_ERROR_BODY: usize = 512;

#[derive(Serialize)]
struct GenerateForm<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// HTTP client for the generation endpoint.
#[derive(Debug, Clone)]
pub struct HttpGeneratorClient {
    client: Client,
    endpoint: String,
}

impl HttpGeneratorClient {
    /// Builds a client for `config`.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::Transport` if the HTTP client cannot be
    /// initialised (for example, no TLS backend).
    pub fn new(config: &GeneratorConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::Transport(format!("client setup failed: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    /// The endpoint requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ScenarioGenerator for HttpGeneratorClient {
    #[instrument(skip(self, prompt), fields(endpoint = %self.endpoint))]
    async fn request(&self, prompt: &str) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&GenerateForm { prompt })
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "generator rejected the request");
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let parsed = response.json::<GenerateResponse>().await.map_err(|e| {
            if e.is_decode() {
                GenerationError::MalformedResponse(e.to_string())
            } else {
                GenerationError::Transport(e.to_string())
            }
        })?;
        debug!(bytes = parsed.response.len(), "generator responded");
        Ok(parsed.response)
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_owned(),
    }
}
