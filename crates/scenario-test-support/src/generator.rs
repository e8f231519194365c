//! Scripted generator: a `ScenarioGenerator` with canned responses.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use scenario_core::generator::{GenerationError, ScenarioGenerator};
use tokio::sync::Semaphore;

/// A generator that answers from a queue of canned results and records every
/// prompt it receives. When the queue runs dry it keeps repeating the last
/// configured result.
///
/// A gated generator holds every response until [`ScriptedGenerator::release`]
/// is called, which lets tests interleave events with an in-flight request.
#[derive(Debug, Clone)]
pub struct ScriptedGenerator {
    responses: Arc<Mutex<VecDeque<Result<String, GenerationError>>>>,
    last: Arc<Mutex<Option<Result<String, GenerationError>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedGenerator {
    fn with_results(results: Vec<Result<String, GenerationError>>, gated: bool) -> Self {
        Self {
            responses: Arc::new(Mutex::new(results.into())),
            last: Arc::new(Mutex::new(None)),
            prompts: Arc::new(Mutex::new(Vec::new())),
            gate: gated.then(|| Arc::new(Semaphore::new(0))),
        }
    }

    /// A generator that always succeeds with `raw`.
    #[must_use]
    pub fn succeeding(raw: impl Into<String>) -> Self {
        Self::with_results(vec![Ok(raw.into())], false)
    }

    /// A generator that always fails with `error`.
    #[must_use]
    pub fn failing(error: GenerationError) -> Self {
        Self::with_results(vec![Err(error)], false)
    }

    /// A generator that answers `results` in order.
    #[must_use]
    pub fn sequence(results: Vec<Result<String, GenerationError>>) -> Self {
        Self::with_results(results, false)
    }

    /// A generator that succeeds with `raw`, but only once released.
    #[must_use]
    pub fn gated(raw: impl Into<String>) -> Self {
        Self::with_results(vec![Ok(raw.into())], true)
    }

    /// Lets one held request complete. No-op for ungated generators.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    /// Number of requests received so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// Every prompt received, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next_result(&self) -> Result<String, GenerationError> {
        let mut last = self.last.lock().unwrap();
        if let Some(result) = self.responses.lock().unwrap().pop_front() {
            *last = Some(result);
        }
        last.clone()
            .unwrap_or_else(|| Err(GenerationError::Transport("no scripted response".into())))
    }
}

#[async_trait]
impl ScenarioGenerator for ScriptedGenerator {
    async fn request(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_owned());
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.next_result()
    }
}
