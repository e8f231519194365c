//! Recording presentation sink.

use std::sync::Mutex;

use scenario_core::presentation::PresentationSink;

/// A call received by [`RecordingPresentationSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentationCall {
    /// `show_text` with the given text.
    Text(String),
    /// `show_status` with the given status line.
    Status(String),
    /// `clear`.
    Clear,
}

/// A sink that records every call for later assertions.
#[derive(Debug, Default)]
pub struct RecordingPresentationSink {
    calls: Mutex<Vec<PresentationCall>>,
}

impl RecordingPresentationSink {
    /// Returns a snapshot of all calls, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn calls(&self) -> Vec<PresentationCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Returns the most recent call, if any.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn last(&self) -> Option<PresentationCall> {
        self.calls.lock().unwrap().last().cloned()
    }
}

impl PresentationSink for RecordingPresentationSink {
    fn show_text(&self, text: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(PresentationCall::Text(text.to_owned()));
    }

    fn show_status(&self, status: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(PresentationCall::Status(status.to_owned()));
    }

    fn clear(&self) {
        self.calls.lock().unwrap().push(PresentationCall::Clear);
    }
}
