//! Shared test fakes for scenario synchronization.

mod clock;
mod generator;
mod membership;
mod presentation;

pub use clock::FixedClock;
pub use generator::ScriptedGenerator;
pub use membership::{FailingMembership, RecordedBroadcast, RecordingMembership};
pub use presentation::{PresentationCall, RecordingPresentationSink};
