//! Query handlers for the scenario.
//!
//! Read-only questions asked by presentation code and by actions that depend
//! on the scenario. All of them read the latest store snapshot and never wait
//! on the protocol.

use chrono::{DateTime, Utc};
use scenario_core::presentation::PresentationSink;
use serde::Serialize;

use crate::domain::scenario::{Readiness, ScenarioSource, ScenarioStatus};
use crate::domain::store::ScenarioHandle;

/// Read-only view of the local scenario.
#[derive(Debug, Serialize)]
pub struct ScenarioView {
    /// Scenario text, present only when Ready.
    pub text: Option<String>,
    /// Lifecycle status.
    pub status: ScenarioStatus,
    /// Gating answer derived from the status.
    pub readiness: Readiness,
    /// Status line matching `readiness`.
    pub message: &'static str,
    /// Source of the most recent apply.
    pub source: Option<ScenarioSource>,
    /// When the most recent apply happened.
    pub applied_at: Option<DateTime<Utc>>,
    /// Room session counter.
    pub epoch: u64,
}

/// Outcome of the gating query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    /// Whether the dependent action may proceed.
    pub can_proceed: bool,
    /// Why not, or a confirmation when it may.
    pub message: &'static str,
}

/// Returns the current scenario view.
#[must_use]
pub fn get_scenario(handle: &ScenarioHandle) -> ScenarioView {
    let state = handle.snapshot();
    let readiness = state.readiness();
    ScenarioView {
        text: (state.status == ScenarioStatus::Ready).then_some(state.text),
        status: state.status,
        readiness,
        message: readiness.message(),
        source: state.source,
        applied_at: state.applied_at,
        epoch: state.epoch,
    }
}

/// Answers "may I proceed" for an action that relies on the scenario.
#[must_use]
pub fn check_gate(handle: &ScenarioHandle) -> GateDecision {
    let readiness = handle.readiness();
    GateDecision {
        can_proceed: readiness.can_proceed(),
        message: readiness.message(),
    }
}

/// Gate that also tells the user why they have to wait.
pub fn require_ready(handle: &ScenarioHandle, sink: &dyn PresentationSink) -> bool {
    let decision = check_gate(handle);
    if !decision.can_proceed {
        sink.show_status(decision.message);
    }
    decision.can_proceed
}

/// Presents the scenario if Ready, otherwise the readiness status line.
pub fn show_scenario(handle: &ScenarioHandle, sink: &dyn PresentationSink) {
    let state = handle.snapshot();
    match state.readiness() {
        Readiness::Ready => sink.show_text(&state.text),
        other => sink.show_status(other.message()),
    }
}
