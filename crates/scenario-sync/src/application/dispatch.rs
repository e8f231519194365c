//! Event dispatch loop.
//!
//! The membership layer is injected as a channel of [`MembershipEvent`]s.
//! One task owns the protocol and interleaves those events with generator
//! completions, handling each to the end before taking the next.

use scenario_core::membership::MembershipEvent;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::info;

use crate::application::protocol::{
    GenerationOutcome, ProtocolPorts, ProtocolSettings, SyncProtocol,
};
use crate::domain::events::ScenarioNotification;
use crate::domain::store::ScenarioHandle;

/// A protocol running on its own task.
#[derive(Debug)]
pub struct RunningProtocol {
    /// Read-only view of the participant's scenario.
    pub scenario: ScenarioHandle,
    /// Lifecycle notifications, subscribed before the first event.
    pub notifications: broadcast::Receiver<ScenarioNotification>,
    /// The dispatch task; finishes once the event source closes.
    pub task: JoinHandle<()>,
}

/// Builds a protocol and spawns its dispatch loop on the current runtime.
#[must_use]
pub fn spawn(
    ports: ProtocolPorts,
    settings: ProtocolSettings,
    events: mpsc::UnboundedReceiver<MembershipEvent>,
) -> RunningProtocol {
    let (protocol, completions) = SyncProtocol::new(ports, settings);
    let scenario = protocol.handle();
    let notifications = protocol.subscribe();
    let task = tokio::spawn(run(protocol, completions, events));
    RunningProtocol {
        scenario,
        notifications,
        task,
    }
}

/// Drives `protocol` until `events` closes. A generator request still
/// running at that point is abandoned.
pub async fn run(
    mut protocol: SyncProtocol,
    mut completions: mpsc::UnboundedReceiver<GenerationOutcome>,
    mut events: mpsc::UnboundedReceiver<MembershipEvent>,
) {
    info!("scenario protocol started");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => protocol.handle_event(event).await,
                None => break,
            },
            Some(outcome) = completions.recv() => {
                protocol.handle_generation_outcome(outcome).await;
            }
        }
    }
    info!("event source closed; scenario protocol stopped");
}
