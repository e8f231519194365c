//! A participant: one protocol instance connected to a loopback room.

use std::sync::Arc;
use std::time::Duration;

use scenario_core::clock::Clock;
use scenario_core::generator::ScenarioGenerator;
use scenario_core::presentation::PresentationSink;
use scenario_sync::application::dispatch::{self, RunningProtocol};
use scenario_sync::application::protocol::{ProtocolPorts, ProtocolSettings};
use scenario_sync::domain::events::ScenarioNotification;
use scenario_sync::domain::scenario::{ScenarioSnapshot, ScenarioStatus};
use scenario_sync::domain::store::ScenarioHandle;
use tokio::sync::{broadcast, mpsc};

use crate::error::NodeError;
use crate::loopback::{LoopbackMember, LoopbackRoom};

/// Shared collaborators for every participant in a room.
#[derive(Clone)]
pub struct ParticipantDeps {
    /// Generator the coordinator will call.
    pub generator: Arc<dyn ScenarioGenerator>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Protocol settings.
    pub settings: ProtocolSettings,
}

/// One participant running its own protocol task.
#[derive(Debug)]
pub struct Participant {
    name: String,
    member: LoopbackMember,
    running: RunningProtocol,
}

impl Participant {
    /// Connects to `room` and starts the protocol. The participant is not a
    /// member until [`Participant::join`].
    #[must_use]
    pub fn spawn(
        name: impl Into<String>,
        room: &LoopbackRoom,
        deps: &ParticipantDeps,
        sink: Arc<dyn PresentationSink>,
    ) -> Self {
        let (events, events_rx) = mpsc::unbounded_channel();
        let member = room.connect(events);
        let ports = ProtocolPorts {
            membership: Arc::new(member.clone()),
            generator: Arc::clone(&deps.generator),
            sink,
            clock: Arc::clone(&deps.clock),
        };
        let running = dispatch::spawn(ports, deps.settings.clone(), events_rx);
        Self {
            name: name.into(),
            member,
            running,
        }
    }

    /// Participant name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The room connection.
    #[must_use]
    pub fn member(&self) -> &LoopbackMember {
        &self.member
    }

    /// Read-only view of this participant's scenario.
    #[must_use]
    pub fn scenario(&self) -> &ScenarioHandle {
        &self.running.scenario
    }

    /// Lifecycle notifications of this participant.
    pub fn notifications(&mut self) -> &mut broadcast::Receiver<ScenarioNotification> {
        &mut self.running.notifications
    }

    /// Joins the room.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::Room` if already joined.
    pub fn join(&self) -> Result<(), NodeError> {
        Ok(self.member.join()?)
    }

    /// Leaves the room.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::Room` if not joined.
    pub fn leave(&self) -> Result<(), NodeError> {
        Ok(self.member.leave()?)
    }

    /// Waits until the scenario is Ready.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::Timeout` if that takes longer than `timeout`.
    pub async fn wait_for_ready(
        &mut self,
        timeout: Duration,
    ) -> Result<ScenarioSnapshot, NodeError> {
        self.wait_until(timeout, |state| state.status == ScenarioStatus::Ready)
            .await
    }

    /// Waits until the scenario is Ready or generation failed.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::Timeout` if that takes longer than `timeout`.
    pub async fn wait_until_settled(
        &mut self,
        timeout: Duration,
    ) -> Result<ScenarioSnapshot, NodeError> {
        self.wait_until(timeout, |state| {
            state.status == ScenarioStatus::Ready || state.failure.is_some()
        })
        .await
    }

    async fn wait_until(
        &mut self,
        timeout: Duration,
        predicate: impl FnMut(&ScenarioSnapshot) -> bool,
    ) -> Result<ScenarioSnapshot, NodeError> {
        match tokio::time::timeout(timeout, self.running.scenario.wait_until(predicate)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(NodeError::Timeout {
                participant: self.name.clone(),
                waited: timeout,
            }),
        }
    }

    /// Leaves the room if joined, closes the connection and waits for the
    /// protocol task to finish.
    pub async fn shutdown(self) {
        self.member.disconnect();
        if let Err(err) = self.running.task.await {
            tracing::warn!(
                participant = %self.name,
                error = %err,
                "protocol task ended abnormally"
            );
        }
    }
}
