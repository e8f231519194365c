//! The scenario synchronization protocol.
//!
//! One `SyncProtocol` runs per participant. It is driven by exactly one task
//! (see [`crate::application::dispatch`]) that feeds it membership events and
//! generator completions one at a time, so its state needs no locking. If
//! events were ever delivered concurrently, `handle_event` and
//! `handle_generation_outcome` would have to share one mutual-exclusion
//! region to keep the at-most-one-generation guarantee.

use std::collections::BTreeMap;
use std::sync::Arc;

use scenario_core::clock::Clock;
use scenario_core::generator::{GenerationError, ScenarioGenerator};
use scenario_core::membership::{
    Delivery, MembershipEvent, MembershipLayer, SCENARIO_EVENT_CODE, SCENARIO_KEY,
};
use scenario_core::presentation::PresentationSink;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::events::ScenarioNotification;
use crate::domain::scenario::{Readiness, ScenarioSnapshot, ScenarioSource, ScenarioStatus};
use crate::domain::store::{ScenarioHandle, ScenarioStore};
use crate::domain::text::clean_generated_text;
use crate::error::SyncError;

/// Prompt sent to the generator unless configured otherwise.
pub const DEFAULT_PROMPT: &str = "Generate a project scenario";

const NOTIFICATION_CAPACITY: usize = 16;

/// Collaborators the protocol is wired to.
#[derive(Clone)]
pub struct ProtocolPorts {
    /// Room the participant belongs to.
    pub membership: Arc<dyn MembershipLayer>,
    /// Content generator, only ever called by the coordinator.
    pub generator: Arc<dyn ScenarioGenerator>,
    /// Where text and status lines are displayed.
    pub sink: Arc<dyn PresentationSink>,
    /// Time source for apply diagnostics.
    pub clock: Arc<dyn Clock>,
}

/// Tunables of the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSettings {
    /// Fixed prompt sent to the generator and stripped from its echo.
    pub prompt: String,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_owned(),
        }
    }
}

/// Completion of a generator request, fed back into the protocol.
#[derive(Debug)]
pub struct GenerationOutcome {
    /// Epoch the request was issued in.
    pub epoch: u64,
    /// Correlation ID of the request, for tracing.
    pub correlation_id: Uuid,
    /// Raw generator result.
    pub result: Result<String, GenerationError>,
}

/// Per-participant protocol state machine.
pub struct SyncProtocol {
    ports: ProtocolPorts,
    settings: ProtocolSettings,
    store: ScenarioStore,
    joined: bool,
    /// Epoch of the generator request still running, if any.
    in_flight: Option<u64>,
    completions: mpsc::UnboundedSender<GenerationOutcome>,
    notifications: broadcast::Sender<ScenarioNotification>,
}

impl SyncProtocol {
    /// Creates a protocol in the Absent state, not yet joined.
    ///
    /// Generator completions are posted to the returned receiver; the driver
    /// must hand each one back through
    /// [`SyncProtocol::handle_generation_outcome`].
    #[must_use]
    pub fn new(
        ports: ProtocolPorts,
        settings: ProtocolSettings,
    ) -> (Self, mpsc::UnboundedReceiver<GenerationOutcome>) {
        let (completions, completion_rx) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let protocol = Self {
            ports,
            settings,
            store: ScenarioStore::new(),
            joined: false,
            in_flight: None,
            completions,
            notifications,
        };
        (protocol, completion_rx)
    }

    /// Returns a read-only handle on the scenario store.
    #[must_use]
    pub fn handle(&self) -> ScenarioHandle {
        self.store.handle()
    }

    /// Subscribes to lifecycle notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ScenarioNotification> {
        self.notifications.subscribe()
    }

    /// Returns a copy of the current scenario state.
    #[must_use]
    pub fn snapshot(&self) -> ScenarioSnapshot {
        self.store.get()
    }

    /// Handles one membership notification. Never fails: problems are
    /// logged and the protocol keeps running.
    #[instrument(skip(self, event), fields(event = event.kind(), epoch = self.store.epoch()))]
    pub async fn handle_event(&mut self, event: MembershipEvent) {
        let result = match event {
            MembershipEvent::Joined => self.on_joined().await,
            MembershipEvent::DurableStateChanged(changed) => {
                self.on_durable_state_changed(&changed)
            }
            MembershipEvent::BroadcastReceived {
                event_code,
                payload,
            } => self.on_broadcast(event_code, &payload),
            MembershipEvent::Left => {
                self.on_left();
                Ok(())
            }
        };
        if let Err(err) = result {
            report(&err);
        }
    }

    /// Handles the completion of a generator request. Never fails: problems
    /// are logged and the protocol keeps running.
    #[instrument(
        skip(self, outcome),
        fields(epoch = outcome.epoch, correlation_id = %outcome.correlation_id)
    )]
    pub async fn handle_generation_outcome(&mut self, outcome: GenerationOutcome) {
        if let Err(err) = self.on_generation_outcome(outcome).await {
            report(&err);
        }
    }

    async fn on_joined(&mut self) -> Result<(), SyncError> {
        if self.joined {
            debug!("already joined; ignoring repeated join notification");
            return Ok(());
        }
        self.joined = true;

        if self.ports.membership.is_coordinator() {
            info!("joined as coordinator; generating scenario");
            return self.start_generation();
        }

        match self.ports.membership.durable_state(SCENARIO_KEY).await? {
            Some(value) => {
                let text = scenario_text(&value, ScenarioSource::CatchUp)?;
                self.apply(&text, ScenarioSource::CatchUp)
            }
            None => {
                info!("joined as participant; waiting for scenario from coordinator");
                self.ports.sink.show_status(Readiness::NotReady.message());
                Ok(())
            }
        }
    }

    fn start_generation(&mut self) -> Result<(), SyncError> {
        let epoch = self.store.set_pending()?;
        self.ports.sink.show_status(Readiness::Generating.message());

        if let Some(previous) = self.in_flight {
            // Issued once the earlier session's request has drained.
            debug!(previous_epoch = previous, "earlier request still running; deferring");
            return Ok(());
        }
        self.issue_request(epoch);
        Ok(())
    }

    fn issue_request(&mut self, epoch: u64) {
        let correlation_id = Uuid::new_v4();
        info!(%correlation_id, epoch, "requesting scenario from generator");
        self.in_flight = Some(epoch);

        let generator = Arc::clone(&self.ports.generator);
        let prompt = self.settings.prompt.clone();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = generator.request(&prompt).await;
            // A closed channel means the protocol is gone; nobody is left to tell.
            let _ = completions.send(GenerationOutcome {
                epoch,
                correlation_id,
                result,
            });
        });
    }

    async fn on_generation_outcome(
        &mut self,
        outcome: GenerationOutcome,
    ) -> Result<(), SyncError> {
        self.in_flight = None;
        let current = self.store.epoch();
        if outcome.epoch != current {
            // Pending in the current epoch means a deferred request is waiting.
            if self.store.get().status == ScenarioStatus::Pending {
                self.issue_request(current);
            }
            return Err(SyncError::StaleCompletion {
                completed: outcome.epoch,
                current,
            });
        }

        let raw = match outcome.result {
            Ok(raw) => raw,
            Err(err) => return Err(self.fail_generation(err)),
        };
        let text = clean_generated_text(&raw, &self.settings.prompt);
        if text.is_empty() {
            return Err(self.fail_generation(GenerationError::MalformedResponse(
                "response held no scenario text".into(),
            )));
        }

        self.apply(&text, ScenarioSource::Generated)?;
        self.publish(&text).await
    }

    fn fail_generation(&mut self, err: GenerationError) -> SyncError {
        let epoch = self.store.epoch();
        let reason = err.to_string();
        if let Err(transition) = self.store.fail(&reason) {
            return transition.into();
        }
        self.ports
            .sink
            .show_status(Readiness::ServiceUnavailable.message());
        self.notify(ScenarioNotification::GenerationFailed { epoch, reason });
        SyncError::Generation(err)
    }

    /// Stores the text in durable room state, then broadcasts it to the
    /// members connected right now. Both are attempted even if one fails.
    async fn publish(&self, text: &str) -> Result<(), SyncError> {
        let payload = Value::String(text.to_owned());
        let stored = self
            .ports
            .membership
            .set_durable_state(SCENARIO_KEY, payload.clone())
            .await;
        let sent = self
            .ports
            .membership
            .broadcast(SCENARIO_EVENT_CODE, payload, Delivery::reliable_to_others())
            .await;
        stored?;
        sent?;
        info!("scenario stored in room state and broadcast to other members");
        Ok(())
    }

    fn on_broadcast(&mut self, event_code: u8, payload: &Value) -> Result<(), SyncError> {
        if !self.joined {
            return Err(SyncError::NotJoined { event: "broadcast" });
        }
        if event_code != SCENARIO_EVENT_CODE {
            debug!(event_code, "ignoring broadcast with unrelated event code");
            return Ok(());
        }
        let text = scenario_text(payload, ScenarioSource::Broadcast)?;
        self.apply(&text, ScenarioSource::Broadcast)
    }

    fn on_durable_state_changed(
        &mut self,
        changed: &BTreeMap<String, Value>,
    ) -> Result<(), SyncError> {
        if !self.joined {
            return Err(SyncError::NotJoined {
                event: "durable state change",
            });
        }
        let Some(value) = changed.get(SCENARIO_KEY) else {
            return Ok(());
        };
        let text = scenario_text(value, ScenarioSource::DurableState)?;
        self.apply(&text, ScenarioSource::DurableState)
    }

    fn on_left(&mut self) {
        self.joined = false;
        let epoch = self.store.reset();
        self.ports.sink.clear();
        self.notify(ScenarioNotification::Reset { epoch });
        info!(epoch, "left room; scenario reset");
    }

    /// Shared by every receipt path. Idempotent apart from re-presenting
    /// the text.
    fn apply(&mut self, text: &str, source: ScenarioSource) -> Result<(), SyncError> {
        let changed = self.store.set_ready(text, source, self.ports.clock.now())?;
        self.ports.sink.show_text(text);
        if changed {
            info!(source = source.label(), "scenario applied");
            self.notify(ScenarioNotification::Ready {
                epoch: self.store.epoch(),
                text: text.to_owned(),
                source,
            });
        } else {
            debug!(source = source.label(), "scenario unchanged; re-presented");
        }
        Ok(())
    }

    fn notify(&self, notification: ScenarioNotification) {
        debug!(event_type = notification.event_type(), "notifying subscribers");
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }
}

fn scenario_text(value: &Value, origin: ScenarioSource) -> Result<String, SyncError> {
    match value.as_str() {
        Some(text) if !text.trim().is_empty() => Ok(text.to_owned()),
        Some(_) => Err(SyncError::MalformedPayload {
            origin: origin.label(),
            reason: "empty scenario text".into(),
        }),
        None => Err(SyncError::MalformedPayload {
            origin: origin.label(),
            reason: format!("expected a string, got {value}"),
        }),
    }
}

fn report(err: &SyncError) {
    if err.is_silent() {
        debug!(error = %err, "discarded");
    } else {
        warn!(error = %err, "scenario synchronization problem");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use scenario_core::generator::GenerationError;
    use scenario_core::membership::{
        Delivery, MembershipEvent, MembershipLayer, SCENARIO_EVENT_CODE, SCENARIO_KEY,
    };
    use scenario_test_support::{
        FailingMembership, FixedClock, PresentationCall, RecordingMembership,
        RecordingPresentationSink, ScriptedGenerator,
    };
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    use super::*;

    const RAW: &str = "Generate a project scenario\\nDo X, then Y";
    const CLEAN: &str = "Do X, then Y";

    struct Fixture {
        protocol: SyncProtocol,
        completions: mpsc::UnboundedReceiver<GenerationOutcome>,
        membership: Arc<RecordingMembership>,
        generator: ScriptedGenerator,
        sink: Arc<RecordingPresentationSink>,
    }

    fn fixture(membership: RecordingMembership, generator: ScriptedGenerator) -> Fixture {
        let membership = Arc::new(membership);
        let sink = Arc::new(RecordingPresentationSink::default());
        let ports = ProtocolPorts {
            membership: membership.clone(),
            generator: Arc::new(generator.clone()),
            sink: sink.clone(),
            clock: Arc::new(FixedClock::at_test_epoch()),
        };
        let (protocol, completions) = SyncProtocol::new(ports, ProtocolSettings::default());
        Fixture {
            protocol,
            completions,
            membership,
            generator,
            sink,
        }
    }

    impl Fixture {
        async fn complete_next_generation(&mut self) {
            let outcome = self.completions.recv().await.unwrap();
            self.protocol.handle_generation_outcome(outcome).await;
        }
    }

    fn broadcast_event(text: &str) -> MembershipEvent {
        MembershipEvent::BroadcastReceived {
            event_code: SCENARIO_EVENT_CODE,
            payload: Value::String(text.to_owned()),
        }
    }

    fn durable_event(text: &str) -> MembershipEvent {
        MembershipEvent::DurableStateChanged(
            [(SCENARIO_KEY.to_owned(), Value::String(text.to_owned()))].into(),
        )
    }

    #[tokio::test]
    async fn test_coordinator_generates_applies_stores_and_broadcasts() {
        // Arrange
        let mut fx = fixture(
            RecordingMembership::coordinator(),
            ScriptedGenerator::succeeding(RAW),
        );

        // Act
        fx.protocol.handle_event(MembershipEvent::Joined).await;
        assert_eq!(fx.protocol.snapshot().status, ScenarioStatus::Pending);
        fx.complete_next_generation().await;

        // Assert
        assert_eq!(fx.generator.prompts(), vec![DEFAULT_PROMPT.to_owned()]);

        let state = fx.protocol.snapshot();
        assert_eq!(state.status, ScenarioStatus::Ready);
        assert_eq!(state.text, CLEAN);
        assert_eq!(state.source, Some(ScenarioSource::Generated));

        assert_eq!(fx.membership.durable(SCENARIO_KEY), Some(json!(CLEAN)));

        let broadcasts = fx.membership.broadcasts();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(broadcasts[0].event_code, SCENARIO_EVENT_CODE);
        assert_eq!(broadcasts[0].payload, json!(CLEAN));
        assert_eq!(broadcasts[0].delivery, Delivery::reliable_to_others());

        assert_eq!(
            fx.sink.calls(),
            vec![
                PresentationCall::Status(Readiness::Generating.message().to_owned()),
                PresentationCall::Text(CLEAN.to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn test_coordinator_is_not_retriggered_by_its_own_propagation() {
        // Arrange
        let mut fx = fixture(
            RecordingMembership::coordinator(),
            ScriptedGenerator::succeeding(RAW),
        );
        fx.protocol.handle_event(MembershipEvent::Joined).await;
        fx.complete_next_generation().await;

        // Act
        fx.protocol.handle_event(durable_event(CLEAN)).await;
        fx.protocol.handle_event(broadcast_event(CLEAN)).await;
        fx.protocol.handle_event(MembershipEvent::Joined).await;

        // Assert
        assert_eq!(fx.generator.calls(), 1);
        assert_eq!(fx.membership.writes().len(), 1);
        assert_eq!(fx.membership.broadcasts().len(), 1);
        assert!(fx.completions.try_recv().is_err());
        assert_eq!(fx.protocol.snapshot().source, Some(ScenarioSource::Generated));
    }

    /// Records how much had been published each time text was shown.
    struct PublishWatchingSink {
        membership: Arc<RecordingMembership>,
        seen: std::sync::Mutex<Vec<(usize, usize)>>,
    }

    impl PresentationSink for PublishWatchingSink {
        fn show_text(&self, _text: &str) {
            let published = (
                self.membership.writes().len(),
                self.membership.broadcasts().len(),
            );
            self.seen.lock().unwrap().push(published);
        }

        fn show_status(&self, _status: &str) {}

        fn clear(&self) {}
    }

    #[tokio::test]
    async fn test_coordinator_shows_text_before_publishing_it() {
        // Arrange
        let membership = Arc::new(RecordingMembership::coordinator());
        let sink = Arc::new(PublishWatchingSink {
            membership: membership.clone(),
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let ports = ProtocolPorts {
            membership: membership.clone(),
            generator: Arc::new(ScriptedGenerator::succeeding(RAW)),
            sink: sink.clone(),
            clock: Arc::new(FixedClock::at_test_epoch()),
        };
        let (mut protocol, mut completions) = SyncProtocol::new(ports, ProtocolSettings::default());

        // Act
        protocol.handle_event(MembershipEvent::Joined).await;
        let outcome = completions.recv().await.unwrap();
        protocol.handle_generation_outcome(outcome).await;

        // Assert
        assert_eq!(*sink.seen.lock().unwrap(), vec![(0, 0)]);
        assert_eq!(membership.writes().len(), 1);
        assert_eq!(membership.broadcasts().len(), 1);
    }

    #[tokio::test]
    async fn test_coordinator_failure_returns_to_absent_with_service_unavailable() {
        // Arrange
        let mut fx = fixture(
            RecordingMembership::coordinator(),
            ScriptedGenerator::failing(GenerationError::Status {
                status: 500,
                body: "internal error".into(),
            }),
        );
        let mut notifications = fx.protocol.subscribe();

        // Act
        fx.protocol.handle_event(MembershipEvent::Joined).await;
        fx.complete_next_generation().await;

        // Assert
        let state = fx.protocol.snapshot();
        assert_eq!(state.status, ScenarioStatus::Absent);
        assert!(state.text.is_empty());
        assert_eq!(state.readiness(), Readiness::ServiceUnavailable);
        assert!(fx.membership.writes().is_empty());
        assert!(fx.membership.broadcasts().is_empty());
        assert_eq!(
            fx.sink.last(),
            Some(PresentationCall::Status(
                Readiness::ServiceUnavailable.message().to_owned()
            ))
        );
        match notifications.recv().await.unwrap() {
            ScenarioNotification::GenerationFailed { epoch, reason } => {
                assert_eq!(epoch, 0);
                assert!(reason.contains("500"));
            }
            other => panic!("expected GenerationFailed, got {other:?}"),
        }
        assert_eq!(fx.generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_response_that_only_echoes_prompt_counts_as_failure() {
        let mut fx = fixture(
            RecordingMembership::coordinator(),
            ScriptedGenerator::succeeding("Generate a project scenario"),
        );

        fx.protocol.handle_event(MembershipEvent::Joined).await;
        fx.complete_next_generation().await;

        assert_eq!(
            fx.protocol.snapshot().readiness(),
            Readiness::ServiceUnavailable
        );
        assert!(fx.membership.writes().is_empty());
    }

    #[tokio::test]
    async fn test_late_participant_catches_up_from_durable_state() {
        // Arrange
        let mut fx = fixture(
            RecordingMembership::participant().with_durable(SCENARIO_KEY, json!(CLEAN)),
            ScriptedGenerator::succeeding(RAW),
        );

        // Act
        fx.protocol.handle_event(MembershipEvent::Joined).await;

        // Assert
        let state = fx.protocol.snapshot();
        assert_eq!(state.status, ScenarioStatus::Ready);
        assert_eq!(state.text, CLEAN);
        assert_eq!(state.source, Some(ScenarioSource::CatchUp));
        assert_eq!(fx.generator.calls(), 0);
        assert!(fx.membership.writes().is_empty());
        assert!(fx.membership.broadcasts().is_empty());
        assert_eq!(fx.sink.calls(), vec![PresentationCall::Text(CLEAN.to_owned())]);
    }

    #[tokio::test]
    async fn test_participant_without_durable_state_waits_then_takes_broadcast() {
        // Arrange
        let mut fx = fixture(
            RecordingMembership::participant(),
            ScriptedGenerator::succeeding(RAW),
        );

        // Act
        fx.protocol.handle_event(MembershipEvent::Joined).await;
        let waiting = fx.protocol.snapshot();
        fx.protocol.handle_event(broadcast_event(CLEAN)).await;

        // Assert
        assert_eq!(waiting.status, ScenarioStatus::Absent);
        assert_eq!(waiting.readiness(), Readiness::NotReady);
        let state = fx.protocol.snapshot();
        assert_eq!(state.status, ScenarioStatus::Ready);
        assert_eq!(state.source, Some(ScenarioSource::Broadcast));
        assert_eq!(fx.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_participant_takes_durable_state_change() {
        let mut fx = fixture(
            RecordingMembership::participant(),
            ScriptedGenerator::succeeding(RAW),
        );

        fx.protocol.handle_event(MembershipEvent::Joined).await;
        fx.protocol.handle_event(durable_event(CLEAN)).await;

        let state = fx.protocol.snapshot();
        assert_eq!(state.text, CLEAN);
        assert_eq!(state.source, Some(ScenarioSource::DurableState));
    }

    #[tokio::test]
    async fn test_repeated_deliveries_of_same_text_equal_one_apply() {
        // Arrange
        let mut once = fixture(
            RecordingMembership::participant(),
            ScriptedGenerator::succeeding(RAW),
        );
        let mut many = fixture(
            RecordingMembership::participant(),
            ScriptedGenerator::succeeding(RAW),
        );
        once.protocol.handle_event(MembershipEvent::Joined).await;
        many.protocol.handle_event(MembershipEvent::Joined).await;
        let mut notifications = many.protocol.subscribe();

        // Act
        once.protocol.handle_event(broadcast_event(CLEAN)).await;
        for event in [
            broadcast_event(CLEAN),
            durable_event(CLEAN),
            broadcast_event(CLEAN),
            durable_event(CLEAN),
        ] {
            many.protocol.handle_event(event).await;
        }

        // Assert
        assert_eq!(many.protocol.snapshot(), once.protocol.snapshot());
        assert!(matches!(
            notifications.try_recv(),
            Ok(ScenarioNotification::Ready { .. })
        ));
        assert!(notifications.try_recv().is_err());
        assert!(
            many.sink
                .calls()
                .iter()
                .skip(1)
                .all(|call| *call == PresentationCall::Text(CLEAN.to_owned()))
        );
    }

    #[tokio::test]
    async fn test_differing_text_last_write_wins() {
        let mut fx = fixture(
            RecordingMembership::participant(),
            ScriptedGenerator::succeeding(RAW),
        );
        fx.protocol.handle_event(MembershipEvent::Joined).await;

        fx.protocol.handle_event(broadcast_event("Do X")).await;
        fx.protocol.handle_event(durable_event("Do Y")).await;

        assert_eq!(fx.protocol.snapshot().text, "Do Y");
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_ignored() {
        // Arrange
        let mut fx = fixture(
            RecordingMembership::participant(),
            ScriptedGenerator::succeeding(RAW),
        );
        fx.protocol.handle_event(MembershipEvent::Joined).await;

        // Act
        fx.protocol
            .handle_event(MembershipEvent::BroadcastReceived {
                event_code: SCENARIO_EVENT_CODE,
                payload: json!({ "text": CLEAN }),
            })
            .await;
        fx.protocol
            .handle_event(MembershipEvent::DurableStateChanged(
                [(SCENARIO_KEY.to_owned(), json!(42))].into(),
            ))
            .await;
        fx.protocol.handle_event(broadcast_event("   ")).await;

        // Assert
        assert_eq!(fx.protocol.snapshot().status, ScenarioStatus::Absent);
    }

    #[tokio::test]
    async fn test_unrelated_broadcasts_and_keys_are_ignored() {
        let mut fx = fixture(
            RecordingMembership::participant(),
            ScriptedGenerator::succeeding(RAW),
        );
        fx.protocol.handle_event(MembershipEvent::Joined).await;

        fx.protocol
            .handle_event(MembershipEvent::BroadcastReceived {
                event_code: 7,
                payload: json!(CLEAN),
            })
            .await;
        fx.protocol
            .handle_event(MembershipEvent::DurableStateChanged(
                [("seats".to_owned(), json!(CLEAN))].into(),
            ))
            .await;

        assert_eq!(fx.protocol.snapshot().status, ScenarioStatus::Absent);
    }

    #[tokio::test]
    async fn test_events_before_join_are_discarded() {
        let mut fx = fixture(
            RecordingMembership::participant(),
            ScriptedGenerator::succeeding(RAW),
        );

        fx.protocol.handle_event(broadcast_event(CLEAN)).await;
        fx.protocol.handle_event(durable_event(CLEAN)).await;

        assert_eq!(fx.protocol.snapshot().status, ScenarioStatus::Absent);
    }

    #[tokio::test]
    async fn test_departure_resets_and_clears_presentation() {
        // Arrange
        let mut fx = fixture(
            RecordingMembership::participant().with_durable(SCENARIO_KEY, json!(CLEAN)),
            ScriptedGenerator::succeeding(RAW),
        );
        fx.protocol.handle_event(MembershipEvent::Joined).await;
        let mut notifications = fx.protocol.subscribe();

        // Act
        fx.protocol.handle_event(MembershipEvent::Left).await;

        // Assert
        let state = fx.protocol.snapshot();
        assert_eq!(state.status, ScenarioStatus::Absent);
        assert!(state.text.is_empty());
        assert_eq!(state.epoch, 1);
        assert_eq!(fx.sink.last(), Some(PresentationCall::Clear));
        assert_eq!(
            notifications.recv().await.unwrap(),
            ScenarioNotification::Reset { epoch: 1 }
        );
    }

    #[tokio::test]
    async fn test_rejoin_with_fresh_room_state_reconverges() {
        // Arrange
        let mut fx = fixture(
            RecordingMembership::participant().with_durable(SCENARIO_KEY, json!("Old plan")),
            ScriptedGenerator::succeeding(RAW),
        );
        fx.protocol.handle_event(MembershipEvent::Joined).await;
        fx.protocol.handle_event(MembershipEvent::Left).await;
        fx.membership.clear_durable();

        // Act
        fx.protocol.handle_event(MembershipEvent::Joined).await;
        let waiting = fx.protocol.snapshot();
        fx.protocol.handle_event(broadcast_event("New plan")).await;

        // Assert
        assert_eq!(waiting.status, ScenarioStatus::Absent);
        let state = fx.protocol.snapshot();
        assert_eq!(state.status, ScenarioStatus::Ready);
        assert_eq!(state.text, "New plan");
        assert_eq!(state.epoch, 1);
        assert_eq!(fx.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_completion_after_departure_is_discarded() {
        // Arrange
        let generator = ScriptedGenerator::gated(RAW);
        let mut fx = fixture(RecordingMembership::coordinator(), generator.clone());
        fx.protocol.handle_event(MembershipEvent::Joined).await;

        // Act
        fx.protocol.handle_event(MembershipEvent::Left).await;
        generator.release();
        fx.complete_next_generation().await;

        // Assert
        let state = fx.protocol.snapshot();
        assert_eq!(state.status, ScenarioStatus::Absent);
        assert_eq!(state.readiness(), Readiness::NotReady);
        assert!(fx.membership.writes().is_empty());
        assert!(fx.membership.broadcasts().is_empty());
    }

    #[tokio::test]
    async fn test_rejoin_during_stale_request_defers_new_request() {
        // Arrange
        let generator = ScriptedGenerator::gated(RAW);
        let mut fx = fixture(RecordingMembership::coordinator(), generator.clone());
        fx.protocol.handle_event(MembershipEvent::Joined).await;
        fx.protocol.handle_event(MembershipEvent::Left).await;

        // Act: rejoin while the first request is still held.
        fx.protocol.handle_event(MembershipEvent::Joined).await;
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        let deferred_calls = fx.generator.calls();
        let deferred_status = fx.protocol.snapshot().status;
        generator.release();
        fx.complete_next_generation().await;
        generator.release();
        fx.complete_next_generation().await;

        // Assert
        assert_eq!(deferred_calls, 1);
        assert_eq!(deferred_status, ScenarioStatus::Pending);
        assert_eq!(fx.generator.calls(), 2);
        let state = fx.protocol.snapshot();
        assert_eq!(state.status, ScenarioStatus::Ready);
        assert_eq!(state.epoch, 1);
        assert_eq!(state.text, CLEAN);
        assert_eq!(fx.membership.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_during_pending_generation_marks_ready() {
        // Arrange
        let generator = ScriptedGenerator::gated(RAW);
        let mut fx = fixture(RecordingMembership::coordinator(), generator.clone());
        fx.protocol.handle_event(MembershipEvent::Joined).await;

        // Act
        fx.protocol.handle_event(broadcast_event(CLEAN)).await;
        let before_completion = fx.protocol.snapshot();
        generator.release();
        fx.complete_next_generation().await;

        // Assert
        assert_eq!(before_completion.status, ScenarioStatus::Ready);
        assert_eq!(fx.protocol.snapshot().text, CLEAN);
        assert_eq!(fx.generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_membership_failure_keeps_local_scenario() {
        // Arrange
        let membership: Arc<dyn MembershipLayer> =
            Arc::new(FailingMembership { coordinator: true });
        let sink = Arc::new(RecordingPresentationSink::default());
        let ports = ProtocolPorts {
            membership,
            generator: Arc::new(ScriptedGenerator::succeeding(RAW)),
            sink: sink.clone(),
            clock: Arc::new(FixedClock::at_test_epoch()),
        };
        let (mut protocol, mut completions) = SyncProtocol::new(ports, ProtocolSettings::default());

        // Act
        protocol.handle_event(MembershipEvent::Joined).await;
        let outcome = completions.recv().await.unwrap();
        protocol.handle_generation_outcome(outcome).await;

        // Assert
        let state = protocol.snapshot();
        assert_eq!(state.status, ScenarioStatus::Ready);
        assert_eq!(state.text, CLEAN);
        assert_eq!(sink.last(), Some(PresentationCall::Text(CLEAN.to_owned())));
    }

    #[tokio::test]
    async fn test_participant_with_unreachable_room_keeps_waiting() {
        let sink = Arc::new(RecordingPresentationSink::default());
        let generator = ScriptedGenerator::succeeding(RAW);
        let ports = ProtocolPorts {
            membership: Arc::new(FailingMembership { coordinator: false }),
            generator: Arc::new(generator.clone()),
            sink,
            clock: Arc::new(FixedClock::at_test_epoch()),
        };
        let (mut protocol, _completions) = SyncProtocol::new(ports, ProtocolSettings::default());

        protocol.handle_event(MembershipEvent::Joined).await;
        protocol.handle_event(broadcast_event(CLEAN)).await;

        assert_eq!(protocol.snapshot().status, ScenarioStatus::Ready);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_custom_prompt_is_sent_and_stripped() {
        // Arrange
        let membership = Arc::new(RecordingMembership::coordinator());
        let generator = ScriptedGenerator::succeeding("Plan a heist\\nCrack the vault");
        let ports = ProtocolPorts {
            membership: membership.clone(),
            generator: Arc::new(generator.clone()),
            sink: Arc::new(RecordingPresentationSink::default()),
            clock: Arc::new(FixedClock::at_test_epoch()),
        };
        let settings = ProtocolSettings {
            prompt: "Plan a heist".into(),
        };
        let (mut protocol, mut completions) = SyncProtocol::new(ports, settings);

        // Act
        protocol.handle_event(MembershipEvent::Joined).await;
        let outcome = completions.recv().await.unwrap();
        protocol.handle_generation_outcome(outcome).await;

        // Assert
        assert_eq!(generator.prompts(), vec!["Plan a heist".to_owned()]);
        assert_eq!(protocol.snapshot().text, "Crack the vault");
        assert_eq!(membership.durable(SCENARIO_KEY), Some(json!("Crack the vault")));
    }
}
