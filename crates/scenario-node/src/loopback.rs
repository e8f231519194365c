//! In-process room transport.
//!
//! `LoopbackRoom` implements the membership capabilities for participants
//! living in the same process:
//!
//! - the first member to join (in join order) is the coordinator;
//! - a durable-state write is announced to every member, writer included;
//! - a broadcast reaches the members selected by its `Delivery`;
//! - durable state disappears when the last member leaves.
//!
//! Every participant's notifications go through its own unbounded channel,
//! so delivery to one participant is serialized and in order.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use scenario_core::error::DomainError;
use scenario_core::membership::{Delivery, MembershipEvent, MembershipLayer, Targets};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Identifier of a connection to the room.
pub type MemberId = u64;

#[derive(Debug, Default)]
struct RoomState {
    next_id: MemberId,
    connections: HashMap<MemberId, mpsc::UnboundedSender<MembershipEvent>>,
    members: Vec<MemberId>,
    durable: HashMap<String, Value>,
}

impl RoomState {
    fn deliver(&self, id: MemberId, event: MembershipEvent) {
        let kind = event.kind();
        let delivered = self
            .connections
            .get(&id)
            .is_some_and(|events| events.send(event).is_ok());
        if !delivered {
            debug!(member = id, event = kind, "member no longer listening; dropped");
        }
    }

    fn require_member(&self, id: MemberId) -> Result<(), DomainError> {
        if self.members.contains(&id) {
            Ok(())
        } else {
            Err(DomainError::Infrastructure(format!(
                "member {id} is not in the room"
            )))
        }
    }
}

/// A room shared by in-process participants.
#[derive(Debug, Clone, Default)]
pub struct LoopbackRoom {
    state: Arc<Mutex<RoomState>>,
}

impl LoopbackRoom {
    /// Creates an empty room.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a connection whose notifications are sent to `events`. The
    /// connection is not a member until [`LoopbackMember::join`].
    #[must_use]
    pub fn connect(&self, events: mpsc::UnboundedSender<MembershipEvent>) -> LoopbackMember {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.connections.insert(id, events);
        LoopbackMember {
            room: self.clone(),
            id,
        }
    }

    /// Number of joined members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.lock().members.len()
    }

    /// Current value of a durable entry.
    #[must_use]
    pub fn durable(&self, key: &str) -> Option<Value> {
        self.lock().durable.get(key).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One participant's connection to a [`LoopbackRoom`].
#[derive(Debug, Clone)]
pub struct LoopbackMember {
    room: LoopbackRoom,
    id: MemberId,
}

impl LoopbackMember {
    /// Connection identifier.
    #[must_use]
    pub fn id(&self) -> MemberId {
        self.id
    }

    /// Whether the connection is currently a room member.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.room.lock().members.contains(&self.id)
    }

    /// Joins the room and notifies the participant.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if already joined or disconnected.
    pub fn join(&self) -> Result<(), DomainError> {
        let mut state = self.room.lock();
        if !state.connections.contains_key(&self.id) {
            return Err(DomainError::Validation(format!(
                "member {} is disconnected",
                self.id
            )));
        }
        if state.members.contains(&self.id) {
            return Err(DomainError::Validation(format!(
                "member {} already joined",
                self.id
            )));
        }
        state.members.push(self.id);
        info!(member = self.id, members = state.members.len(), "member joined room");
        state.deliver(self.id, MembershipEvent::Joined);
        Ok(())
    }

    /// Leaves the room and notifies the participant. The room forgets its
    /// durable state once nobody is left.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if not joined.
    pub fn leave(&self) -> Result<(), DomainError> {
        let mut state = self.room.lock();
        let Some(position) = state.members.iter().position(|id| *id == self.id) else {
            return Err(DomainError::Validation(format!(
                "member {} is not in the room",
                self.id
            )));
        };
        state.members.remove(position);
        if state.members.is_empty() {
            state.durable.clear();
            debug!("room empty; durable state discarded");
        }
        info!(member = self.id, members = state.members.len(), "member left room");
        state.deliver(self.id, MembershipEvent::Left);
        Ok(())
    }

    /// Leaves if joined, then closes the connection so the participant's
    /// event source ends.
    pub fn disconnect(&self) {
        if self.is_joined() {
            // Membership was checked just above.
            let _ = self.leave();
        }
        self.room.lock().connections.remove(&self.id);
    }
}

#[async_trait]
impl MembershipLayer for LoopbackMember {
    fn is_coordinator(&self) -> bool {
        self.room.lock().members.first() == Some(&self.id)
    }

    async fn durable_state(&self, key: &str) -> Result<Option<Value>, DomainError> {
        let state = self.room.lock();
        state.require_member(self.id)?;
        Ok(state.durable.get(key).cloned())
    }

    async fn set_durable_state(&self, key: &str, value: Value) -> Result<(), DomainError> {
        let mut state = self.room.lock();
        state.require_member(self.id)?;
        state.durable.insert(key.to_owned(), value.clone());
        let changed: BTreeMap<String, Value> = [(key.to_owned(), value)].into();
        for id in &state.members {
            state.deliver(*id, MembershipEvent::DurableStateChanged(changed.clone()));
        }
        Ok(())
    }

    async fn broadcast(
        &self,
        event_code: u8,
        payload: Value,
        delivery: Delivery,
    ) -> Result<(), DomainError> {
        let state = self.room.lock();
        state.require_member(self.id)?;
        let receivers = state
            .members
            .iter()
            .filter(|id| delivery.targets == Targets::All || **id != self.id);
        for id in receivers {
            state.deliver(
                *id,
                MembershipEvent::BroadcastReceived {
                    event_code,
                    payload: payload.clone(),
                },
            );
        }
        Ok(())
    }
}
