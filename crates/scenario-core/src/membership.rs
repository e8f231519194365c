//! Group membership port.
//!
//! The membership layer owns room membership, the durable key-value state
//! attached to the room, reliable broadcast and coordinator designation. The
//! protocol consumes it through [`MembershipLayer`] and receives its
//! notifications as [`MembershipEvent`] values, delivered one at a time.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DomainError;

/// Durable room-state key holding the generated scenario text.
pub const SCENARIO_KEY: &str = "scenario";

/// Broadcast event code carrying the generated scenario text.
pub const SCENARIO_EVENT_CODE: u8 = 1;

/// Which members receive a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Targets {
    /// Every member except the sender.
    Others,
    /// Every member, sender included.
    All,
}

/// Delivery options for a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Whether the transport must deliver reliably.
    pub reliable: bool,
    /// Receivers of the broadcast.
    pub targets: Targets,
}

impl Delivery {
    /// Reliable delivery to every other member.
    #[must_use]
    pub const fn reliable_to_others() -> Self {
        Self {
            reliable: true,
            targets: Targets::Others,
        }
    }
}

/// Notifications delivered by the membership layer.
#[derive(Debug, Clone, PartialEq)]
pub enum MembershipEvent {
    /// The local participant finished joining the room.
    Joined,
    /// One or more durable room-state entries changed. Carries the new value
    /// of every changed key.
    DurableStateChanged(BTreeMap<String, Value>),
    /// A broadcast from another member arrived.
    BroadcastReceived {
        /// Event code chosen by the sender.
        event_code: u8,
        /// Opaque payload.
        payload: Value,
    },
    /// The local participant left the room.
    Left,
}

impl MembershipEvent {
    /// Short name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Joined => "joined",
            Self::DurableStateChanged(_) => "durable_state_changed",
            Self::BroadcastReceived { .. } => "broadcast_received",
            Self::Left => "left",
        }
    }
}

/// Capabilities of the room the local participant belongs to.
#[async_trait]
pub trait MembershipLayer: Send + Sync {
    /// Whether the local participant currently holds the coordinator role.
    fn is_coordinator(&self) -> bool;

    /// Reads a durable room-state entry.
    async fn durable_state(&self, key: &str) -> Result<Option<Value>, DomainError>;

    /// Overwrites a durable room-state entry.
    async fn set_durable_state(&self, key: &str, value: Value) -> Result<(), DomainError>;

    /// Sends a one-shot event to the current members selected by `delivery`.
    async fn broadcast(
        &self,
        event_code: u8,
        payload: Value,
        delivery: Delivery,
    ) -> Result<(), DomainError>;
}
