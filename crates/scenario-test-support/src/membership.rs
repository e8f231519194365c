//! Test membership layers: fake `MembershipLayer` implementations.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use scenario_core::error::DomainError;
use scenario_core::membership::{Delivery, MembershipLayer};
use serde_json::Value;

/// A broadcast captured by [`RecordingMembership`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedBroadcast {
    /// Event code passed to `broadcast`.
    pub event_code: u8,
    /// Payload passed to `broadcast`.
    pub payload: Value,
    /// Delivery options passed to `broadcast`.
    pub delivery: Delivery,
}

/// A single-participant view of a room. Holds durable state in memory and
/// records every durable write and broadcast. It never delivers
/// notifications; tests feed `MembershipEvent`s to the protocol directly.
#[derive(Debug, Default)]
pub struct RecordingMembership {
    coordinator: AtomicBool,
    durable: Mutex<HashMap<String, Value>>,
    writes: Mutex<Vec<(String, Value)>>,
    broadcasts: Mutex<Vec<RecordedBroadcast>>,
}

impl RecordingMembership {
    /// A room in which the local participant is the coordinator.
    #[must_use]
    pub fn coordinator() -> Self {
        let membership = Self::default();
        membership.coordinator.store(true, Ordering::SeqCst);
        membership
    }

    /// A room in which the local participant is not the coordinator.
    #[must_use]
    pub fn participant() -> Self {
        Self::default()
    }

    /// Seeds a durable entry without recording it as a write.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn with_durable(self, key: &str, value: Value) -> Self {
        self.durable.lock().unwrap().insert(key.to_owned(), value);
        self
    }

    /// Clears every durable entry, as a brand-new room would.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn clear_durable(&self) {
        self.durable.lock().unwrap().clear();
    }

    /// Returns the current value of a durable entry.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn durable(&self, key: &str) -> Option<Value> {
        self.durable.lock().unwrap().get(key).cloned()
    }

    /// Returns every durable write, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn writes(&self) -> Vec<(String, Value)> {
        self.writes.lock().unwrap().clone()
    }

    /// Returns every broadcast, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn broadcasts(&self) -> Vec<RecordedBroadcast> {
        self.broadcasts.lock().unwrap().clone()
    }
}

#[async_trait]
impl MembershipLayer for RecordingMembership {
    fn is_coordinator(&self) -> bool {
        self.coordinator.load(Ordering::SeqCst)
    }

    async fn durable_state(&self, key: &str) -> Result<Option<Value>, DomainError> {
        Ok(self.durable.lock().unwrap().get(key).cloned())
    }

    async fn set_durable_state(&self, key: &str, value: Value) -> Result<(), DomainError> {
        self.durable
            .lock()
            .unwrap()
            .insert(key.to_owned(), value.clone());
        self.writes.lock().unwrap().push((key.to_owned(), value));
        Ok(())
    }

    async fn broadcast(
        &self,
        event_code: u8,
        payload: Value,
        delivery: Delivery,
    ) -> Result<(), DomainError> {
        self.broadcasts.lock().unwrap().push(RecordedBroadcast {
            event_code,
            payload,
            delivery,
        });
        Ok(())
    }
}

/// A membership layer whose every operation fails with an infrastructure
/// error. Useful for testing error-handling paths.
#[derive(Debug)]
pub struct FailingMembership {
    /// Role reported by `is_coordinator`.
    pub coordinator: bool,
}

#[async_trait]
impl MembershipLayer for FailingMembership {
    fn is_coordinator(&self) -> bool {
        self.coordinator
    }

    async fn durable_state(&self, _key: &str) -> Result<Option<Value>, DomainError> {
        Err(DomainError::Infrastructure("room unreachable".into()))
    }

    async fn set_durable_state(&self, _key: &str, _value: Value) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("room unreachable".into()))
    }

    async fn broadcast(
        &self,
        _event_code: u8,
        _payload: Value,
        _delivery: Delivery,
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("room unreachable".into()))
    }
}
