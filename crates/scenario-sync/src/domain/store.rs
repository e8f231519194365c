//! Local scenario store.
//!
//! The store is the single writer of the participant's scenario state. Every
//! change is published on a `watch` channel so readers (render ticks, gating
//! checks) can look at the latest snapshot without waiting on the protocol.

use chrono::{DateTime, Utc};
use scenario_core::error::DomainError;
use tokio::sync::watch;

use super::scenario::{Readiness, ScenarioSnapshot, ScenarioSource, ScenarioStatus};

/// Owner of the scenario lifecycle: Absent → Pending → Ready → Absent.
#[derive(Debug)]
pub struct ScenarioStore {
    state: watch::Sender<ScenarioSnapshot>,
}

impl Default for ScenarioStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioStore {
    /// Creates an empty store at epoch 0.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(ScenarioSnapshot::default());
        Self { state }
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn get(&self) -> ScenarioSnapshot {
        self.state.borrow().clone()
    }

    /// Returns the current room-session epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.state.borrow().epoch
    }

    /// Returns a read-only handle that observes every change.
    #[must_use]
    pub fn handle(&self) -> ScenarioHandle {
        ScenarioHandle {
            state: self.state.subscribe(),
        }
    }

    /// Absent → Pending. Returns the epoch the generation belongs to.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the store is Absent.
    pub fn set_pending(&self) -> Result<u64, DomainError> {
        let current = self.state.borrow().status;
        if current != ScenarioStatus::Absent {
            return Err(invalid(current, ScenarioStatus::Pending));
        }
        self.state.send_modify(|state| {
            state.status = ScenarioStatus::Pending;
            state.failure = None;
        });
        Ok(self.epoch())
    }

    /// Any status → Ready with `text`. Returns `true` when the visible
    /// scenario changed, `false` when the same text was already Ready.
    ///
    /// Source and time are only recorded on a change; repeating the same
    /// text leaves the snapshot untouched.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `text` is blank.
    pub fn set_ready(
        &self,
        text: &str,
        source: ScenarioSource,
        applied_at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        if text.trim().is_empty() {
            return Err(DomainError::Validation(
                "scenario text must not be empty".into(),
            ));
        }
        let changed = self.state.send_if_modified(|state| {
            let changed = state.status != ScenarioStatus::Ready || state.text != text;
            if changed {
                state.text = text.to_owned();
                state.status = ScenarioStatus::Ready;
                state.failure = None;
                state.source = Some(source);
                state.applied_at = Some(applied_at);
            }
            changed
        });
        Ok(changed)
    }

    /// Pending → Absent after a failed generation, remembering why.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the store is Pending.
    pub fn fail(&self, reason: &str) -> Result<(), DomainError> {
        let current = self.state.borrow().status;
        if current != ScenarioStatus::Pending {
            return Err(invalid(current, ScenarioStatus::Absent));
        }
        self.state.send_modify(|state| {
            state.status = ScenarioStatus::Absent;
            state.failure = Some(reason.to_owned());
        });
        Ok(())
    }

    /// Back to Absent for a new room session. Clears the text and advances
    /// the epoch so completions from the old session are recognisably stale.
    /// Returns the new epoch.
    pub fn reset(&self) -> u64 {
        self.state.send_modify(|state| {
            *state = ScenarioSnapshot {
                epoch: state.epoch + 1,
                ..ScenarioSnapshot::default()
            };
        });
        self.epoch()
    }
}

fn invalid(from: ScenarioStatus, to: ScenarioStatus) -> DomainError {
    DomainError::InvalidTransition {
        from: from.as_str(),
        to: to.as_str(),
    }
}

/// Cloneable read-only view of a [`ScenarioStore`].
#[derive(Debug, Clone)]
pub struct ScenarioHandle {
    state: watch::Receiver<ScenarioSnapshot>,
}

impl ScenarioHandle {
    /// Returns a copy of the latest state.
    #[must_use]
    pub fn snapshot(&self) -> ScenarioSnapshot {
        self.state.borrow().clone()
    }

    /// Returns the gating answer for the latest state.
    #[must_use]
    pub fn readiness(&self) -> Readiness {
        self.state.borrow().readiness()
    }

    /// Waits until the scenario is Ready and returns that state.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the store was dropped first.
    pub async fn wait_for_ready(&mut self) -> Result<ScenarioSnapshot, DomainError> {
        self.wait_until(|state| state.status == ScenarioStatus::Ready)
            .await
    }

    /// Waits until `predicate` holds for the latest state and returns it.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the store was dropped first.
    pub async fn wait_until(
        &mut self,
        predicate: impl FnMut(&ScenarioSnapshot) -> bool,
    ) -> Result<ScenarioSnapshot, DomainError> {
        let state = self
            .state
            .wait_for(predicate)
            .await
            .map_err(|_| DomainError::Infrastructure("scenario store dropped".into()))?;
        Ok(ScenarioSnapshot::clone(&state))
    }
}
