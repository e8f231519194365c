//! Scenario state as seen by one participant.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle status of the local scenario copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    /// Nothing received or generated in this room session.
    #[default]
    Absent,
    /// The coordinator asked the generator and is waiting for it.
    Pending,
    /// Scenario text is available.
    Ready,
}

impl ScenarioStatus {
    /// Lowercase name used in logs and transition errors.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Pending => "pending",
            Self::Ready => "ready",
        }
    }
}

/// Where an applied scenario came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioSource {
    /// Produced by the local generator request (coordinator only).
    Generated,
    /// Carried by the coordinator's broadcast.
    Broadcast,
    /// Read from durable room state right after joining.
    CatchUp,
    /// Delivered by a durable room-state change notification.
    DurableState,
}

impl ScenarioSource {
    /// Diagnostic label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Broadcast => "broadcast",
            Self::CatchUp => "catch-up",
            Self::DurableState => "durable-state",
        }
    }
}

/// Answer to "may a dependent action rely on the scenario yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// The scenario is available.
    Ready,
    /// The coordinator's generator request is outstanding.
    Generating,
    /// Nothing has arrived yet.
    NotReady,
    /// The last generation attempt in this session failed.
    ServiceUnavailable,
}

impl Readiness {
    /// Whether a dependent action may proceed.
    #[must_use]
    pub fn can_proceed(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// User-facing status line.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Ready => "Scenario ready",
            Self::Generating => "Generating scenario...",
            Self::NotReady => "Scenario not ready yet",
            Self::ServiceUnavailable => {
                "Scenario service unavailable. Unable to generate the scenario."
            }
        }
    }
}

/// Point-in-time copy of the scenario store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScenarioSnapshot {
    /// Scenario text; empty unless `status` is `Ready`.
    pub text: String,
    /// Lifecycle status.
    pub status: ScenarioStatus,
    /// Room session counter, advanced on every reset.
    pub epoch: u64,
    /// Source of the most recent apply.
    pub source: Option<ScenarioSource>,
    /// When the most recent apply happened.
    pub applied_at: Option<DateTime<Utc>>,
    /// Reason of the last failed generation in this session.
    pub failure: Option<String>,
}

impl ScenarioSnapshot {
    /// Derives the gating answer from the snapshot.
    #[must_use]
    pub fn readiness(&self) -> Readiness {
        match self.status {
            ScenarioStatus::Ready => Readiness::Ready,
            ScenarioStatus::Pending => Readiness::Generating,
            ScenarioStatus::Absent if self.failure.is_some() => Readiness::ServiceUnavailable,
            ScenarioStatus::Absent => Readiness::NotReady,
        }
    }
}
