//! Scenario Sync: converges every room member on one generated scenario.
//!
//! The coordinator asks the generator for the scenario exactly once per room
//! session, applies it locally, stores it in durable room state and
//! broadcasts it. Everyone else applies whatever arrives first: the durable
//! entry read on join, the broadcast, or the durable-state change
//! notification. Applying the same text twice has no further effect.

pub mod application;
pub mod domain;
pub mod error;
