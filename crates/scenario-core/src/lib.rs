//! Scenario Core: shared ports and types.
//!
//! This crate defines the capabilities the synchronization protocol consumes
//! (group membership, content generation, presentation, time) and the error
//! types that cross those boundaries. It contains no infrastructure code.

pub mod clock;
pub mod error;
pub mod generator;
pub mod membership;
pub mod presentation;
