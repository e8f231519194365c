//! Scenario domain: state, lifecycle store, notifications and text cleanup.

pub mod events;
pub mod scenario;
pub mod store;
pub mod text;
