//! Scenario Node: runs participants against an in-process room.

pub mod config;
pub mod error;
pub mod loopback;
pub mod participant;
pub mod presentation;
