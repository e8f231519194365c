//! Protocol orchestration and read-side queries.

pub mod dispatch;
pub mod protocol;
pub mod query_handlers;
