//! Remote execution engine integration.
//!
//! Provides typed REST clients for the engine and the node service,
//! WebSocket push-channel parsing and subscription, and the task
//! monitor that drives a submitted execution to its terminal state from
//! both sources.

pub mod api;
pub mod client;
pub mod config;
pub mod messages;
pub mod monitor;
pub mod task;
