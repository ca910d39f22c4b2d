//! Scenario lifecycle events
//!
//! This crate provides the event types published by the scenario orchestrator,
//! the [`EventNotifier`] contract it publishes through, and an in-process
//! broadcast [`EventBus`] implementing it.

mod bus;
mod types;

pub use bus::{EventBus, EventNotifier};
pub use types::*;
