//! Tree change notifications
//!
//! This module provides:
//! - `TreeEvent`: typed events emitted after every mutation and publish
//! - `EventBus`: broadcast channel for distributing events to local listeners

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{EventEmitter, TreeEvent, TreeEventKind};
