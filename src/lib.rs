#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![deny(clippy::use_self, rust_2018_idioms)]
#![allow(clippy::multiple_crate_versions, clippy::module_name_repetitions)]

//! a recurring reminder and alarm engine
//!
//! reminders are persisted, armed as timers and when they go off they show a notification,
//! play a synthesized alarm and vibrate, each of those is a pluggable platform capability

pub mod audio;
pub mod clock;
pub mod communication;
pub mod config;
pub mod engine;
pub mod error;
/// test doubles for every platform capability
pub mod mock;
pub mod notify;
pub mod schedule;
pub mod sources;
pub mod store;
pub mod timer;
pub mod trigger;

pub use engine::{Capabilities, ReminderEngine, TriggerSummary};
pub use error::{Error, Result};
pub use trigger::{TriggerEdit, TriggerId, TriggerOptions};
