//! Wakeguard: driver drowsiness escalation engine.
//!
//! A per-tick eyes-open signal feeds a hysteresis state machine that fires a
//! soft wake-up alert, escalates to a looping alarm, and dispatches a
//! recovery response once the eyes reopen. Alarm playback and response
//! callbacks run off the monitor loop and never stall it.

pub mod alarm;
pub mod core;
pub mod daemon;
pub mod escalation;
pub mod logger;
pub mod monitor;
pub mod scheduler;

#[cfg(feature = "cli")]
pub mod cli_app;

pub use crate::core::config::Config;
pub use crate::core::errors::{Result, WgError};
