//! Daemon subsystem: the monitor loop, signal handling, self-monitoring.

pub mod loop_main;
pub mod self_monitor;
#[cfg(feature = "daemon")]
pub mod signals;

pub use loop_main::{MonitorLoop, MonitorSettings, Responders, StopHandle};
pub use self_monitor::{LoopCounters, MonitorState, read_state_file, write_state_file};
