//! Alarm subsystem: looping playback controller and sound players.

pub mod controller;
pub mod player;

pub use controller::{AlarmControl, AlarmController};
pub use player::{AlarmPlayer, CommandPlayer};
