//! Drowsiness escalation: observation types, thresholds, and the hysteresis
//! state machine that turns a noisy eyes-open signal into alert/alarm effects.

#![allow(missing_docs)]

pub mod machine;

use std::time::{Duration, Instant};

pub use machine::{Effect, Episode, EscalationState, EscalationStateMachine};

/// One classifier verdict for one sampling tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub at: Instant,
    pub eyes_open: bool,
}

impl Observation {
    #[must_use]
    pub const fn open(at: Instant) -> Self {
        Self {
            at,
            eyes_open: true,
        }
    }

    #[must_use]
    pub const fn closed(at: Instant) -> Self {
        Self {
            at,
            eyes_open: false,
        }
    }
}

/// Closed-run gates. Both comparisons are strict (`duration > threshold`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Closed-run length after which the soft wake-up alert fires.
    pub alert_after: Duration,
    /// Closed-run length after which the looping alarm starts.
    pub alarm_after: Duration,
    /// Minimum time since the last alarm start before another soft alert.
    pub rearm_cooldown: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            alert_after: Duration::from_secs(2),
            alarm_after: Duration::from_secs(5),
            rearm_cooldown: Duration::from_secs(15),
        }
    }
}
