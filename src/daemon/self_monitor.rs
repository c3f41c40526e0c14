//! Self-monitoring snapshot of the monitor loop, written periodically as a
//! JSON state file for `wakeguard status` and external dashboards.

#![allow(missing_docs)]

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, WgError};
use crate::escalation::EscalationState;

/// Per-loop counters. Monotonic for the lifetime of one loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopCounters {
    pub ticks: u64,
    pub skipped_reads: u64,
    pub alerts: u64,
    pub alarms: u64,
    pub recoveries: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorState {
    pub version: String,
    pub pid: u32,
    pub started_at: String,
    pub last_updated: String,
    pub source: String,
    pub escalation: EscalationState,
    pub status_line: String,
    pub closed_for_secs: Option<f64>,
    pub alarm_running: bool,
    pub tasks_in_flight: usize,
    pub callback_failures: u64,
    pub dropped_log_events: u64,
    pub counters: LoopCounters,
}

/// Write `state` atomically (temp file + rename).
pub fn write_state_file(path: &Path, state: &MonitorState) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|err| WgError::io(parent, err))?;
    }
    let body = serde_json::to_string_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body).map_err(|err| WgError::io(&tmp, err))?;
    std::fs::rename(&tmp, path).map_err(|err| WgError::io(path, err))
}

/// Read and parse a state file. Returns `None` on any error.
#[must_use]
pub fn read_state_file(path: &Path) -> Option<MonitorState> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> MonitorState {
        MonitorState {
            version: "0.1.0".into(),
            pid: 4242,
            started_at: "2026-10-19T06:00:00.000Z".into(),
            last_updated: "2026-10-19T06:12:30.000Z".into(),
            source: "simulated".into(),
            escalation: EscalationState::Alerted,
            status_line: "Eyes: CLOSED (3.2s) - ALERT ACTIVE".into(),
            closed_for_secs: Some(3.2),
            alarm_running: false,
            tasks_in_flight: 1,
            callback_failures: 0,
            dropped_log_events: 0,
            counters: LoopCounters {
                ticks: 15_000,
                skipped_reads: 12,
                alerts: 3,
                alarms: 1,
                recoveries: 2,
            },
        }
    }

    #[test]
    fn write_then_read_preserves_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run").join("state.json");
        write_state_file(&path, &sample_state()).expect("write");

        assert_eq!(read_state_file(&path), Some(sample_state()));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn escalation_state_is_lowercase_in_json() {
        let json = serde_json::to_string(&sample_state()).expect("json");
        assert!(json.contains("\"escalation\":\"alerted\""));
    }

    #[test]
    fn unreadable_or_malformed_file_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        assert!(read_state_file(&path).is_none());
        std::fs::write(&path, "{ truncated").expect("write");
        assert!(read_state_file(&path).is_none());
    }
}
