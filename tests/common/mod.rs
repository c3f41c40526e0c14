//! Shared fixtures for integration tests: a scripted signal source, a
//! journaling alarm double, and a CLI runner that keeps a per-case log.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use wakeguard::alarm::AlarmControl;
use wakeguard::core::errors::{Result, WgError};
use wakeguard::escalation::Observation;
use wakeguard::monitor::SignalSource;

/// Ordered record of lifecycle calls shared between test doubles.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().clone()
}

/// One scripted read.
#[derive(Debug, Clone)]
pub enum Step {
    /// Observation at `ms` milliseconds after the script origin.
    Obs { ms: u64, eyes_open: bool },
    /// Retryable read failure.
    Transient,
    /// Non-retryable read failure.
    Fatal,
    /// Panic inside the read.
    Panic,
}

pub fn closed(ms: u64) -> Step {
    Step::Obs {
        ms,
        eyes_open: false,
    }
}

pub fn open(ms: u64) -> Step {
    Step::Obs {
        ms,
        eyes_open: true,
    }
}

/// Closed observations every `step_ms` over `[from_ms, to_ms]`.
pub fn closed_run(from_ms: u64, to_ms: u64, step_ms: u64) -> Vec<Step> {
    (from_ms..=to_ms).step_by(step_ms as usize).map(closed).collect()
}

pub struct ScriptedSource {
    steps: std::vec::IntoIter<Step>,
    origin: Instant,
    journal: Journal,
    fail_acquire: bool,
    /// After the script, keep yielding this eyes state every 50ms instead of ending.
    endless: Option<bool>,
    endless_ms: u64,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>, journal: &Journal) -> Self {
        Self {
            steps: steps.into_iter(),
            origin: Instant::now(),
            journal: Arc::clone(journal),
            fail_acquire: false,
            endless: None,
            endless_ms: 0,
        }
    }

    pub fn failing_acquire(journal: &Journal) -> Self {
        Self {
            fail_acquire: true,
            ..Self::new(Vec::new(), journal)
        }
    }

    pub fn endless(journal: &Journal, eyes_open: bool) -> Self {
        Self {
            endless: Some(eyes_open),
            ..Self::new(Vec::new(), journal)
        }
    }
}

impl SignalSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn acquire(&mut self) -> Result<()> {
        if self.fail_acquire {
            return Err(WgError::SourceUnavailable {
                source_name: "scripted".to_string(),
                details: "camera not connected".to_string(),
            });
        }
        self.journal.lock().push("acquire".to_string());
        Ok(())
    }

    fn next_observation(&mut self) -> Result<Option<Observation>> {
        match self.steps.next() {
            Some(Step::Obs { ms, eyes_open }) => Ok(Some(Observation {
                at: self.origin + Duration::from_millis(ms),
                eyes_open,
            })),
            Some(Step::Transient) => Err(WgError::SignalRead {
                source_name: "scripted".to_string(),
                details: "frame dropped".to_string(),
            }),
            Some(Step::Fatal) => Err(WgError::SourceUnavailable {
                source_name: "scripted".to_string(),
                details: "device unplugged".to_string(),
            }),
            Some(Step::Panic) => panic!("classifier crashed"),
            None => Ok(self.endless.map(|eyes_open| {
                self.endless_ms += 50;
                Observation {
                    at: self.origin + Duration::from_millis(self.endless_ms),
                    eyes_open,
                }
            })),
        }
    }

    fn release(&mut self) {
        self.journal.lock().push("release".to_string());
    }
}

/// Alarm double that journals every start/stop call.
pub struct RecordingAlarm {
    running: AtomicBool,
    journal: Journal,
}

impl RecordingAlarm {
    pub fn new(journal: &Journal) -> Self {
        Self {
            running: AtomicBool::new(false),
            journal: Arc::clone(journal),
        }
    }
}

impl AlarmControl for RecordingAlarm {
    fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        self.journal.lock().push("alarm_start".to_string());
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.journal.lock().push("alarm_stop".to_string());
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Captured output of one CLI invocation.
pub struct CliResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CliResult {
    run_cli_case_with_env(case_name, args, &[])
}

/// Run the `wakeguard` binary and keep its output in a per-case log file.
pub fn run_cli_case_with_env(case_name: &str, args: &[&str], env: &[(&str, &str)]) -> CliResult {
    let mut command = Command::new(env!("CARGO_BIN_EXE_wakeguard"));
    command.args(args).env_remove("WAKEGUARD_CONFIG");
    for (key, value) in env {
        command.env(key, value);
    }
    let output = command.output().expect("spawn wakeguard binary");

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    let log_dir = std::env::temp_dir().join("wakeguard-cli-cases");
    fs::create_dir_all(&log_dir).expect("create log dir");
    let log_path = log_dir.join(format!("{case_name}.log"));
    let log = format!(
        "args: {args:?}\nstatus: {}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}\n",
        output.status
    );
    fs::write(&log_path, log).expect("write case log");

    CliResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}
