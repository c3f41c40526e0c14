//! The monitor loop: single consumer of the signal source.
//!
//! Per tick: read one observation, step the escalation state machine, apply
//! its effects (alarm start/stop, callback dispatch), then sleep the tick
//! interval. The loop never waits on the alarm thread or on callbacks.
//!
//! Shutdown order is fixed on every exit path (stop request, end of stream,
//! fatal read error, panic): stop the alarm if it is running, then release
//! the source, then ask outstanding callbacks to cancel.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};

use super::self_monitor::{LoopCounters, MonitorState, write_state_file};
use crate::alarm::AlarmControl;
use crate::core::config::Config;
use crate::core::errors::Result;
use crate::escalation::{Effect, EscalationStateMachine, Observation, Thresholds};
use crate::logger::ActivityLogger;
use crate::monitor::{SignalSource, SourceGuard};
use crate::scheduler::{Callback, TaskScheduler};

/// Cloneable, thread-safe request to end the loop.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The underlying flag, for signal registration.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub thresholds: Thresholds,
    pub tick_interval: Duration,
    pub read_backoff: Duration,
    pub state_file: Option<PathBuf>,
    pub state_interval: Duration,
    pub watchdog: Option<Duration>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl MonitorSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            thresholds: config.escalation.thresholds(),
            tick_interval: config.monitor.tick_interval(),
            read_backoff: config.monitor.read_backoff(),
            state_file: config.monitor.state_file.clone(),
            state_interval: config.monitor.state_interval(),
            watchdog: config.scheduler.watchdog(),
        }
    }
}

/// The response-agent entry points handed to [`MonitorLoop::run`].
#[derive(Clone)]
pub struct Responders {
    pub alert: Arc<dyn Callback>,
    pub recovery: Arc<dyn Callback>,
}

impl Responders {
    pub fn new(alert: impl Callback, recovery: impl Callback) -> Self {
        Self {
            alert: Arc::new(alert),
            recovery: Arc::new(recovery),
        }
    }
}

/// Stops the alarm when dropped, so unwinding keeps the alarm-then-source order.
struct AlarmShutdown<'a, A: AlarmControl>(&'a A);

impl<A: AlarmControl> Drop for AlarmShutdown<'_, A> {
    fn drop(&mut self) {
        if self.0.is_running() {
            self.0.stop();
        }
    }
}

pub struct MonitorLoop<S: SignalSource, A: AlarmControl> {
    source: S,
    alarm: A,
    core: LoopCore,
}

struct LoopCore {
    machine: EscalationStateMachine,
    scheduler: TaskScheduler,
    settings: MonitorSettings,
    logger: ActivityLogger,
    stop: StopHandle,
    counters: LoopCounters,
    source_name: String,
    started_at: String,
    last_seen: Option<Instant>,
    last_state_write: Option<Instant>,
}

impl<S: SignalSource, A: AlarmControl> MonitorLoop<S, A> {
    pub fn new(source: S, alarm: A, settings: MonitorSettings, logger: ActivityLogger) -> Self {
        let scheduler = TaskScheduler::new(logger.clone()).with_watchdog(settings.watchdog);
        let source_name = source.name().to_string();
        Self {
            source,
            alarm,
            core: LoopCore {
                machine: EscalationStateMachine::new(settings.thresholds),
                scheduler,
                settings,
                logger,
                stop: StopHandle::new(),
                counters: LoopCounters::default(),
                source_name,
                started_at: now_rfc3339(),
                last_seen: None,
                last_state_write: None,
            },
        }
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.core.stop.clone()
    }

    /// Request the loop to end after the current tick.
    pub fn stop(&self) {
        self.core.stop.stop();
    }

    #[must_use]
    pub const fn machine(&self) -> &EscalationStateMachine {
        &self.core.machine
    }

    #[must_use]
    pub const fn scheduler(&self) -> &TaskScheduler {
        &self.core.scheduler
    }

    #[must_use]
    pub const fn counters(&self) -> LoopCounters {
        self.core.counters
    }

    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    #[must_use]
    pub const fn alarm(&self) -> &A {
        &self.alarm
    }

    /// Acquire the source and run until stopped, the stream ends, or a
    /// non-retryable read error occurs.
    ///
    /// # Errors
    /// Source acquisition failure (no tick runs) or the fatal read error that
    /// ended the loop. Callback and playback failures never surface here.
    pub fn run(&mut self, responders: &Responders) -> Result<LoopCounters> {
        let core = &mut self.core;
        let mut source = match SourceGuard::acquire(&mut self.source) {
            Ok(guard) => guard,
            Err(err) => {
                core.logger
                    .error("monitor", "acquire_failed", err.to_string());
                return Err(err);
            }
        };
        core.logger
            .info("monitor", "started", format!("source {}", core.source_name));

        let alarm_shutdown = AlarmShutdown(&self.alarm);
        let outcome = core.drive(&mut source, &self.alarm, responders);

        let alarm_was_running = self.alarm.is_running();
        drop(alarm_shutdown);
        if alarm_was_running {
            core.logger
                .info("monitor", "alarm_stopped", "stopped on shutdown");
        }
        source.release();
        core.logger
            .info("monitor", "source_released", core.source_name.clone());

        core.scheduler.cancel_all();
        core.write_state(&self.alarm);

        match &outcome {
            Ok(()) => core.logger.info(
                "monitor",
                "stopped",
                format!("{} ticks processed", core.counters.ticks),
            ),
            Err(err) => core
                .logger
                .error("monitor", "stopped_on_error", err.to_string()),
        }
        outcome.map(|()| core.counters)
    }
}

impl LoopCore {
    fn drive<S: SignalSource + ?Sized, A: AlarmControl>(
        &mut self,
        source: &mut SourceGuard<'_, S>,
        alarm: &A,
        responders: &Responders,
    ) -> Result<()> {
        while !self.stop.is_stop_requested() {
            match source.next_observation() {
                Ok(Some(obs)) => self.process(obs, alarm, responders),
                Ok(None) => {
                    self.logger.info(
                        "monitor",
                        "end_of_stream",
                        format!("{} exhausted", self.source_name),
                    );
                    return Ok(());
                }
                Err(err) if err.is_retryable() => {
                    self.counters.skipped_reads += 1;
                    self.logger
                        .warn("monitor", "read_skipped", err.to_string());
                    pause(self.settings.read_backoff);
                    continue;
                }
                Err(err) => return Err(err),
            }
            self.housekeeping(alarm);
            pause(self.settings.tick_interval);
        }
        Ok(())
    }

    fn process<A: AlarmControl>(&mut self, obs: Observation, alarm: &A, responders: &Responders) {
        self.counters.ticks += 1;
        self.last_seen = Some(obs.at);
        let before = self.machine.state();
        let effects = self.machine.step(obs);
        let after = self.machine.state();
        if before != after {
            self.logger.info(
                "escalation",
                "state_changed",
                format!(
                    "{} -> {} ({})",
                    before.as_str(),
                    after.as_str(),
                    self.machine.status_line(obs.at)
                ),
            );
        }

        for effect in effects {
            match effect {
                Effect::DispatchAlert => {
                    self.counters.alerts += 1;
                    self.scheduler
                        .dispatch("alert", Arc::clone(&responders.alert));
                }
                Effect::StartAlarm => {
                    self.counters.alarms += 1;
                    alarm.start();
                }
                Effect::StopAlarm => alarm.stop(),
                Effect::DispatchRecovery => {
                    self.counters.recoveries += 1;
                    self.scheduler
                        .dispatch("recovery", Arc::clone(&responders.recovery));
                }
            }
        }
    }

    fn housekeeping<A: AlarmControl>(&mut self, alarm: &A) {
        let now = Instant::now();
        self.scheduler.sweep_overdue(now);
        let due = self
            .last_state_write
            .is_none_or(|last| now.saturating_duration_since(last) >= self.settings.state_interval);
        if due {
            self.write_state(alarm);
        }
    }

    fn snapshot<A: AlarmControl>(&self, alarm: &A) -> MonitorState {
        let now = self.last_seen.unwrap_or_else(Instant::now);
        MonitorState {
            version: env!("CARGO_PKG_VERSION").to_string(),
            pid: std::process::id(),
            started_at: self.started_at.clone(),
            last_updated: now_rfc3339(),
            source: self.source_name.clone(),
            escalation: self.machine.state(),
            status_line: self.machine.status_line(now),
            closed_for_secs: self.machine.closed_for(now).map(|d| d.as_secs_f64()),
            alarm_running: alarm.is_running(),
            tasks_in_flight: self.scheduler.in_flight(),
            callback_failures: self.scheduler.failures(),
            dropped_log_events: self.logger.dropped_events(),
            counters: self.counters,
        }
    }

    fn write_state<A: AlarmControl>(&mut self, alarm: &A) {
        let Some(path) = self.settings.state_file.clone() else {
            return;
        };
        self.last_state_write = Some(Instant::now());
        if let Err(err) = write_state_file(&path, &self.snapshot(alarm)) {
            self.logger
                .warn("monitor", "state_write_failed", err.to_string());
        }
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
