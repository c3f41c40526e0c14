//! Hysteresis state machine over per-tick eye observations.
//!
//! ```text
//!            closed              > alert_after (cooldown clear)     > alarm_after
//!   Open ──────────► Watching ─────────────────────► Alerted ───────────────► Alarming
//!    ▲                  │                               │                        │
//!    │      open        │          open (recovery)      │    open (recovery)     │
//!    └──────────────────┴───────────────────────────────┴────────────────────────┘
//! ```
//!
//! The alert and alarm gates are evaluated independently on every closed
//! tick, alert first. A run whose alert was suppressed by the rearm cooldown
//! still reaches `Alarming` (`Watching` → `Alarming` directly).
//!
//! **Design invariant:** no I/O happens here. Each [`EscalationStateMachine::step`]
//! returns the [`Effect`]s to apply, in issue order; the monitor loop owns
//! the alarm controller and the task scheduler.

#![allow(missing_docs)]

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::{Observation, Thresholds};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationState {
    /// Eyes open, nothing pending.
    #[default]
    Open,
    /// Eyes closed, below the alert threshold (or alert suppressed by cooldown).
    Watching,
    /// Soft wake-up dispatched for the current closed run.
    Alerted,
    /// Looping alarm requested for the current closed run.
    Alarming,
}

impl EscalationState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Watching => "watching",
            Self::Alerted => "alerted",
            Self::Alarming => "alarming",
        }
    }

    /// States from which reopening the eyes counts as a recovery.
    #[must_use]
    pub const fn is_drowsy(self) -> bool {
        matches!(self, Self::Alerted | Self::Alarming)
    }
}

/// Side-effect requested by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    DispatchAlert,
    StartAlarm,
    StopAlarm,
    DispatchRecovery,
}

/// Mutable escalation state of one monitoring session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Episode {
    /// Start of the current unbroken closed run.
    pub closed_since: Option<Instant>,
    pub alert_fired: bool,
    pub alarm_active: bool,
    /// Rearm cooldown anchor: when the alarm last started.
    pub last_alarm_time: Option<Instant>,
    /// Recovery already dispatched for the current reopening.
    pub in_recovery_handoff: bool,
}

#[derive(Debug, Clone)]
pub struct EscalationStateMachine {
    thresholds: Thresholds,
    state: EscalationState,
    episode: Episode,
}

impl EscalationStateMachine {
    #[must_use]
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            state: EscalationState::Open,
            episode: Episode::default(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> EscalationState {
        self.state
    }

    #[must_use]
    pub const fn episode(&self) -> &Episode {
        &self.episode
    }

    #[must_use]
    pub const fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Consume one observation and return the effects it triggers.
    pub fn step(&mut self, obs: Observation) -> Vec<Effect> {
        if obs.eyes_open {
            self.on_open()
        } else {
            self.on_closed(obs.at)
        }
    }

    /// Length of the current closed run as of `now`, if eyes are closed.
    #[must_use]
    pub fn closed_for(&self, now: Instant) -> Option<Duration> {
        self.episode
            .closed_since
            .map(|since| now.saturating_duration_since(since))
    }

    /// One-line human readable status, e.g. `Eyes: CLOSED (3.2s) - ALERT ACTIVE`.
    #[must_use]
    pub fn status_line(&self, now: Instant) -> String {
        let Some(closed) = self.closed_for(now) else {
            return "Eyes: OPEN".to_string();
        };
        let suffix = match self.state {
            EscalationState::Alerted => " - ALERT ACTIVE",
            EscalationState::Alarming => " - ALARM",
            EscalationState::Open | EscalationState::Watching => "",
        };
        format!("Eyes: CLOSED ({:.1}s){suffix}", closed.as_secs_f64())
    }

    fn on_open(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.episode.alarm_active {
            effects.push(Effect::StopAlarm);
        }
        if self.state.is_drowsy() && !self.episode.in_recovery_handoff {
            effects.push(Effect::DispatchRecovery);
            self.episode.in_recovery_handoff = true;
        }
        // Reopening always clears the run flags, drowsy or not.
        self.episode.alarm_active = false;
        self.episode.alert_fired = false;
        self.episode.closed_since = None;
        self.state = EscalationState::Open;
        effects
    }

    fn on_closed(&mut self, at: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        let since = match self.episode.closed_since {
            Some(since) => since,
            None => {
                self.episode.closed_since = Some(at);
                self.episode.in_recovery_handoff = false;
                at
            }
        };
        if self.state == EscalationState::Open {
            self.state = EscalationState::Watching;
        }

        // Backwards timestamps count as zero elapsed.
        let duration = at.saturating_duration_since(since);

        if duration > self.thresholds.alert_after
            && !self.episode.alert_fired
            && self.cooldown_elapsed(at)
        {
            self.episode.alert_fired = true;
            if self.state != EscalationState::Alarming {
                self.state = EscalationState::Alerted;
            }
            effects.push(Effect::DispatchAlert);
        }

        if duration > self.thresholds.alarm_after && !self.episode.alarm_active {
            self.episode.alarm_active = true;
            self.episode.last_alarm_time = Some(at);
            self.state = EscalationState::Alarming;
            effects.push(Effect::StartAlarm);
        }

        effects
    }

    fn cooldown_elapsed(&self, at: Instant) -> bool {
        self.episode
            .last_alarm_time
            .is_none_or(|last| at.saturating_duration_since(last) > self.thresholds.rearm_cooldown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    /// Feed observations every `step` seconds over `[from, to]` and collect effects.
    fn run_closed(
        machine: &mut EscalationStateMachine,
        t0: Instant,
        from: f64,
        to: f64,
        step: f64,
    ) -> Vec<(f64, Effect)> {
        let mut out = Vec::new();
        let mut t = from;
        while t <= to + 1e-9 {
            for effect in machine.step(Observation::closed(t0 + secs(t))) {
                out.push((t, effect));
            }
            t += step;
        }
        out
    }

    #[test]
    fn starts_open_with_empty_episode() {
        let machine = EscalationStateMachine::new(Thresholds::default());
        assert_eq!(machine.state(), EscalationState::Open);
        assert_eq!(*machine.episode(), Episode::default());
    }

    #[test]
    fn first_closed_tick_starts_watching() {
        let mut machine = EscalationStateMachine::new(Thresholds::default());
        let t0 = Instant::now();
        assert!(machine.step(Observation::closed(t0)).is_empty());
        assert_eq!(machine.state(), EscalationState::Watching);
        assert_eq!(machine.episode().closed_since, Some(t0));
    }

    #[test]
    fn alert_requires_strictly_more_than_threshold() {
        let mut machine = EscalationStateMachine::new(Thresholds::default());
        let t0 = Instant::now();
        machine.step(Observation::closed(t0));
        assert!(machine.step(Observation::closed(t0 + secs(2.0))).is_empty());
        assert_eq!(
            machine.step(Observation::closed(t0 + secs(2.05))),
            vec![Effect::DispatchAlert]
        );
        assert_eq!(machine.state(), EscalationState::Alerted);
    }

    #[test]
    fn closed_run_of_two_point_one_seconds_alerts_once_without_alarm() {
        let mut machine = EscalationStateMachine::new(Thresholds::default());
        let t0 = Instant::now();
        let effects = run_closed(&mut machine, t0, 0.0, 2.1, 0.05);
        let kinds: Vec<Effect> = effects.iter().map(|(_, e)| *e).collect();
        assert_eq!(kinds, vec![Effect::DispatchAlert]);
    }

    #[test]
    fn closed_run_of_five_point_one_seconds_alerts_then_alarms() {
        let mut machine = EscalationStateMachine::new(Thresholds::default());
        let t0 = Instant::now();
        let effects = run_closed(&mut machine, t0, 0.0, 5.1, 0.05);
        let kinds: Vec<Effect> = effects.iter().map(|(_, e)| *e).collect();
        assert_eq!(kinds, vec![Effect::DispatchAlert, Effect::StartAlarm]);
        assert!(effects[0].0 < effects[1].0);
        assert_eq!(machine.state(), EscalationState::Alarming);
        assert!(machine.episode().alarm_active);
    }

    #[test]
    fn unbroken_closed_run_holds_alarming() {
        let mut machine = EscalationStateMachine::new(Thresholds::default());
        let t0 = Instant::now();
        let effects = run_closed(&mut machine, t0, 0.0, 60.0, 0.1);
        assert_eq!(effects.len(), 2);
        assert_eq!(machine.state(), EscalationState::Alarming);
    }

    #[test]
    fn single_tick_crossing_both_gates_orders_alert_before_alarm() {
        let mut machine = EscalationStateMachine::new(Thresholds::default());
        let t0 = Instant::now();
        machine.step(Observation::closed(t0));
        let effects = machine.step(Observation::closed(t0 + secs(6.0)));
        assert_eq!(effects, vec![Effect::DispatchAlert, Effect::StartAlarm]);
        assert_eq!(machine.state(), EscalationState::Alarming);
    }

    #[test]
    fn reopening_after_alarm_stops_and_recovers_once() {
        let mut machine = EscalationStateMachine::new(Thresholds::default());
        let t0 = Instant::now();
        run_closed(&mut machine, t0, 0.0, 5.1, 0.05);

        let reopen = machine.step(Observation::open(t0 + secs(5.2)));
        assert_eq!(reopen, vec![Effect::StopAlarm, Effect::DispatchRecovery]);
        assert!(machine.step(Observation::open(t0 + secs(5.25))).is_empty());
        assert!(machine.step(Observation::open(t0 + secs(5.3))).is_empty());
        assert_eq!(machine.state(), EscalationState::Open);
        assert!(machine.episode().in_recovery_handoff);
    }

    #[test]
    fn reopening_after_alert_only_recovers_without_stop() {
        let mut machine = EscalationStateMachine::new(Thresholds::default());
        let t0 = Instant::now();
        run_closed(&mut machine, t0, 0.0, 3.0, 0.1);
        assert_eq!(
            machine.step(Observation::open(t0 + secs(3.1))),
            vec![Effect::DispatchRecovery]
        );
    }

    #[test]
    fn reopening_from_watching_is_silent() {
        let mut machine = EscalationStateMachine::new(Thresholds::default());
        let t0 = Instant::now();
        run_closed(&mut machine, t0, 0.0, 1.5, 0.1);
        assert!(machine.step(Observation::open(t0 + secs(1.6))).is_empty());
    }

    #[test]
    fn next_closed_run_consumes_recovery_handoff() {
        let mut machine = EscalationStateMachine::new(Thresholds::default());
        let t0 = Instant::now();
        run_closed(&mut machine, t0, 0.0, 5.1, 0.1);
        machine.step(Observation::open(t0 + secs(5.2)));
        assert!(machine.episode().in_recovery_handoff);

        machine.step(Observation::closed(t0 + secs(5.3)));
        assert!(!machine.episode().in_recovery_handoff);
    }

    #[test]
    fn flicker_faster_than_threshold_never_escalates() {
        let mut machine = EscalationStateMachine::new(Thresholds::default());
        let t0 = Instant::now();
        for i in 0..600_u32 {
            let t = t0 + Duration::from_millis(u64::from(i) * 50);
            // 1.5s closed, 0.05s open, repeating.
            let eyes_open = i % 31 == 30;
            assert!(
                machine
                    .step(Observation {
                        at: t,
                        eyes_open
                    })
                    .is_empty()
            );
        }
    }

    #[test]
    fn cooldown_suppresses_soft_alert_but_not_alarm() {
        let mut machine = EscalationStateMachine::new(Thresholds::default());
        let t0 = Instant::now();
        // First run: alarm starts at 5.1s.
        run_closed(&mut machine, t0, 0.0, 5.1, 0.1);
        machine.step(Observation::open(t0 + secs(5.2)));

        // Second run begins 1s later, well inside the 15s cooldown.
        let effects = run_closed(&mut machine, t0, 6.0, 12.0, 0.1);
        let kinds: Vec<Effect> = effects.iter().map(|(_, e)| *e).collect();
        assert_eq!(kinds, vec![Effect::StartAlarm]);
        assert_eq!(machine.state(), EscalationState::Alarming);
        assert!(!machine.episode().alert_fired);
    }

    #[test]
    fn alarm_only_run_still_recovers_on_reopen() {
        let mut machine = EscalationStateMachine::new(Thresholds::default());
        let t0 = Instant::now();
        run_closed(&mut machine, t0, 0.0, 5.1, 0.1);
        machine.step(Observation::open(t0 + secs(5.2)));
        run_closed(&mut machine, t0, 6.0, 12.0, 0.1);

        assert_eq!(
            machine.step(Observation::open(t0 + secs(12.1))),
            vec![Effect::StopAlarm, Effect::DispatchRecovery]
        );
    }

    #[test]
    fn soft_alert_rearms_after_cooldown() {
        let mut machine = EscalationStateMachine::new(Thresholds::default());
        let t0 = Instant::now();
        run_closed(&mut machine, t0, 0.0, 5.1, 0.1);
        machine.step(Observation::open(t0 + secs(5.2)));

        // Alarm started at ~5.1s; 21s is past the 15s cooldown.
        let effects = run_closed(&mut machine, t0, 21.0, 23.5, 0.1);
        let kinds: Vec<Effect> = effects.iter().map(|(_, e)| *e).collect();
        assert_eq!(kinds, vec![Effect::DispatchAlert]);
    }

    #[test]
    fn backwards_timestamp_counts_as_zero_elapsed() {
        let mut machine = EscalationStateMachine::new(Thresholds::default());
        let t0 = Instant::now() + Duration::from_secs(10);
        machine.step(Observation::closed(t0));
        assert!(
            machine
                .step(Observation::closed(t0 - Duration::from_secs(5)))
                .is_empty()
        );
        assert_eq!(machine.state(), EscalationState::Watching);
    }

    #[test]
    fn status_line_reflects_state() {
        let mut machine = EscalationStateMachine::new(Thresholds::default());
        let t0 = Instant::now();
        assert_eq!(machine.status_line(t0), "Eyes: OPEN");

        machine.step(Observation::closed(t0));
        assert_eq!(machine.status_line(t0 + secs(1.0)), "Eyes: CLOSED (1.0s)");

        machine.step(Observation::closed(t0 + secs(2.5)));
        assert_eq!(
            machine.status_line(t0 + secs(2.5)),
            "Eyes: CLOSED (2.5s) - ALERT ACTIVE"
        );

        machine.step(Observation::closed(t0 + secs(5.5)));
        assert_eq!(
            machine.status_line(t0 + secs(6.0)),
            "Eyes: CLOSED (6.0s) - ALARM"
        );
    }

    #[test]
    fn late_soft_alert_never_demotes_alarming() {
        let thresholds = Thresholds {
            rearm_cooldown: Duration::from_secs(6),
            ..Thresholds::default()
        };
        let mut machine = EscalationStateMachine::new(thresholds);
        let t0 = Instant::now();
        run_closed(&mut machine, t0, 0.0, 5.1, 0.1);
        machine.step(Observation::open(t0 + secs(5.2)));

        // The cooldown holds the soft alert past the second alarm start,
        // which re-anchors it; the alert finally fires while alarming.
        let effects = run_closed(&mut machine, t0, 5.3, 20.0, 0.1);
        let kinds: Vec<Effect> = effects.iter().map(|(_, e)| *e).collect();
        assert_eq!(kinds, vec![Effect::StartAlarm, Effect::DispatchAlert]);
        assert_eq!(machine.state(), EscalationState::Alarming);
    }
}
