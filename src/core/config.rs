//! TOML configuration: escalation thresholds, alarm playback, loop pacing,
//! scheduler watchdog, and activity logging.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. [`Config::validate`] runs on every load path.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, WgError};
use crate::escalation::Thresholds;

/// Environment variable that points at a config file when `--config` is absent.
pub const CONFIG_ENV: &str = "WAKEGUARD_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub escalation: EscalationConfig,
    pub alarm: AlarmConfig,
    pub monitor: MonitorConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

/// Closed-run thresholds, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub alert_after_secs: f64,
    pub alarm_after_secs: f64,
    pub rearm_cooldown_secs: f64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            alert_after_secs: 2.0,
            alarm_after_secs: 5.0,
            rearm_cooldown_secs: 15.0,
        }
    }
}

impl EscalationConfig {
    #[must_use]
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            alert_after: saturating_secs(self.alert_after_secs),
            alarm_after: saturating_secs(self.alarm_after_secs),
            rearm_cooldown: saturating_secs(self.rearm_cooldown_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Sound file handed to the player program on every attempt.
    pub sound_path: PathBuf,
    /// Player program. `None` selects `afplay` on macOS and `aplay` elsewhere.
    pub player: Option<String>,
    /// Extra arguments placed before the sound path.
    pub player_args: Vec<String>,
    /// Upper bound on how long a stop request goes unobserved between attempts.
    pub check_interval_ms: u64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            sound_path: PathBuf::from("alarm.wav"),
            player: None,
            player_args: Vec::new(),
            check_interval_ms: 200,
        }
    }
}

impl AlarmConfig {
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    #[must_use]
    pub fn player_program(&self) -> String {
        self.player.clone().unwrap_or_else(|| {
            if cfg!(target_os = "macos") {
                "afplay".to_string()
            } else {
                "aplay".to_string()
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sleep between ticks (≈20 Hz by default).
    pub tick_interval_ms: u64,
    /// Delay before the next read after a transient read failure.
    pub read_backoff_ms: u64,
    /// Self-monitor snapshot destination. Disabled when unset.
    pub state_file: Option<PathBuf>,
    pub state_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            read_backoff_ms: 50,
            state_file: None,
            state_interval_ms: 1_000,
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    #[must_use]
    pub fn read_backoff(&self) -> Duration {
        Duration::from_millis(self.read_backoff_ms)
    }

    #[must_use]
    pub fn state_interval(&self) -> Duration {
        Duration::from_millis(self.state_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Callbacks in flight longer than this are reported once. No timeout is enforced.
    pub watchdog_secs: Option<f64>,
}

impl SchedulerConfig {
    #[must_use]
    pub fn watchdog(&self) -> Option<Duration> {
        self.watchdog_secs.map(saturating_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub jsonl_path: Option<PathBuf>,
    pub stderr: bool,
    pub channel_capacity: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            jsonl_path: None,
            stderr: true,
            channel_capacity: 1_024,
        }
    }
}

impl Config {
    /// Resolve and load configuration.
    ///
    /// Order: explicit `path`, then the [`CONFIG_ENV`] variable, then built-in
    /// defaults. A path that was named but does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let named = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let Some(path) = named else {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        };
        if !path.exists() {
            return Err(WgError::MissingConfig { path });
        }
        let raw = std::fs::read_to_string(&path).map_err(|err| WgError::io(&path, err))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| WgError::Serialization {
            context: "toml",
            details: err.to_string(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        let esc = &self.escalation;
        positive("escalation.alert_after_secs", esc.alert_after_secs)?;
        positive("escalation.alarm_after_secs", esc.alarm_after_secs)?;
        duration("escalation.rearm_cooldown_secs", esc.rearm_cooldown_secs)?;
        if esc.alarm_after_secs <= esc.alert_after_secs {
            return invalid(format!(
                "escalation.alarm_after_secs ({}) must exceed alert_after_secs ({})",
                esc.alarm_after_secs, esc.alert_after_secs
            ));
        }
        if self.alarm.check_interval_ms == 0 {
            return invalid("alarm.check_interval_ms must be at least 1".to_string());
        }
        if self.monitor.state_interval_ms == 0 {
            return invalid("monitor.state_interval_ms must be at least 1".to_string());
        }
        if let Some(secs) = self.scheduler.watchdog_secs {
            positive("scheduler.watchdog_secs", secs)?;
        }
        if self.logging.channel_capacity == 0 {
            return invalid("logging.channel_capacity must be at least 1".to_string());
        }
        Ok(())
    }
}

fn positive(field: &str, value: f64) -> Result<()> {
    if duration(field, value)?.is_zero() {
        return invalid(format!("{field} must be > 0, got {value}"));
    }
    Ok(())
}

/// Seconds that convert to a [`Duration`]: finite, non-negative, in range.
fn duration(field: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|err| WgError::InvalidConfig {
        details: format!("{field} is not a usable duration ({value}): {err}"),
    })
}

// Out-of-range input clamps; validated configs never reach the fallback.
fn saturating_secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(if value > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

fn invalid(details: String) -> Result<()> {
    Err(WgError::InvalidConfig { details })
}
