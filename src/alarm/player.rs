//! Single-attempt alarm playback.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::core::config::AlarmConfig;
use crate::core::errors::{Result, WgError};

/// One attempt to emit the alarm sound. May block for the length of the
/// sound; failures are retried by the controller.
pub trait AlarmPlayer: Send + Sync + 'static {
    fn play(&self) -> Result<()>;
}

impl<F> AlarmPlayer for F
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    fn play(&self) -> Result<()> {
        self()
    }
}

/// Plays a sound file through an external player program
/// (`aplay alarm.wav`, `afplay alarm.wav`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
    sound_path: PathBuf,
}

impl CommandPlayer {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>, sound_path: PathBuf) -> Self {
        Self {
            program: program.into(),
            args,
            sound_path,
        }
    }

    #[must_use]
    pub fn from_config(config: &AlarmConfig) -> Self {
        Self::new(
            config.player_program(),
            config.player_args.clone(),
            config.sound_path.clone(),
        )
    }

    #[must_use]
    pub fn describe(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.push(self.sound_path.display().to_string());
        parts.join(" ")
    }
}

impl AlarmPlayer for CommandPlayer {
    fn play(&self) -> Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&self.sound_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|err| WgError::Playback {
                details: format!("cannot run {}: {err}", self.program),
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(WgError::Playback {
                details: format!("`{}` exited with {status}", self.describe()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_playback_error() {
        let player = CommandPlayer::new(
            "wakeguard-no-such-player",
            Vec::new(),
            PathBuf::from("alarm.wav"),
        );
        let err = player.play().expect_err("program does not exist");
        assert_eq!(err.code(), "WG-3001");
        assert!(err.is_retryable());
    }

    #[test]
    fn describe_lists_program_args_and_sound() {
        let player = CommandPlayer::new(
            "aplay",
            vec!["-q".to_string()],
            PathBuf::from("/opt/alarm.wav"),
        );
        assert_eq!(player.describe(), "aplay -q /opt/alarm.wav");
    }

    #[test]
    fn from_config_uses_configured_program() {
        let config = AlarmConfig {
            player: Some("paplay".to_string()),
            ..AlarmConfig::default()
        };
        let player = CommandPlayer::from_config(&config);
        assert_eq!(player.describe(), "paplay alarm.wav");
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_playback_error() {
        let player = CommandPlayer::new("false", Vec::new(), PathBuf::from("alarm.wav"));
        assert!(player.play().is_err());
    }

    #[test]
    fn closures_are_players() {
        let player = || -> Result<()> { Ok(()) };
        assert!(AlarmPlayer::play(&player).is_ok());
    }
}
