//! Top-level CLI definition and dispatch.

#![allow(missing_docs)]

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;

use crate::alarm::{AlarmController, AlarmPlayer, CommandPlayer};
use crate::core::config::Config;
use crate::core::errors::{Result, WgError};
use crate::daemon::signals::install_shutdown_handlers;
use crate::daemon::{LoopCounters, MonitorLoop, MonitorSettings, Responders, read_state_file};
use crate::escalation::EscalationState;
use crate::logger::ActivityLogger;
use crate::monitor::{ReplaySource, SignalSource, SimulatedSource, SimulationProfile};
use crate::scheduler::{CallbackResult, CancelToken};

/// Wakeguard: keeps a drowsy driver awake with escalating alerts.
#[derive(Debug, Parser)]
#[command(name = "wakeguard", version, about)]
pub struct Cli {
    /// Configuration file (falls back to $WAKEGUARD_CONFIG, then defaults).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the monitor loop in the foreground until stopped or the source ends.
    Run(RunArgs),
    /// Show the last snapshot written by a running monitor.
    Status(StatusArgs),
    /// Show or validate configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Replay a recorded JSONL trace of `{"t": secs, "eyes_open": bool}` lines.
    #[arg(long, value_name = "FILE", conflicts_with = "simulate")]
    pub replay: Option<PathBuf>,

    /// Drive the loop from the seeded driver simulator.
    #[arg(long)]
    pub simulate: bool,

    /// Simulator seed.
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Stop the simulator after this many observations.
    #[arg(long, requires = "simulate")]
    pub ticks: Option<u64>,

    /// Override `monitor.tick_interval_ms` (0 runs a trace as fast as it reads).
    #[arg(long, value_name = "MS")]
    pub tick_ms: Option<u64>,

    /// Keep the alarm lifecycle but skip the external player.
    #[arg(long)]
    pub mute: bool,

    /// Print the final counters as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// State file to read (defaults to `monitor.state_file`).
    #[arg(long, value_name = "FILE")]
    pub state_file: Option<PathBuf>,

    /// Print the raw snapshot as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML.
    Show,
    /// Validate the configuration and report problems.
    Check,
}

/// Dispatch CLI commands.
///
/// # Errors
/// Returns an error if the subcommand fails.
pub fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Run(args) => run_monitor(cli.config.as_deref(), args),
        Command::Status(args) => show_status(cli.config.as_deref(), args),
        Command::Config(cmd) => config_command(cli.config.as_deref(), *cmd),
        Command::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "wakeguard", &mut io::stdout());
            Ok(())
        }
    }
}

fn build_logger(config: &Config) -> Result<ActivityLogger> {
    let logging = &config.logging;
    match &logging.jsonl_path {
        Some(path) => ActivityLogger::jsonl(path, logging.channel_capacity, logging.stderr),
        None => Ok(ActivityLogger::stderr_only(logging.stderr)),
    }
}

fn build_source(args: &RunArgs) -> Result<Box<dyn SignalSource>> {
    if let Some(path) = &args.replay {
        return Ok(Box::new(ReplaySource::new(path)));
    }
    if args.simulate {
        let profile = SimulationProfile {
            max_ticks: args.ticks,
            ..SimulationProfile::default()
        };
        return Ok(Box::new(SimulatedSource::new(args.seed, profile)));
    }
    Err(WgError::SourceUnavailable {
        source_name: "camera".to_string(),
        details: "no live capture backend is built in; use --replay <FILE> or --simulate"
            .to_string(),
    })
}

fn build_player(config: &Config, mute: bool, logger: &ActivityLogger) -> Arc<dyn AlarmPlayer> {
    if mute {
        // Paces like a short clip so the session loop does not spin.
        return Arc::new(|| -> Result<()> {
            std::thread::sleep(Duration::from_millis(20));
            Ok(())
        });
    }
    let player = CommandPlayer::from_config(&config.alarm);
    logger.info("alarm", "player_configured", player.describe());
    Arc::new(player)
}

fn responders() -> Responders {
    Responders::new(
        |_: &CancelToken| -> CallbackResult {
            let mut out = io::stdout().lock();
            writeln!(
                out,
                "{} Your eyes have been closed for a while. Are you still with me?",
                "WAKE UP!".bold().yellow()
            )?;
            Ok(())
        },
        |_: &CancelToken| -> CallbackResult {
            let mut out = io::stdout().lock();
            writeln!(
                out,
                "{} Eyes open again. Consider pulling over for a break.",
                "Welcome back.".bold().green()
            )?;
            Ok(())
        },
    )
}

fn run_monitor(config_path: Option<&Path>, args: &RunArgs) -> Result<()> {
    let config = Config::load(config_path)?;
    let logger = build_logger(&config)?;
    let source = build_source(args)?;

    let mut settings = MonitorSettings::from_config(&config);
    if let Some(ms) = args.tick_ms {
        settings.tick_interval = Duration::from_millis(ms);
    }

    let alarm = AlarmController::new(
        build_player(&config, args.mute, &logger),
        config.alarm.check_interval(),
        logger.clone(),
    );
    let mut monitor = MonitorLoop::new(source, alarm, settings, logger.clone());
    install_shutdown_handlers(&monitor.stop_handle())?;

    let outcome = monitor.run(&responders());
    let final_state = monitor.machine().state();
    logger.shutdown();
    let counters = outcome?;
    print_summary(&counters, final_state, args.json)
}

fn print_summary(counters: &LoopCounters, state: EscalationState, json: bool) -> Result<()> {
    if json {
        let body = serde_json::json!({
            "final_state": state,
            "counters": counters,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }
    println!("{}", "Monitor stopped".bold());
    println!("  final state:   {}", state_label(state));
    println!("  ticks:         {}", counters.ticks);
    println!("  skipped reads: {}", counters.skipped_reads);
    println!("  alerts:        {}", counters.alerts);
    println!("  alarms:        {}", counters.alarms);
    println!("  recoveries:    {}", counters.recoveries);
    Ok(())
}

fn state_label(state: EscalationState) -> String {
    match state {
        EscalationState::Open => state.as_str().green().to_string(),
        EscalationState::Watching => state.as_str().cyan().to_string(),
        EscalationState::Alerted => state.as_str().yellow().to_string(),
        EscalationState::Alarming => state.as_str().red().bold().to_string(),
    }
}

fn show_status(config_path: Option<&Path>, args: &StatusArgs) -> Result<()> {
    let path = match &args.state_file {
        Some(path) => path.clone(),
        None => Config::load(config_path)?
            .monitor
            .state_file
            .ok_or_else(|| WgError::InvalidConfig {
                details: "monitor.state_file is not set; pass --state-file".to_string(),
            })?,
    };
    let state = read_state_file(&path).ok_or_else(|| WgError::Runtime {
        details: format!("no readable monitor state at {}", path.display()),
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }
    println!("{} (pid {}, v{})", "wakeguard".bold(), state.pid, state.version);
    println!("  source:        {}", state.source);
    println!("  state:         {}", state_label(state.escalation));
    println!("  status:        {}", state.status_line);
    println!(
        "  alarm:         {}",
        if state.alarm_running {
            "RUNNING".red().bold().to_string()
        } else {
            "idle".to_string()
        }
    );
    println!(
        "  tasks:         {} in flight, {} failed",
        state.tasks_in_flight, state.callback_failures
    );
    println!("  ticks:         {}", state.counters.ticks);
    println!("  updated:       {}", state.last_updated);
    Ok(())
}

fn config_command(config_path: Option<&Path>, cmd: ConfigCommand) -> Result<()> {
    let config = Config::load(config_path)?;
    match cmd {
        ConfigCommand::Show => print!("{}", config.to_toml_string()?),
        ConfigCommand::Check => println!("{} configuration is valid", "ok:".green().bold()),
    }
    Ok(())
}
