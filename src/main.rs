//! `wakeguard` command-line entry point.

use std::process::ExitCode;

use clap::Parser;
use wakeguard::cli_app::{Cli, run};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("wakeguard: {err}");
            ExitCode::FAILURE
        }
    }
}
