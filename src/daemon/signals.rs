//! SIGINT/SIGTERM handling: both request a graceful loop shutdown.

use signal_hook::consts::{SIGINT, SIGTERM};

use super::loop_main::StopHandle;
use crate::core::errors::{Result, WgError};

/// Route SIGINT and SIGTERM to `stop`. The loop notices on its next tick,
/// stops the alarm, and releases the source.
pub fn install_shutdown_handlers(stop: &StopHandle) -> Result<()> {
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, stop.flag()).map_err(|err| WgError::Runtime {
            details: format!("failed to register handler for signal {signal}: {err}"),
        })?;
    }
    Ok(())
}
