//! Looping alarm lifecycle as an independent thread.
//!
//! [`AlarmController::start`] is idempotent: while a session thread is alive
//! a second start is a no-op. [`AlarmController::stop`] never waits for the
//! thread; it flips the session's cancel flag and closes its wake channel,
//! which interrupts the inter-attempt wait immediately. A playback already in
//! progress runs to completion, but no new attempt starts after a stop.

#![allow(missing_docs)]

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;

use super::player::AlarmPlayer;
use crate::logger::ActivityLogger;
use crate::scheduler::dispatch::panic_message;

/// Alarm operations the monitor loop depends on.
pub trait AlarmControl {
    /// Ensure exactly one alarm loop is running.
    fn start(&self);
    /// Request the running loop (if any) to end. Does not block.
    fn stop(&self);
    /// Whether a session thread is currently alive.
    fn is_running(&self) -> bool;
}

impl<T: AlarmControl + ?Sized> AlarmControl for Arc<T> {
    fn start(&self) {
        (**self).start();
    }

    fn stop(&self) {
        (**self).stop();
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }
}

struct AlarmSession {
    id: u64,
    cancelled: Arc<AtomicBool>,
    // Dropping the sender disconnects the session's wake receiver.
    wake: Option<Sender<()>>,
    handle: JoinHandle<()>,
}

impl AlarmSession {
    fn signal_stop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        drop(self.wake.take());
    }

    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }
}

pub struct AlarmController {
    player: Arc<dyn AlarmPlayer>,
    check_interval: Duration,
    logger: ActivityLogger,
    session: Mutex<Option<AlarmSession>>,
    sessions_started: AtomicU64,
}

impl std::fmt::Debug for AlarmController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmController")
            .field("check_interval", &self.check_interval)
            .field("running", &self.is_running())
            .field("sessions_started", &self.sessions_started())
            .finish_non_exhaustive()
    }
}

impl AlarmController {
    #[must_use]
    pub fn new(
        player: Arc<dyn AlarmPlayer>,
        check_interval: Duration,
        logger: ActivityLogger,
    ) -> Self {
        Self {
            player,
            check_interval,
            logger,
            session: Mutex::new(None),
            sessions_started: AtomicU64::new(0),
        }
    }

    /// Total sessions launched since construction.
    #[must_use]
    pub fn sessions_started(&self) -> u64 {
        self.sessions_started.load(Ordering::SeqCst)
    }

    fn launch(&self) -> Option<AlarmSession> {
        let id = self.sessions_started.fetch_add(1, Ordering::SeqCst) + 1;
        let cancelled = Arc::new(AtomicBool::new(false));
        let (wake_tx, wake_rx) = bounded::<()>(1);

        let worker = SessionWorker {
            id,
            player: Arc::clone(&self.player),
            cancelled: Arc::clone(&cancelled),
            wake: wake_rx,
            check_interval: self.check_interval,
            logger: self.logger.clone(),
        };
        match std::thread::Builder::new()
            .name(format!("wg-alarm-{id}"))
            .spawn(move || worker.run())
        {
            Ok(handle) => {
                self.logger
                    .info("alarm", "session_started", format!("session {id}"));
                Some(AlarmSession {
                    id,
                    cancelled,
                    wake: Some(wake_tx),
                    handle,
                })
            }
            Err(err) => {
                self.logger.error(
                    "alarm",
                    "spawn_failed",
                    format!("session {id} could not start: {err}"),
                );
                None
            }
        }
    }
}

impl AlarmControl for AlarmController {
    fn start(&self) {
        let mut slot = self.session.lock();
        if slot.as_ref().is_some_and(AlarmSession::is_alive) {
            return;
        }
        *slot = self.launch();
    }

    fn stop(&self) {
        let taken = self.session.lock().take();
        if let Some(mut session) = taken {
            session.signal_stop();
            self.logger.info(
                "alarm",
                "stop_requested",
                format!("session {}", session.id),
            );
            // Handle dropped here: the thread finishes on its own.
        }
    }

    fn is_running(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(AlarmSession::is_alive)
    }
}

impl Drop for AlarmController {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.get_mut().take() {
            session.signal_stop();
        }
    }
}

struct SessionWorker {
    id: u64,
    player: Arc<dyn AlarmPlayer>,
    cancelled: Arc<AtomicBool>,
    wake: Receiver<()>,
    check_interval: Duration,
    logger: ActivityLogger,
}

impl SessionWorker {
    fn run(self) {
        let mut attempts = 0_u64;
        let mut failures = 0_u64;
        while !self.cancelled.load(Ordering::SeqCst) {
            attempts += 1;
            let failure = match catch_unwind(AssertUnwindSafe(|| self.player.play())) {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(panic) => Some(format!("player panicked: {}", panic_message(panic.as_ref()))),
            };
            if let Some(reason) = failure {
                failures += 1;
                self.logger.warn(
                    "alarm",
                    "playback_failed",
                    format!("session {} attempt {attempts}: {reason}", self.id),
                );
            }
            match self.wake.recv_timeout(self.check_interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.logger.info(
            "alarm",
            "session_ended",
            format!(
                "session {} after {attempts} attempts ({failures} failed)",
                self.id
            ),
        );
    }
}
