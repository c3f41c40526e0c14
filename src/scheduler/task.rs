//! Task handles, completion status, cooperative cancellation, and the
//! callback contract for response agents.

#![allow(missing_docs)]

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Outcome of one callback invocation. Errors are logged by the scheduler.
pub type CallbackResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A response-agent entry point (`onAlert`, `onRecovery`).
///
/// Runs on its own thread, may take arbitrarily long, and may poll the
/// [`CancelToken`] to cooperate with shutdown.
pub trait Callback: Send + Sync + 'static {
    fn call(&self, cancel: &CancelToken) -> CallbackResult;
}

impl<F> Callback for F
where
    F: Fn(&CancelToken) -> CallbackResult + Send + Sync + 'static,
{
    fn call(&self, cancel: &CancelToken) -> CallbackResult {
        self(cancel)
    }
}

/// Cooperative cancellation flag shared between the scheduler and one task.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Ok,
    Failed(String),
    /// Cancellation was requested; whatever the callback returned was discarded.
    Cancelled,
}

impl TaskStatus {
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatusCell {
    status: Mutex<Option<TaskStatus>>,
    done: Condvar,
}

impl StatusCell {
    pub(crate) fn finish(&self, status: TaskStatus) {
        *self.status.lock() = Some(status);
        self.done.notify_all();
    }

    fn get(&self) -> TaskStatus {
        self.status.lock().clone().unwrap_or(TaskStatus::Pending)
    }
}

/// Caller-side view of one dispatch. The scheduler's registry, not this
/// handle, keeps the task alive; dropping it changes nothing.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    id: TaskId,
    label: &'static str,
    cell: Arc<StatusCell>,
}

impl ScheduledTask {
    pub(crate) fn new(id: TaskId, label: &'static str) -> Self {
        Self {
            id,
            label,
            cell: Arc::new(StatusCell::default()),
        }
    }

    pub(crate) fn cell(&self) -> Arc<StatusCell> {
        Arc::clone(&self.cell)
    }

    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.label
    }

    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.cell.get()
    }

    /// Block until the task finishes or `timeout` elapses; returns the status
    /// at that point. Never called from the monitor loop.
    pub fn wait(&self, timeout: Duration) -> TaskStatus {
        let deadline = Instant::now() + timeout;
        let mut guard = self.cell.status.lock();
        while guard.is_none() {
            if self.cell.done.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        guard.clone().unwrap_or(TaskStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn handle_reports_pending_until_finished() {
        let task = ScheduledTask::new(TaskId(7), "alert");
        assert_eq!(task.status(), TaskStatus::Pending);
        assert_eq!(task.wait(Duration::from_millis(10)), TaskStatus::Pending);

        task.cell().finish(TaskStatus::Ok);
        assert_eq!(task.status(), TaskStatus::Ok);
        assert!(task.status().is_finished());
        assert_eq!(task.id().to_string(), "#7");
    }
}
