//! Non-blocking callback dispatch with an owned in-flight registry.
//!
//! Every dispatch runs on its own thread. The registry entry (thread handle,
//! cancel token, start time) is the task's ownership anchor for its whole
//! lifetime; the task removes its own entry on completion through a weak
//! back-reference, exactly once. Errors and panics are logged and counted,
//! never re-raised.

#![allow(missing_docs)]

use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::task::{Callback, CallbackResult, CancelToken, ScheduledTask, TaskId, TaskStatus};
use crate::logger::ActivityLogger;

struct TaskEntry {
    label: &'static str,
    started: Instant,
    cancel: CancelToken,
    overdue_reported: bool,
    _handle: JoinHandle<()>,
}

type Registry = Mutex<HashMap<TaskId, TaskEntry>>;

pub struct TaskScheduler {
    registry: Arc<Registry>,
    next_id: AtomicU64,
    failures: Arc<AtomicU64>,
    watchdog: Option<Duration>,
    logger: ActivityLogger,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("in_flight", &self.in_flight())
            .field("failures", &self.failures())
            .field("watchdog", &self.watchdog)
            .finish_non_exhaustive()
    }
}

impl TaskScheduler {
    #[must_use]
    pub fn new(logger: ActivityLogger) -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            failures: Arc::new(AtomicU64::new(0)),
            watchdog: None,
            logger,
        }
    }

    /// Report tasks in flight longer than `limit` from [`Self::sweep_overdue`].
    #[must_use]
    pub fn with_watchdog(mut self, limit: Option<Duration>) -> Self {
        self.watchdog = limit;
        self
    }

    /// Launch `callback` on its own thread and return immediately.
    pub fn dispatch(&self, label: &'static str, callback: Arc<dyn Callback>) -> ScheduledTask {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let task = ScheduledTask::new(id, label);
        let cancel = CancelToken::new();

        let completion = Completion {
            id,
            label,
            registry: Arc::downgrade(&self.registry),
            cancel: cancel.clone(),
            failures: Arc::clone(&self.failures),
            logger: self.logger.clone(),
        };
        let cell = task.cell();

        // Held across spawn so the task cannot remove its entry before it exists.
        let mut registry = self.registry.lock();
        let spawned = std::thread::Builder::new()
            .name(format!("wg-task-{label}-{}", id.0))
            .spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| callback.call(&completion.cancel)));
                let status = completion.finish(outcome);
                cell.finish(status);
            });

        match spawned {
            Ok(handle) => {
                registry.insert(
                    id,
                    TaskEntry {
                        label,
                        started: Instant::now(),
                        cancel,
                        overdue_reported: false,
                        _handle: handle,
                    },
                );
                drop(registry);
                self.logger
                    .info("scheduler", "dispatched", format!("{label} task {id}"));
            }
            Err(err) => {
                drop(registry);
                let reason = format!("spawn failed: {err}");
                self.failures.fetch_add(1, Ordering::SeqCst);
                self.logger.error(
                    "scheduler",
                    "task_failed",
                    format!("{label} task {id}: {reason}"),
                );
                task.cell().finish(TaskStatus::Failed(reason));
            }
        }
        task
    }

    /// Request cancellation of every outstanding task. Returns how many were
    /// signalled. Tasks that ignore the token run on; their results are discarded.
    pub fn cancel_all(&self) -> usize {
        let registry = self.registry.lock();
        for entry in registry.values() {
            entry.cancel.cancel();
        }
        let count = registry.len();
        drop(registry);
        if count > 0 {
            self.logger.info(
                "scheduler",
                "cancel_requested",
                format!("{count} task(s) outstanding"),
            );
        }
        count
    }

    /// Log (once per task) every entry in flight longer than the watchdog
    /// limit. Returns the number newly reported. No-op without a watchdog.
    pub fn sweep_overdue(&self, now: Instant) -> usize {
        let Some(limit) = self.watchdog else {
            return 0;
        };
        let mut overdue = Vec::new();
        {
            let mut registry = self.registry.lock();
            for (id, entry) in registry.iter_mut() {
                let age = now.saturating_duration_since(entry.started);
                if !entry.overdue_reported && age > limit {
                    entry.overdue_reported = true;
                    overdue.push((*id, entry.label, age));
                }
            }
        }
        for (id, label, age) in &overdue {
            self.logger.warn(
                "scheduler",
                "task_overdue",
                format!("{label} task {id} in flight for {:.1}s", age.as_secs_f64()),
            );
        }
        overdue.len()
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.registry.lock().len()
    }

    /// Failed completions since construction (errors, panics, spawn failures).
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }
}

struct Completion {
    id: TaskId,
    label: &'static str,
    registry: Weak<Registry>,
    cancel: CancelToken,
    failures: Arc<AtomicU64>,
    logger: ActivityLogger,
}

impl Completion {
    fn finish(&self, outcome: Result<CallbackResult, Box<dyn Any + Send>>) -> TaskStatus {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(&self.id);
        }

        let (label, id) = (self.label, self.id);
        if self.cancel.is_cancelled() {
            self.logger.info(
                "scheduler",
                "task_discarded",
                format!("{label} task {id} finished after cancellation"),
            );
            return TaskStatus::Cancelled;
        }

        let reason = match outcome {
            Ok(Ok(())) => {
                self.logger
                    .info("scheduler", "task_completed", format!("{label} task {id}"));
                return TaskStatus::Ok;
            }
            Ok(Err(err)) => err.to_string(),
            Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
        };
        self.failures.fetch_add(1, Ordering::SeqCst);
        self.logger.error(
            "scheduler",
            "task_failed",
            format!("{label} task {id}: {reason}"),
        );
        TaskStatus::Failed(reason)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
