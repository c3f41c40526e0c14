//! Append-only JSONL activity log with a dedicated writer thread.
//!
//! Producers never block: events are serialized on the caller's thread and
//! handed to the writer through a bounded channel with `try_send`. When the
//! channel is full (or the writer has gone away) the event is dropped and
//! counted instead. The same counter surfaces in the self-monitor state file.

#![allow(missing_docs)]

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use chrono::{SecondsFormat, Utc};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use serde::Serialize;

use crate::core::errors::{Result, WgError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    const fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// One line of the activity log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEvent {
    pub ts: String,
    pub level: Level,
    pub component: &'static str,
    pub event: &'static str,
    pub detail: String,
}

impl ActivityEvent {
    #[must_use]
    pub fn now(
        level: Level,
        component: &'static str,
        event: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level,
            component,
            event,
            detail: detail.into(),
        }
    }
}

/// Shared handle to captured events, used by [`ActivityLogger::in_memory`].
pub type MemoryLog = Arc<Mutex<Vec<ActivityEvent>>>;

enum Sink {
    Null,
    Memory(MemoryLog),
    Jsonl {
        sender: Mutex<Option<Sender<String>>>,
        writer: Mutex<Option<JoinHandle<()>>>,
        path: PathBuf,
    },
}

struct Inner {
    sink: Sink,
    stderr: bool,
    dropped: Arc<AtomicU64>,
}

/// Cloneable activity logger. All clones feed the same sink.
#[derive(Clone)]
pub struct ActivityLogger {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ActivityLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sink = match &self.inner.sink {
            Sink::Null => "null".to_string(),
            Sink::Memory(_) => "memory".to_string(),
            Sink::Jsonl { path, .. } => path.display().to_string(),
        };
        f.debug_struct("ActivityLogger")
            .field("sink", &sink)
            .field("stderr", &self.inner.stderr)
            .field("dropped", &self.dropped_events())
            .finish()
    }
}

impl ActivityLogger {
    fn with_sink(sink: Sink, stderr: bool, dropped: Arc<AtomicU64>) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                stderr,
                dropped,
            }),
        }
    }

    /// Logger that only mirrors to stderr (or discards, if `stderr` is false).
    #[must_use]
    pub fn stderr_only(stderr: bool) -> Self {
        Self::with_sink(Sink::Null, stderr, Arc::new(AtomicU64::new(0)))
    }

    /// Logger that discards everything.
    #[must_use]
    pub fn null() -> Self {
        Self::stderr_only(false)
    }

    /// Logger that captures events in memory. Used by tests and embedders.
    #[must_use]
    pub fn in_memory() -> (Self, MemoryLog) {
        let log: MemoryLog = Arc::new(Mutex::new(Vec::new()));
        let logger = Self::with_sink(
            Sink::Memory(Arc::clone(&log)),
            false,
            Arc::new(AtomicU64::new(0)),
        );
        (logger, log)
    }

    /// Open (append) a JSONL file and start its writer thread.
    pub fn jsonl(path: &Path, capacity: usize, stderr: bool) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| WgError::io(parent, err))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| WgError::io(path, err))?;

        let (sender, receiver) = bounded::<String>(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let writer_dropped = Arc::clone(&dropped);
        let writer = std::thread::Builder::new()
            .name("wg-log-writer".to_string())
            .spawn(move || write_lines(file, &receiver, &writer_dropped))
            .map_err(|err| WgError::Runtime {
                details: format!("failed to spawn log writer: {err}"),
            })?;

        Ok(Self::with_sink(
            Sink::Jsonl {
                sender: Mutex::new(Some(sender)),
                writer: Mutex::new(Some(writer)),
                path: path.to_path_buf(),
            },
            stderr,
            dropped,
        ))
    }

    pub fn info(&self, component: &'static str, event: &'static str, detail: impl Into<String>) {
        self.record(ActivityEvent::now(Level::Info, component, event, detail));
    }

    pub fn warn(&self, component: &'static str, event: &'static str, detail: impl Into<String>) {
        self.record(ActivityEvent::now(Level::Warn, component, event, detail));
    }

    pub fn error(&self, component: &'static str, event: &'static str, detail: impl Into<String>) {
        self.record(ActivityEvent::now(Level::Error, component, event, detail));
    }

    pub fn record(&self, event: ActivityEvent) {
        if self.inner.stderr {
            eprintln!(
                "{} {:<5} [{}] {}: {}",
                event.ts,
                event.level.label(),
                event.component,
                event.event,
                event.detail
            );
        }
        match &self.inner.sink {
            Sink::Null => {}
            Sink::Memory(log) => log.lock().push(event),
            Sink::Jsonl { sender, .. } => {
                let line = match serde_json::to_string(&event) {
                    Ok(line) => line,
                    Err(_) => {
                        self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                };
                let guard = sender.lock();
                let sent = guard.as_ref().is_some_and(|tx| match tx.try_send(line) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
                });
                if !sent {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Events lost to a full channel, a dead writer, or a failed write.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Close the channel and wait for the writer to drain. Later events are
    /// counted as dropped. Idempotent.
    pub fn shutdown(&self) {
        if let Sink::Jsonl { sender, writer, .. } = &self.inner.sink {
            drop(sender.lock().take());
            if let Some(handle) = writer.lock().take() {
                let _ = handle.join();
            }
        }
    }
}

fn write_lines(file: File, receiver: &Receiver<String>, dropped: &AtomicU64) {
    let mut out = BufWriter::new(file);
    while let Ok(first) = receiver.recv() {
        let mut batch = vec![first];
        batch.extend(receiver.try_iter());
        for line in batch {
            if writeln!(out, "{line}").is_err() {
                dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        let _ = out.flush();
    }
    let _ = out.flush();
}
