//! Signal-source contract and the scoped guard that owns an acquired source.
//!
//! [`SourceGuard`] releases the source on [`Drop`]: on normal exit, on an
//! early `?` return, and during unwinding. Never more than once.

#![allow(missing_docs)]

use crate::core::errors::Result;
use crate::escalation::Observation;

/// Per-tick producer of eyes-open observations (camera + classifier, a
/// recorded trace, a simulator).
pub trait SignalSource {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Open the underlying resource. Failure is fatal to the monitor.
    fn acquire(&mut self) -> Result<()>;

    /// Read one observation. Must return within a bounded time.
    ///
    /// `Ok(None)` marks the end of a finite stream. Retryable errors
    /// (see [`crate::core::errors::WgError::is_retryable`]) are skipped ticks.
    fn next_observation(&mut self) -> Result<Option<Observation>>;

    /// Release the underlying resource.
    fn release(&mut self);
}

impl<S: SignalSource + ?Sized> SignalSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn acquire(&mut self) -> Result<()> {
        (**self).acquire()
    }

    fn next_observation(&mut self) -> Result<Option<Observation>> {
        (**self).next_observation()
    }

    fn release(&mut self) {
        (**self).release();
    }
}

/// RAII ownership of an acquired [`SignalSource`].
pub struct SourceGuard<'a, S: SignalSource + ?Sized> {
    source: &'a mut S,
    released: bool,
}

impl<'a, S: SignalSource + ?Sized> SourceGuard<'a, S> {
    /// Acquire `source`. On failure nothing was acquired, so nothing is released.
    pub fn acquire(source: &'a mut S) -> Result<Self> {
        source.acquire()?;
        Ok(Self {
            source,
            released: false,
        })
    }

    pub fn next_observation(&mut self) -> Result<Option<Observation>> {
        self.source.next_observation()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.source.name()
    }

    /// Release now instead of at drop.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.source.release();
        }
    }
}

impl<S: SignalSource + ?Sized> Drop for SourceGuard<'_, S> {
    fn drop(&mut self) {
        self.release_once();
    }
}
