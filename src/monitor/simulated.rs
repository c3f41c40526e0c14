//! Seeded driver simulator: mostly-open eyes with blinks, occasional dozes,
//! and dropped frames. Timestamps advance on a virtual timeline of one
//! `tick_period` per read, so a given seed always yields the same trace.

#![allow(missing_docs)]

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::source::SignalSource;
use crate::core::errors::{Result, WgError};
use crate::escalation::Observation;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationProfile {
    pub tick_period: Duration,
    /// Per-tick probability that an awake driver starts a blink.
    pub blink_chance: f64,
    /// Per-tick probability that an awake driver starts dozing.
    pub doze_chance: f64,
    /// Doze length bounds, in seconds.
    pub doze_secs: (f64, f64),
    /// Per-tick probability that a frame is lost.
    pub drop_chance: f64,
    /// End the stream after this many reads.
    pub max_ticks: Option<u64>,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(50),
            blink_chance: 0.02,
            doze_chance: 0.002,
            doze_secs: (1.0, 8.0),
            drop_chance: 0.01,
            max_ticks: None,
        }
    }
}

#[derive(Debug)]
pub struct SimulatedSource {
    profile: SimulationProfile,
    rng: StdRng,
    origin: Option<Instant>,
    ticks: u64,
    closed_ticks_left: u64,
    released: bool,
}

impl SimulatedSource {
    #[must_use]
    pub fn new(seed: u64, profile: SimulationProfile) -> Self {
        Self {
            profile,
            rng: StdRng::seed_from_u64(seed),
            origin: None,
            ticks: 0,
            closed_ticks_left: 0,
            released: false,
        }
    }

    fn ticks_for(&self, secs: f64) -> u64 {
        let period = self.profile.tick_period.as_secs_f64().max(1e-3);
        (secs / period).ceil().max(1.0) as u64
    }

    fn next_eyes_open(&mut self) -> bool {
        if self.closed_ticks_left > 0 {
            self.closed_ticks_left -= 1;
            return false;
        }
        if self.rng.random_bool(self.profile.doze_chance.clamp(0.0, 1.0)) {
            let (lo, hi) = self.profile.doze_secs;
            let secs = if hi > lo {
                self.rng.random_range(lo..hi)
            } else {
                lo
            };
            self.closed_ticks_left = self.ticks_for(secs).saturating_sub(1);
            return false;
        }
        if self.rng.random_bool(self.profile.blink_chance.clamp(0.0, 1.0)) {
            // Blinks last 100-300 ms.
            let secs = self.rng.random_range(0.1..0.3);
            self.closed_ticks_left = self.ticks_for(secs).saturating_sub(1);
            return false;
        }
        true
    }
}

impl SignalSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    fn acquire(&mut self) -> Result<()> {
        if self.origin.is_some() || self.released {
            return Err(WgError::SourceUnavailable {
                source_name: "simulated".to_string(),
                details: "simulated streams are not restartable".to_string(),
            });
        }
        self.origin = Some(Instant::now());
        Ok(())
    }

    fn next_observation(&mut self) -> Result<Option<Observation>> {
        let Some(origin) = self.origin.filter(|_| !self.released) else {
            return Err(WgError::Runtime {
                details: "simulated source read outside acquire/release".to_string(),
            });
        };
        if self
            .profile
            .max_ticks
            .is_some_and(|limit| self.ticks >= limit)
        {
            return Ok(None);
        }
        let tick = self.ticks;
        self.ticks += 1;
        let offset = self
            .profile
            .tick_period
            .saturating_mul(u32::try_from(tick).unwrap_or(u32::MAX));
        let at = origin + offset;
        let eyes_open = self.next_eyes_open();

        if self.rng.random_bool(self.profile.drop_chance.clamp(0.0, 1.0)) {
            return Err(WgError::SignalRead {
                source_name: "simulated".to_string(),
                details: format!("frame {tick} dropped"),
            });
        }
        Ok(Some(Observation { at, eyes_open }))
    }

    fn release(&mut self) {
        self.released = true;
    }
}
