//! Replays a recorded observation trace (JSONL).
//!
//! One object per line: `{"t": 2.35, "eyes_open": false}` where `t` is
//! seconds since the start of the trace. Blank lines and `#` comments are
//! skipped. A malformed line is a retryable [`WgError::SignalFormat`], so the
//! monitor skips it like a dropped frame.

#![allow(missing_docs)]

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Deserialize;

use super::source::SignalSource;
use crate::core::errors::{Result, WgError};
use crate::escalation::Observation;

#[derive(Debug, Deserialize)]
struct TraceRecord {
    t: f64,
    eyes_open: bool,
}

#[derive(Debug)]
pub struct ReplaySource {
    path: PathBuf,
    name: String,
    reader: Option<BufReader<File>>,
    origin: Option<Instant>,
    line_no: usize,
    exhausted: bool,
    released: bool,
}

impl ReplaySource {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            name: format!("replay:{}", path.display()),
            reader: None,
            origin: None,
            line_no: 0,
            exhausted: false,
            released: false,
        }
    }

    fn parse(&self, origin: Instant, line: &str) -> Result<Observation> {
        let record: TraceRecord =
            serde_json::from_str(line).map_err(|err| WgError::SignalFormat {
                line: self.line_no,
                details: err.to_string(),
            })?;
        let at = Duration::try_from_secs_f64(record.t)
            .ok()
            .and_then(|offset| origin.checked_add(offset))
            .ok_or_else(|| WgError::SignalFormat {
                line: self.line_no,
                details: format!("offset must be finite, >= 0 and in range, got {}", record.t),
            })?;
        Ok(Observation {
            at,
            eyes_open: record.eyes_open,
        })
    }
}

impl SignalSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&mut self) -> Result<()> {
        if self.exhausted || self.released || self.reader.is_some() {
            return Err(WgError::SourceUnavailable {
                source_name: self.name.clone(),
                details: "trace streams are not restartable".to_string(),
            });
        }
        let file = File::open(&self.path).map_err(|err| WgError::SourceUnavailable {
            source_name: self.name.clone(),
            details: err.to_string(),
        })?;
        self.reader = Some(BufReader::new(file));
        self.origin = Some(Instant::now());
        Ok(())
    }

    fn next_observation(&mut self) -> Result<Option<Observation>> {
        let (Some(reader), Some(origin)) = (self.reader.as_mut(), self.origin) else {
            return Err(WgError::Runtime {
                details: format!("{} read before acquire", self.name),
            });
        };
        let mut line = String::new();
        loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .map_err(|err| WgError::SignalRead {
                    source_name: self.name.clone(),
                    details: err.to_string(),
                })?;
            if read == 0 {
                self.exhausted = true;
                return Ok(None);
            }
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return self.parse(origin, trimmed).map(Some);
        }
    }

    fn release(&mut self) {
        self.reader = None;
        self.released = true;
    }
}
