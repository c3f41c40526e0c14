//! Activity logging: append-only JSONL with a non-blocking writer thread,
//! optional stderr mirroring, and graceful degradation.

pub mod jsonl;

pub use jsonl::{ActivityEvent, ActivityLogger, Level, MemoryLog};
