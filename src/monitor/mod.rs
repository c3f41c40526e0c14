//! Signal sources: the per-tick observation contract, its scoped guard,
//! recorded-trace replay, and a seeded simulator.

pub mod replay;
pub mod simulated;
pub mod source;

pub use replay::ReplaySource;
pub use simulated::{SimulatedSource, SimulationProfile};
pub use source::{SignalSource, SourceGuard};
