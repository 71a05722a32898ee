//! Session statistics.
//!
//! Counters describe how the link and the pipeline behave (bytes, lines,
//! dropped lines, frames, liftoffs, timeouts). No touch positions are kept,
//! and nothing is written to disk.

pub mod stats;

pub use stats::{SessionStats, StatsSnapshot, Totals};
