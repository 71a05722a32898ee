//! Session counters for the driver.
//!
//! The acquisition loop publishes the processor's totals here after every
//! chunk and counts its own idle timeouts. Nothing outlives the process.

use crate::core::PipelineCounters;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters for the current session, owned by the acquisition loop.
#[derive(Debug)]
pub struct SessionStats {
    totals: Totals,
    session_start: DateTime<Utc>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            totals: Totals::default(),
            session_start: Utc::now(),
        }
    }

    /// Publish the processor's running totals.
    pub fn update(&mut self, counters: &PipelineCounters) {
        let timeouts = self.totals.timeouts;
        self.totals = Totals {
            bytes: counters.bytes,
            lines: counters.lines,
            dropped_lines: counters.dropped_lines,
            frames: counters.frames,
            touches_reported: counters.touches_reported,
            liftoffs: counters.liftoffs,
            write_failures: counters.write_failures,
            timeouts,
        };
    }

    /// Record a liftoff timeout in the acquisition loop.
    pub fn record_timeout(&mut self) {
        self.totals.timeouts += 1;
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            totals: self.totals.clone(),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    pub fn summary(&self) -> String {
        let snapshot = self.snapshot();
        let t = &snapshot.totals;
        format!(
            "Session Statistics:\n\
             - Bytes received: {}\n\
             - Lines decoded: {} ({} dropped)\n\
             - Frames processed: {}\n\
             - Touches reported: {}\n\
             - Liftoffs: {}\n\
             - Idle timeouts: {}\n\
             - Event write failures: {}\n\
             - Session duration: {} seconds",
            t.bytes,
            t.lines,
            t.dropped_lines,
            t.frames,
            t.touches_reported,
            t.liftoffs,
            t.timeouts,
            t.write_failures,
            snapshot.session_duration_secs
        )
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub bytes: u64,
    pub lines: u64,
    pub dropped_lines: u64,
    pub frames: u64,
    pub touches_reported: u64,
    pub liftoffs: u64,
    pub write_failures: u64,
    pub timeouts: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub totals: Totals,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}
