//! The real-time acquisition loop.
//!
//! Bytes arrive from the reader thread in bursts while the sensor is being
//! touched and stop entirely when it is not. After each burst the loop waits
//! at most `liftoff_timeout` for more; if none come the touches are lifted
//! and the loop blocks until the sensor wakes up again.
//!
//! ```text
//!   data ──▶ Bounded ──(timeout: liftoff)──▶ Idle
//!              ▲                               │
//!              └────────────── data ◀──────────┘
//! ```

pub mod reader;
pub mod realtime;

pub use reader::{open_input, ByteReader, ReadEvent, READ_BUF_SIZE};
pub use realtime::{request_realtime_priority, REALTIME_PRIORITY};

use crate::core::FrameProcessor;
use crate::diagnostics::SessionStats;
use crate::output::EventSink;
use crossbeam_channel::{select, Receiver, RecvError};
use std::io;
use std::time::Duration;

/// How the loop waits for the next chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPhase {
    /// Data arrived recently; give up after the liftoff timeout.
    Bounded,
    /// Nothing pending; block until bytes arrive.
    Idle,
}

/// Why the loop stopped.
#[derive(Debug)]
pub enum LoopExit {
    Shutdown,
    InputClosed,
    InputFailed(io::Error),
}

enum Wake {
    Input(Result<ReadEvent, RecvError>),
    Timeout,
    Shutdown,
}

/// Drives a [`FrameProcessor`] from a stream of byte chunks.
pub struct AcquisitionLoop<S: EventSink> {
    processor: FrameProcessor<S>,
    liftoff_timeout: Duration,
    phase: WaitPhase,
    stats: SessionStats,
}

impl<S: EventSink> AcquisitionLoop<S> {
    pub fn new(processor: FrameProcessor<S>, liftoff_timeout: Duration) -> Self {
        Self {
            processor,
            liftoff_timeout,
            phase: WaitPhase::Idle,
            stats: SessionStats::new(),
        }
    }

    pub fn phase(&self) -> WaitPhase {
        self.phase
    }

    pub fn processor(&self) -> &FrameProcessor<S> {
        &self.processor
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn into_processor(self) -> FrameProcessor<S> {
        self.processor
    }

    /// Tear the loop down, handing back the processor and final stats.
    pub fn into_parts(mut self) -> (FrameProcessor<S>, SessionStats) {
        self.stats.update(&self.processor.counters());
        (self.processor, self.stats)
    }

    /// Run until shutdown is signalled or the input ends.
    pub fn run(&mut self, input: &Receiver<ReadEvent>, shutdown: &Receiver<()>) -> LoopExit {
        loop {
            let wake = match self.phase {
                WaitPhase::Bounded => select! {
                    recv(input) -> msg => Wake::Input(msg),
                    recv(shutdown) -> _ => Wake::Shutdown,
                    default(self.liftoff_timeout) => Wake::Timeout,
                },
                WaitPhase::Idle => select! {
                    recv(input) -> msg => Wake::Input(msg),
                    recv(shutdown) -> _ => Wake::Shutdown,
                },
            };

            match wake {
                Wake::Input(Ok(ReadEvent::Data(bytes))) => self.on_data(&bytes),
                Wake::Input(Ok(ReadEvent::Failed(e))) => return LoopExit::InputFailed(e),
                Wake::Input(Ok(ReadEvent::Closed)) | Wake::Input(Err(RecvError)) => {
                    return LoopExit::InputClosed
                }
                Wake::Timeout => self.on_timeout(),
                Wake::Shutdown => return LoopExit::Shutdown,
            }
        }
    }

    /// Process a chunk and re-arm the liftoff timeout.
    pub fn on_data(&mut self, bytes: &[u8]) {
        self.processor.feed(bytes);
        self.phase = WaitPhase::Bounded;
        self.stats.update(&self.processor.counters());
    }

    /// The sensor went quiet: lift any active touches and wait indefinitely.
    pub fn on_timeout(&mut self) {
        self.stats.record_timeout();
        if self.processor.liftoff() {
            tracing::debug!("no data for {:?}, lifted touches", self.liftoff_timeout);
        }
        self.phase = WaitPhase::Idle;
        self.stats.update(&self.processor.counters());
    }
}
