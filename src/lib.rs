//! ctp-touchd - userspace driver for a UART capacitive touch sensor.
//!
//! The sensor streams raw intensity rows over a serial link. This library
//! rebuilds each frame, finds the pressed regions, tracks them across frames
//! with stable identities, filters sensor noise and reports the result as
//! Linux multi-touch events.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           ctp-touchd                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐            │
//! │  │   Reader    │──▶│    Line     │──▶│   Sensor    │            │
//! │  │  (thread)   │   │  Assembler  │   │   Matrix    │            │
//! │  └─────────────┘   └─────────────┘   └─────────────┘            │
//! │                                             │ frame end         │
//! │                                             ▼                   │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐            │
//! │  │   uinput    │◀──│   Emitter   │◀──│  Regions +  │            │
//! │  │   device    │   │  (A or B)   │   │   Tracker   │            │
//! │  └─────────────┘   └─────────────┘   └─────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use ctp_touchd::config::PipelineConfig;
//! use ctp_touchd::core::{FrameProcessor, GRID_COLS};
//! use ctp_touchd::output::RecordingSink;
//! use ctp_touchd::protocol::{encode_frame_end, encode_row};
//!
//! let mut processor = FrameProcessor::new(&PipelineConfig::default(), RecordingSink::new());
//!
//! let mut samples = [0u8; GRID_COLS];
//! samples[20] = 200;
//! processor.feed(&encode_row(0x80, &[0; GRID_COLS]));
//! processor.feed(&encode_row(15, &samples));
//! assert_eq!(processor.feed(&encode_frame_end()), 1);
//! ```

pub mod acquisition;
pub mod config;
pub mod core;
pub mod diagnostics;
pub mod output;
pub mod protocol;

// Re-export key types at crate root for convenience
pub use acquisition::{AcquisitionLoop, ByteReader, LoopExit, ReadEvent, WaitPhase};
pub use config::{Config, ConfigError, Orientation, PipelineConfig, ProtocolVariant};
pub use core::{FrameProcessor, PipelineCounters, TouchTracker};
pub use diagnostics::SessionStats;
pub use output::{EventSink, InputEvent, RecordingSink};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
