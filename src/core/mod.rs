//! Core touch processing.
//!
//! This module contains:
//! - The sensor matrix rebuilt from row lines
//! - Region extraction turning pressure patches into blobs
//! - Frame-to-frame tracking and filtering
//! - The frame processor tying them to an event sink

pub mod matrix;
pub mod processor;
pub mod regions;
pub mod tracker;

/// Maximum number of simultaneous touches.
pub const MAX_TOUCH: usize = 10;

// Re-export commonly used types
pub use matrix::{SensorMatrix, GRID_COLS, GRID_ROWS};
pub use processor::{FrameProcessor, PipelineCounters};
pub use regions::{Blob, RegionExtractor, ScreenMapper};
pub use tracker::{FrameUpdate, TouchPoint, TouchTracker};
