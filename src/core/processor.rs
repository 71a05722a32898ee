//! The per-frame pipeline: decode, extract, track, emit.

use crate::config::PipelineConfig;
use crate::core::matrix::SensorMatrix;
use crate::core::regions::RegionExtractor;
use crate::core::tracker::TouchTracker;
use crate::output::{Emitter, EventSink};
use crate::protocol::{Line, LineAssembler};
use serde::{Deserialize, Serialize};

/// Running totals for one processor instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCounters {
    pub bytes: u64,
    pub lines: u64,
    pub dropped_lines: u64,
    pub frames: u64,
    pub touches_reported: u64,
    pub liftoffs: u64,
    pub events_sent: u64,
    pub write_failures: u64,
}

/// Owns all frame state and the sink it reports to.
///
/// A frame is decoded, matched, filtered and emitted in one call; nothing
/// is shared with other threads.
pub struct FrameProcessor<S: EventSink> {
    assembler: LineAssembler,
    matrix: SensorMatrix,
    extractor: RegionExtractor,
    tracker: TouchTracker,
    emitter: Emitter,
    sink: S,
    /// Touches were reported since the last liftoff
    active: bool,
    raw_dump_threshold: Option<u8>,
    bytes: u64,
    frames: u64,
    touches_reported: u64,
    liftoffs: u64,
}

impl<S: EventSink> FrameProcessor<S> {
    pub fn new(config: &PipelineConfig, sink: S) -> Self {
        Self {
            assembler: LineAssembler::new(),
            matrix: SensorMatrix::new(),
            extractor: RegionExtractor::new(&config.tuning, config.orientation),
            tracker: TouchTracker::new(config),
            emitter: Emitter::new(config.protocol),
            sink,
            active: false,
            raw_dump_threshold: None,
            bytes: 0,
            frames: 0,
            touches_reported: 0,
            liftoffs: 0,
        }
    }

    /// Log every completed matrix at trace level, blanking cells below
    /// `threshold`.
    pub fn with_raw_dump(mut self, threshold: Option<u8>) -> Self {
        self.raw_dump_threshold = threshold;
        self
    }

    /// Push a chunk of received bytes through the pipeline. Returns the
    /// number of touches reported across all frames it completed.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        let mut reported = 0;
        for &byte in bytes {
            if let Some(line) = self.assembler.feed(byte) {
                reported += self.apply(&line);
            }
        }
        self.bytes += bytes.len() as u64;
        reported
    }

    /// Apply one decoded line. Only a frame-end line can report touches.
    pub fn apply(&mut self, line: &Line) -> usize {
        match line {
            Line::Row(row) => {
                self.matrix.apply_row(row);
                0
            }
            Line::FrameEnd => self.process_frame(),
        }
    }

    /// Lift all touches if any were reported, and forget tracking history.
    /// Returns whether a liftoff sequence was sent.
    pub fn liftoff(&mut self) -> bool {
        self.lift(Vec::new())
    }

    /// Unconditional liftoff, used at startup in case a previous instance
    /// died with contacts down.
    pub fn force_liftoff(&mut self) {
        self.active = true;
        self.lift(Vec::new());
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn tracker(&self) -> &TouchTracker {
        &self.tracker
    }

    pub fn matrix(&self) -> &SensorMatrix {
        &self.matrix
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn counters(&self) -> PipelineCounters {
        PipelineCounters {
            bytes: self.bytes,
            lines: self.assembler.completed_lines(),
            dropped_lines: self.assembler.dropped_lines(),
            frames: self.frames,
            touches_reported: self.touches_reported,
            liftoffs: self.liftoffs,
            events_sent: self.emitter.events_sent(),
            write_failures: self.emitter.write_failures(),
        }
    }

    fn process_frame(&mut self) -> usize {
        self.frames += 1;
        if let Some(threshold) = self.raw_dump_threshold {
            tracing::trace!("frame {}\n{}", self.frames, self.matrix.dump(threshold));
        }

        let blobs = self.extractor.extract(&self.matrix);
        let update = self.tracker.track(&blobs);

        if self.tracker.admitted_count() == 0 {
            self.lift(update.released_slots);
            return 0;
        }

        let reported = self
            .emitter
            .emit_frame(&mut self.sink, self.tracker.current_mut(), &update);
        if reported > 0 {
            self.active = true;
        }
        self.touches_reported += reported as u64;
        reported
    }

    fn lift(&mut self, mut slots: Vec<usize>) -> bool {
        slots.extend(self.tracker.reset());
        if !self.active {
            return false;
        }

        slots.sort_unstable();
        slots.dedup();
        self.emitter.emit_liftoff(&mut self.sink, &slots);
        self.active = false;
        self.liftoffs += 1;
        tracing::debug!(frame = self.frames, "liftoff");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matrix::GRID_COLS;
    use crate::output::event::{InputEvent, ABS_MT_TRACKING_ID, SYN_MT_REPORT, SYN_REPORT};
    use crate::output::RecordingSink;
    use crate::protocol::{encode_frame_end, encode_row};

    fn frame_with_cell(row: usize, col: usize, value: u8) -> Vec<u8> {
        let mut bytes = encode_row(0x80, &[0; GRID_COLS]);
        let mut samples = [0u8; GRID_COLS];
        samples[col] = value;
        bytes.extend(encode_row(row as u8, &samples));
        bytes.extend(encode_frame_end());
        bytes
    }

    fn empty_frame() -> Vec<u8> {
        let mut bytes = encode_row(0x80, &[0; GRID_COLS]);
        bytes.extend(encode_frame_end());
        bytes
    }

    #[test]
    fn test_rows_without_frame_end_report_nothing() {
        let mut processor = FrameProcessor::new(&PipelineConfig::default(), RecordingSink::new());
        let mut samples = [0u8; GRID_COLS];
        samples[10] = 120;
        assert_eq!(processor.feed(&encode_row(0x85, &samples)), 0);
        assert!(processor.sink().is_empty());
        assert_eq!(processor.matrix().get(5, 10), 120);
    }

    #[test]
    fn test_single_frame_reports_touch() {
        let mut processor = FrameProcessor::new(&PipelineConfig::default(), RecordingSink::new());
        assert_eq!(processor.feed(&frame_with_cell(12, 8, 150)), 1);

        let events = processor.sink().events();
        assert_eq!(events[0], InputEvent::abs(ABS_MT_TRACKING_ID, 0));
        assert_eq!(events.last(), Some(&InputEvent::syn(SYN_REPORT)));
        assert!(processor.is_active());
    }

    #[test]
    fn test_empty_frames_lift_once() {
        let mut processor = FrameProcessor::new(&PipelineConfig::default(), RecordingSink::new());
        processor.feed(&frame_with_cell(12, 8, 150));
        processor.sink_mut().take();

        processor.feed(&empty_frame());
        assert_eq!(
            processor.sink_mut().take(),
            vec![InputEvent::syn(SYN_MT_REPORT), InputEvent::syn(SYN_REPORT)]
        );

        processor.feed(&empty_frame());
        processor.feed(&empty_frame());
        assert!(processor.sink().is_empty());
        assert_eq!(processor.counters().liftoffs, 1);
    }

    #[test]
    fn test_liftoff_without_active_touches_is_silent() {
        let mut processor = FrameProcessor::new(&PipelineConfig::default(), RecordingSink::new());
        assert!(!processor.liftoff());
        assert!(processor.sink().is_empty());
    }

    #[test]
    fn test_force_liftoff() {
        let mut processor = FrameProcessor::new(&PipelineConfig::default(), RecordingSink::new());
        processor.force_liftoff();
        assert_eq!(processor.sink().events().len(), 2);
        assert!(!processor.is_active());
    }

    #[test]
    fn test_counters() {
        let mut processor = FrameProcessor::new(&PipelineConfig::default(), RecordingSink::new());
        let bytes = frame_with_cell(3, 3, 90);
        processor.feed(&bytes[..30]);
        processor.feed(&bytes);

        let counters = processor.counters();
        assert_eq!(counters.bytes, bytes.len() as u64 + 30);
        assert_eq!(counters.lines, 3);
        assert_eq!(counters.dropped_lines, 1);
        assert_eq!(counters.frames, 1);
        assert_eq!(counters.touches_reported, 1);
        assert_eq!(counters.events_sent, 6);
    }
}
