//! Reassembly of the sensor's framed UART lines.
//!
//! The touch controller streams commands that each start with a `0xFF`
//! header. The link has no retransmission: a partial line is dropped as soon
//! as a new header shows up, so corruption heals within one line.

use crate::core::matrix::GRID_COLS;

/// First byte of every line.
pub const HEADER: u8 = 0xFF;
/// Command byte of a row-data line.
pub const CMD_ROW: u8 = 0x43;
/// Command byte of a frame-end line.
pub const CMD_FRAME_END: u8 = 0x47;
/// Capacity of the line buffer.
pub const MAX_LINE_LEN: usize = 64;
/// Header, command, row index, samples and one trailer byte.
pub const ROW_LINE_LEN: usize = GRID_COLS + 4;

const FRAME_START_BIT: u8 = 0x80;
const ROW_INDEX_MASK: u8 = 0x1F;

/// One row of sensor samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLine {
    /// Raw row byte: bit 7 marks a frame start, the low 5 bits the row.
    pub index_byte: u8,
    pub samples: [u8; GRID_COLS],
}

impl RowLine {
    /// Whether this row opens a new frame.
    pub fn is_frame_start(&self) -> bool {
        self.index_byte & FRAME_START_BIT != 0
    }

    /// Target row in the matrix. Only the low 5 bits are meaningful.
    pub fn row(&self) -> usize {
        (self.index_byte & ROW_INDEX_MASK) as usize
    }
}

/// A complete, length-validated protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Row(RowLine),
    FrameEnd,
}

/// Byte-at-a-time line reassembler.
#[derive(Debug)]
pub struct LineAssembler {
    buf: [u8; MAX_LINE_LEN],
    len: usize,
    completed: u64,
    dropped: u64,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self {
            buf: [0; MAX_LINE_LEN],
            len: 0,
            completed: 0,
            dropped: 0,
        }
    }

    /// Feed one byte, returning a line once its length checks out.
    pub fn feed(&mut self, byte: u8) -> Option<Line> {
        if self.len == 0 && byte != HEADER {
            return None;
        }

        // An aborted send shows up as an out of place header. It may still be
        // the last byte of the current line, so only restart when it can't be.
        if byte == HEADER && self.len > 0 && !self.completes_at(self.len + 1) {
            self.discard();
        }

        if self.len == MAX_LINE_LEN {
            self.discard();
            if byte != HEADER {
                return None;
            }
        }

        self.buf[self.len] = byte;
        self.len += 1;

        if !self.completes_at(self.len) {
            return None;
        }

        let line = self.decode();
        self.len = 0;
        self.completed += 1;
        Some(line)
    }

    /// Number of lines successfully assembled.
    pub fn completed_lines(&self) -> u64 {
        self.completed
    }

    /// Number of partial lines thrown away.
    pub fn dropped_lines(&self) -> u64 {
        self.dropped
    }

    /// Bytes currently buffered for an incomplete line.
    pub fn pending(&self) -> usize {
        self.len
    }

    /// Whether a buffer of `len` bytes would form a valid line given the
    /// header bytes received so far.
    fn completes_at(&self, len: usize) -> bool {
        if self.len < 2 || self.buf[0] != HEADER {
            return false;
        }
        match self.buf[1] {
            CMD_ROW => len == ROW_LINE_LEN,
            CMD_FRAME_END => self.len > 2 && len > 4 && len == self.buf[2] as usize + 4,
            _ => false,
        }
    }

    fn decode(&self) -> Line {
        match self.buf[1] {
            CMD_ROW => {
                let mut samples = [0u8; GRID_COLS];
                samples.copy_from_slice(&self.buf[3..3 + GRID_COLS]);
                Line::Row(RowLine {
                    index_byte: self.buf[2],
                    samples,
                })
            }
            _ => Line::FrameEnd,
        }
    }

    fn discard(&mut self) {
        tracing::debug!(
            bytes = self.len,
            command = self.buf.get(1).copied().unwrap_or_default(),
            "discarding partial line"
        );
        self.len = 0;
        self.dropped += 1;
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a row-data line the way the controller sends it.
pub fn encode_row(index_byte: u8, samples: &[u8; GRID_COLS]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ROW_LINE_LEN);
    out.extend_from_slice(&[HEADER, CMD_ROW, index_byte]);
    out.extend_from_slice(samples);
    out.push(0x00);
    out
}

/// Encode a minimal frame-end line.
pub fn encode_frame_end() -> Vec<u8> {
    vec![HEADER, CMD_FRAME_END, 0x01, 0x00, 0x00]
}
