//! The sensor intensity grid.

use crate::protocol::RowLine;

/// Rows delivered by the controller (the `i` axis).
pub const GRID_ROWS: usize = 30;
/// Samples per row (the `j` axis).
pub const GRID_COLS: usize = 40;

/// One full scan of the sensor, rebuilt row by row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorMatrix {
    cells: [[u8; GRID_COLS]; GRID_ROWS],
}

impl SensorMatrix {
    pub fn new() -> Self {
        Self {
            cells: [[0; GRID_COLS]; GRID_ROWS],
        }
    }

    /// Write a decoded row into the grid, clearing it first on a frame start.
    ///
    /// Returns `false` when the masked row index falls outside the grid; the
    /// samples are dropped in that case.
    pub fn apply_row(&mut self, line: &RowLine) -> bool {
        if line.is_frame_start() {
            self.clear();
        }

        let row = line.row();
        match self.cells.get_mut(row) {
            Some(cells) => {
                *cells = line.samples;
                true
            }
            None => {
                tracing::debug!(row, "row index outside the sensor grid");
                false
            }
        }
    }

    pub fn clear(&mut self) {
        self.cells = [[0; GRID_COLS]; GRID_ROWS];
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> u8 {
        self.cells[i][j]
    }

    pub fn set(&mut self, i: usize, j: usize, value: u8) {
        self.cells[i][j] = value;
    }

    pub fn rows(&self) -> &[[u8; GRID_COLS]; GRID_ROWS] {
        &self.cells
    }

    /// Render the grid as hex, blanking cells below `threshold`.
    pub fn dump(&self, threshold: u8) -> String {
        let mut out = String::with_capacity(GRID_ROWS * (GRID_COLS * 3 + 3));
        for row in &self.cells {
            for &v in row {
                if v < threshold {
                    out.push_str("   ");
                } else {
                    out.push_str(&format!("{v:02X} "));
                }
            }
            out.push_str(" |\n");
        }
        out
    }
}

impl Default for SensorMatrix {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(index_byte: u8, fill: u8) -> RowLine {
        RowLine {
            index_byte,
            samples: [fill; GRID_COLS],
        }
    }

    #[test]
    fn test_rows_land_at_masked_index() {
        let mut matrix = SensorMatrix::new();
        assert!(matrix.apply_row(&row(0x05, 9)));
        // Bits 5 and 6 are not part of the row index.
        assert!(matrix.apply_row(&row(0x60 | 0x07, 4)));

        assert_eq!(matrix.get(5, 0), 9);
        assert_eq!(matrix.get(7, 39), 4);
        assert_eq!(matrix.get(6, 10), 0);
    }

    #[test]
    fn test_frame_start_clears() {
        let mut matrix = SensorMatrix::new();
        matrix.apply_row(&row(0x03, 50));
        matrix.apply_row(&row(0x80 | 0x01, 10));

        assert_eq!(matrix.get(3, 0), 0);
        assert_eq!(matrix.get(1, 0), 10);
    }

    #[test]
    fn test_rows_beyond_grid_are_dropped() {
        let mut matrix = SensorMatrix::new();
        assert!(!matrix.apply_row(&row(0x1E, 77)));
        assert!(!matrix.apply_row(&row(0x1F, 77)));
        assert_eq!(matrix, SensorMatrix::new());
    }

    #[test]
    fn test_dump_blanks_low_values() {
        let mut matrix = SensorMatrix::new();
        matrix.set(0, 0, 0xAB);
        let dump = matrix.dump(2);
        assert!(dump.starts_with("AB "));
        assert_eq!(dump.lines().count(), GRID_ROWS);
    }
}
