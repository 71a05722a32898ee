//! Blob extraction over the sensor matrix.
//!
//! Regions grow from any cell above the continue threshold. Strong
//! neighbors join unconditionally; weaker fringe neighbors only join while
//! intensity keeps falling away from the contact, so two fingers pinched
//! together are not fused through their shared halo.

use crate::config::{Orientation, Tuning};
use crate::core::matrix::{SensorMatrix, GRID_COLS, GRID_ROWS};
use crate::core::MAX_TOUCH;

const NEIGHBORS: [(isize, isize); 8] = [
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (-1, -1),
    (1, -1),
    (-1, 1),
    (1, 1),
];

/// A connected region of the matrix, interpreted as one contact.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    /// Weighted centroid along the row axis
    pub i: f32,
    /// Weighted centroid along the column axis
    pub j: f32,
    /// Sum of the intensity weights
    pub weight: f32,
    /// Highest intensity in the core of the region
    pub peak: u8,
    /// Bounding box extent scaled to pixels
    pub touch_major: i32,
    /// Screen position
    pub x: i32,
    pub y: i32,
}

/// Maps grid coordinates to screen pixels.
#[derive(Debug, Clone, Copy)]
pub struct ScreenMapper {
    orientation: Orientation,
}

impl ScreenMapper {
    pub fn new(orientation: Orientation) -> Self {
        Self { orientation }
    }

    /// Screen coordinates for a grid centroid, clamped at zero.
    pub fn map(&self, i: f32, j: f32) -> (i32, i32) {
        let (width, height) = self.orientation.resolution();
        let row_span = (GRID_ROWS - 1) as f32;
        let col_span = (GRID_COLS - 1) as f32;

        let (x, y) = match self.orientation {
            Orientation::Landscape => (
                (width - 1) as f32 - j * width as f32 / col_span,
                (height - 1) as f32 - i * height as f32 / row_span,
            ),
            Orientation::Portrait => (
                i * width as f32 / row_span,
                (height - 1) as f32 - j * height as f32 / col_span,
            ),
        };

        ((x as i32).max(0), (y as i32).max(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Growth {
    Core,
    Fringe,
}

#[derive(Debug, Default)]
struct Accumulator {
    weight: f32,
    isum: f32,
    jsum: f32,
    min_i: usize,
    max_i: usize,
    min_j: usize,
    max_j: usize,
    peak: u8,
}

impl Accumulator {
    fn add(&mut self, i: usize, j: usize, value: u8) {
        let powered = (value as f32).powf(1.5);
        self.weight += powered;
        self.isum += powered * i as f32;
        self.jsum += powered * j as f32;
    }

    fn extend(&mut self, i: usize, j: usize, value: u8) {
        self.min_i = self.min_i.min(i);
        self.max_i = self.max_i.max(i);
        self.min_j = self.min_j.min(j);
        self.max_j = self.max_j.max(j);
        self.peak = self.peak.max(value);
    }
}

/// Finds blobs in a matrix, reusing its ownership grid between frames.
#[derive(Debug)]
pub struct RegionExtractor {
    owner: [[u8; GRID_COLS]; GRID_ROWS],
    stack: Vec<(usize, usize, Growth)>,
    continue_threshold: u8,
    unpress_threshold: u8,
    fringe_threshold: u8,
    pixels_per_point: i32,
    mapper: ScreenMapper,
}

impl RegionExtractor {
    pub fn new(tuning: &Tuning, orientation: Orientation) -> Self {
        Self {
            owner: [[0; GRID_COLS]; GRID_ROWS],
            stack: Vec::with_capacity(GRID_ROWS * GRID_COLS),
            continue_threshold: tuning.continue_threshold,
            unpress_threshold: tuning.unpress_threshold,
            fringe_threshold: tuning.fringe_threshold,
            pixels_per_point: tuning.pixels_per_point,
            mapper: ScreenMapper::new(orientation),
        }
    }

    /// Extract up to `MAX_TOUCH` blobs in row-major seed order.
    pub fn extract(&mut self, matrix: &SensorMatrix) -> Vec<Blob> {
        self.owner = [[0; GRID_COLS]; GRID_ROWS];
        let mut blobs = Vec::with_capacity(MAX_TOUCH);

        for i in 0..GRID_ROWS {
            for j in 0..GRID_COLS {
                if blobs.len() >= MAX_TOUCH {
                    return blobs;
                }
                if matrix.get(i, j) > self.continue_threshold && self.owner[i][j] == 0 {
                    let id = blobs.len() as u8 + 1;
                    blobs.push(self.grow(matrix, i, j, id));
                }
            }
        }

        blobs
    }

    /// Which region claimed a cell in the last extraction (0 for none).
    pub fn owner_of(&self, i: usize, j: usize) -> u8 {
        self.owner[i][j]
    }

    fn grow(&mut self, matrix: &SensorMatrix, i: usize, j: usize, id: u8) -> Blob {
        let mut acc = Accumulator {
            min_i: i,
            max_i: i,
            min_j: j,
            max_j: j,
            ..Default::default()
        };

        self.owner[i][j] = id;
        self.stack.clear();
        self.stack.push((i, j, Growth::Core));

        while let Some((ci, cj, growth)) = self.stack.pop() {
            let value = matrix.get(ci, cj);
            acc.add(ci, cj, value);
            if growth == Growth::Core {
                acc.extend(ci, cj, value);
            }

            for (di, dj) in NEIGHBORS {
                let (Some(ni), Some(nj)) = (ci.checked_add_signed(di), cj.checked_add_signed(dj))
                else {
                    continue;
                };
                if ni >= GRID_ROWS || nj >= GRID_COLS || self.owner[ni][nj] != 0 {
                    continue;
                }

                let neighbor = matrix.get(ni, nj);
                let next = if growth == Growth::Core && neighbor >= self.unpress_threshold {
                    Growth::Core
                } else if neighbor >= self.fringe_threshold && neighbor < value {
                    Growth::Fringe
                } else {
                    continue;
                };

                self.owner[ni][nj] = id;
                self.stack.push((ni, nj, next));
            }
        }

        let ci = acc.isum / acc.weight;
        let cj = acc.jsum / acc.weight;
        let extent = (acc.max_i - acc.min_i).max(acc.max_j - acc.min_j) as i32;
        let (x, y) = self.mapper.map(ci, cj);

        Blob {
            i: ci,
            j: cj,
            weight: acc.weight,
            peak: acc.peak,
            touch_major: extent * self.pixels_per_point,
            x,
            y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> RegionExtractor {
        RegionExtractor::new(&Tuning::default(), Orientation::Landscape)
    }

    fn patch(matrix: &mut SensorMatrix, ci: usize, cj: usize, value: u8) {
        for i in ci - 1..=ci + 1 {
            for j in cj - 1..=cj + 1 {
                matrix.set(i, j, value);
            }
        }
    }

    #[test]
    fn test_single_patch_centroid_and_mapping() {
        let mut matrix = SensorMatrix::new();
        patch(&mut matrix, 15, 20, 200);

        let blobs = extractor().extract(&matrix);
        assert_eq!(blobs.len(), 1);

        let blob = &blobs[0];
        assert!((blob.i - 15.0).abs() < 1e-3);
        assert!((blob.j - 20.0).abs() < 1e-3);
        assert_eq!(blob.peak, 200);
        assert_eq!(blob.touch_major, 2 * 25);

        let expected_x = (1023.0 - blob.j * 1024.0 / 39.0) as i32;
        let expected_y = (767.0 - blob.i * 768.0 / 29.0) as i32;
        assert_eq!((blob.x, blob.y), (expected_x, expected_y));
        assert_eq!((blob.x, blob.y), (497, 369));
    }

    #[test]
    fn test_empty_matrix_has_no_blobs() {
        assert!(extractor().extract(&SensorMatrix::new()).is_empty());
    }

    #[test]
    fn test_weak_cells_do_not_seed() {
        let mut matrix = SensorMatrix::new();
        patch(&mut matrix, 5, 5, 20);
        assert!(extractor().extract(&matrix).is_empty());
    }

    #[test]
    fn test_fringe_only_joins_when_decreasing() {
        let mut matrix = SensorMatrix::new();
        // Two contacts whose halos touch at a plateau of fringe values.
        matrix.set(10, 10, 100);
        matrix.set(10, 11, 25);
        matrix.set(10, 12, 25);
        matrix.set(10, 13, 100);

        let mut extractor = extractor();
        let blobs = extractor.extract(&matrix);
        assert_eq!(blobs.len(), 2);
        assert_eq!(extractor.owner_of(10, 11), 1);
        // Equal neighbor is not a decay, so the second contact keeps it.
        assert_eq!(extractor.owner_of(10, 12), 2);
    }

    #[test]
    fn test_fringe_does_not_extend_bounding_box() {
        let mut matrix = SensorMatrix::new();
        matrix.set(10, 10, 100);
        matrix.set(10, 11, 30);
        matrix.set(10, 12, 20);

        let blobs = extractor().extract(&matrix);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].touch_major, 0);
        assert!(blobs[0].j > 10.0);
    }

    #[test]
    fn test_region_cap() {
        let mut matrix = SensorMatrix::new();
        for n in 0..12 {
            matrix.set((n / 6) * 4 + 2, (n % 6) * 4 + 2, 90);
        }
        assert_eq!(extractor().extract(&matrix).len(), MAX_TOUCH);
    }

    #[test]
    fn test_negative_screen_coordinates_clamp() {
        let mapper = ScreenMapper::new(Orientation::Landscape);
        assert_eq!(mapper.map(29.0, 39.0), (0, 0));
        assert_eq!(mapper.map(0.0, 0.0), (1023, 767));
    }

    #[test]
    fn test_portrait_mapping() {
        let mapper = ScreenMapper::new(Orientation::Portrait);
        assert_eq!(mapper.map(0.0, 0.0), (0, 1023));
        let (x, _) = mapper.map(29.0, 0.0);
        assert_eq!(x, 768);
    }
}
