// SPDX-License-Identifier: GPL-3.0-only

//! Binarization of luminance sources
//!
//! Two strategies are provided:
//! - [`Binarization::Hybrid`]: per-block local thresholds, smoothed over a
//!   5x5 neighbourhood of blocks. Precise on evenly lit symbols.
//! - [`Binarization::GlobalHistogram`]: one threshold from the valley between
//!   the two dominant histogram peaks. Coarser, but tolerant of gradients
//!   that confuse the local estimate.
//!
//! Grids smaller than the hybrid minimum fall back to the global histogram.

use crate::errors::ReadError;
use crate::scan::luminance::LuminanceSource;

const LUMINANCE_BITS: u32 = 5;
const LUMINANCE_SHIFT: u32 = 8 - LUMINANCE_BITS;
const LUMINANCE_BUCKETS: usize = 1 << LUMINANCE_BITS;

const BLOCK_SIZE_POWER: usize = 3;
const BLOCK_SIZE: usize = 1 << BLOCK_SIZE_POWER;
const MINIMUM_DIMENSION: usize = BLOCK_SIZE * 5;
const MIN_DYNAMIC_RANGE: u32 = 24;

/// A packed grid of black (true) and white (false) modules
#[derive(Clone, PartialEq, Eq)]
pub struct BitMatrix {
    width: usize,
    height: usize,
    row_words: usize,
    bits: Vec<u32>,
}

impl BitMatrix {
    pub fn new(width: usize, height: usize) -> Self {
        let row_words = width.div_ceil(32);
        Self {
            width,
            height,
            row_words,
            bits: vec![0; row_words * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        let word = self.bits[y * self.row_words + x / 32];
        (word >> (x % 32)) & 1 == 1
    }

    pub fn set(&mut self, x: usize, y: usize, black: bool) {
        let index = y * self.row_words + x / 32;
        let mask = 1u32 << (x % 32);
        if black {
            self.bits[index] |= mask;
        } else {
            self.bits[index] &= !mask;
        }
    }

    /// Number of black modules
    pub fn count_black(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }
}

impl std::fmt::Debug for BitMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BitMatrix({}x{}, {} black)", self.width, self.height, self.count_black())
    }
}

/// Binarization strategy for a decode pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binarization {
    Hybrid,
    GlobalHistogram,
}

impl Binarization {
    /// Convert a luminance source to a black/white matrix
    pub fn black_matrix(self, source: &LuminanceSource) -> Result<BitMatrix, ReadError> {
        match self {
            Binarization::Hybrid => hybrid(source),
            Binarization::GlobalHistogram => global_histogram(source),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Binarization::Hybrid => "hybrid",
            Binarization::GlobalHistogram => "global-histogram",
        }
    }
}

fn global_histogram(source: &LuminanceSource) -> Result<BitMatrix, ReadError> {
    let width = source.width();
    let height = source.height();
    if width == 0 || height == 0 {
        return Err(ReadError::NotFound);
    }

    // Sample four rows from the middle of the image, skipping the outer fifths
    let mut buckets = [0u32; LUMINANCE_BUCKETS];
    let left = width / 5;
    let right = (width * 4) / 5;
    for y in 1..5 {
        let row = source.row(height * y / 5);
        for &pixel in &row[left..right] {
            buckets[(pixel >> LUMINANCE_SHIFT) as usize] += 1;
        }
    }
    let black_point = estimate_black_point(&buckets)?;

    let mut matrix = BitMatrix::new(width, height);
    for y in 0..height {
        for (x, &pixel) in source.row(y).iter().enumerate() {
            if (pixel as u32) < black_point {
                matrix.set(x, y, true);
            }
        }
    }
    Ok(matrix)
}

/// Pick the threshold in the valley between the two tallest histogram peaks
fn estimate_black_point(buckets: &[u32; LUMINANCE_BUCKETS]) -> Result<u32, ReadError> {
    let mut max_bucket_count = 0;
    let mut first_peak = 0;
    let mut first_peak_size = 0;
    for (x, &count) in buckets.iter().enumerate() {
        if count > first_peak_size {
            first_peak = x;
            first_peak_size = count;
        }
        max_bucket_count = max_bucket_count.max(count);
    }

    // Second peak favours tall buckets far from the first
    let mut second_peak = 0;
    let mut second_peak_score = 0u64;
    for (x, &count) in buckets.iter().enumerate() {
        let distance = x.abs_diff(first_peak) as u64;
        let score = count as u64 * distance * distance;
        if score > second_peak_score {
            second_peak = x;
            second_peak_score = score;
        }
    }

    // Single populated bucket
    if second_peak_score == 0 {
        return Err(ReadError::NotFound);
    }

    if first_peak > second_peak {
        std::mem::swap(&mut first_peak, &mut second_peak);
    }

    // Peaks too close together: no contrast worth thresholding
    if second_peak - first_peak <= LUMINANCE_BUCKETS / 16 {
        return Err(ReadError::NotFound);
    }

    let mut best_valley = second_peak - 1;
    let mut best_valley_score = -1i64;
    for x in (first_peak + 1..second_peak).rev() {
        let from_first = (x - first_peak) as i64;
        let score = from_first
            * from_first
            * (second_peak - x) as i64
            * (max_bucket_count - buckets[x]) as i64;
        if score > best_valley_score {
            best_valley = x;
            best_valley_score = score;
        }
    }

    Ok((best_valley as u32) << LUMINANCE_SHIFT)
}

fn hybrid(source: &LuminanceSource) -> Result<BitMatrix, ReadError> {
    let width = source.width();
    let height = source.height();
    if width < MINIMUM_DIMENSION || height < MINIMUM_DIMENSION {
        return global_histogram(source);
    }

    let sub_width = width.div_ceil(BLOCK_SIZE);
    let sub_height = height.div_ceil(BLOCK_SIZE);
    let black_points = block_black_points(source, sub_width, sub_height);

    let mut matrix = BitMatrix::new(width, height);
    for by in 0..sub_height {
        let top = cap(by, sub_height - 3);
        let y_offset = (by << BLOCK_SIZE_POWER).min(height - BLOCK_SIZE);
        for bx in 0..sub_width {
            let left = cap(bx, sub_width - 3);
            let x_offset = (bx << BLOCK_SIZE_POWER).min(width - BLOCK_SIZE);

            let mut sum = 0u32;
            for row in &black_points[top - 2..=top + 2] {
                sum += row[left - 2..=left + 2].iter().sum::<u32>();
            }
            let threshold = sum / 25;

            for y in y_offset..y_offset + BLOCK_SIZE {
                let row = source.row(y);
                for x in x_offset..x_offset + BLOCK_SIZE {
                    if row[x] as u32 <= threshold {
                        matrix.set(x, y, true);
                    }
                }
            }
        }
    }
    Ok(matrix)
}

/// Clamp a block index so its 5x5 neighbourhood stays inside the grid
fn cap(value: usize, max: usize) -> usize {
    if value < 2 { 2 } else { value.min(max) }
}

/// Per-block black point estimate
///
/// Low-contrast blocks are assumed to be background: their estimate is
/// half their minimum, raised to the neighbours' average when that is
/// darker than the block's minimum (the block then sits inside a symbol).
fn block_black_points(source: &LuminanceSource, sub_width: usize, sub_height: usize) -> Vec<Vec<u32>> {
    let width = source.width();
    let height = source.height();
    let mut black_points = vec![vec![0u32; sub_width]; sub_height];

    for by in 0..sub_height {
        let y_offset = (by << BLOCK_SIZE_POWER).min(height - BLOCK_SIZE);
        for bx in 0..sub_width {
            let x_offset = (bx << BLOCK_SIZE_POWER).min(width - BLOCK_SIZE);

            let mut sum = 0u32;
            let mut min = 0xFFu32;
            let mut max = 0u32;
            for y in y_offset..y_offset + BLOCK_SIZE {
                for &pixel in &source.row(y)[x_offset..x_offset + BLOCK_SIZE] {
                    let pixel = pixel as u32;
                    sum += pixel;
                    min = min.min(pixel);
                    max = max.max(pixel);
                }
            }

            let mut average = sum >> (BLOCK_SIZE_POWER * 2);
            if max - min <= MIN_DYNAMIC_RANGE {
                average = min / 2;
                if by > 0 && bx > 0 {
                    let neighbours = (black_points[by - 1][bx]
                        + 2 * black_points[by][bx - 1]
                        + black_points[by - 1][bx - 1])
                        / 4;
                    if min < neighbours {
                        average = neighbours;
                    }
                }
            }
            black_points[by][bx] = average;
        }
    }
    black_points
}
