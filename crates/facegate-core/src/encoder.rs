//! Hand-crafted face encoder.
//!
//! Maps a detected face region to a 352-value descriptor:
//!
//! 1. crop and convert to intensity
//! 2. bilinear resize to 100×100
//! 3. global histogram equalization
//! 4. concatenate
//!    - a 64-bin global intensity histogram (L2-normalized)
//!    - 4×4 grid of 16-bin cell histograms (each L2-normalized, raster order)
//!    - a 32-bin Sobel gradient-magnitude histogram (normalized by count)
//!
//! Every constant below is part of the encoding format. Changing any of them
//! must bump [`ENCODING_VERSION`], which invalidates stored encodings.

use crate::frame::{equalize_histogram, resize_bilinear, Frame};
use crate::types::{Encoding, FaceRegion};

// --- Named constants (format-defining) ---
pub const CANONICAL_SIZE: usize = 100;
const GLOBAL_BINS: usize = 64;
const GRID_CELLS: usize = 4;
const CELL_BINS: usize = 16;
const GRADIENT_BINS: usize = 32;
const GRADIENT_RANGE: f64 = 255.0;
const GRADIENT_EPSILON: f64 = 1e-6;

/// Number of values in every encoding.
pub const ENCODING_LEN: usize = GLOBAL_BINS + GRID_CELLS * GRID_CELLS * CELL_BINS + GRADIENT_BINS;
/// Version tag persisted with every encoding.
pub const ENCODING_VERSION: u32 = 1;

/// Deterministic region → [`Encoding`] mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEncoder;

impl FeatureEncoder {
    /// Encode the face inside `region`.
    ///
    /// Never fails: a region clamped to nothing encodes a blank canonical image.
    pub fn encode(&self, frame: &Frame, region: &FaceRegion) -> Encoding {
        let canonical = Self::preprocess(frame, region);

        let mut values = Vec::with_capacity(ENCODING_LEN);
        values.extend(global_histogram(&canonical));
        values.extend(grid_histograms(&canonical));
        values.extend(gradient_histogram(&canonical));
        debug_assert_eq!(values.len(), ENCODING_LEN);

        Encoding {
            values,
            version: ENCODING_VERSION,
        }
    }

    /// Crop, resize to the canonical square and equalize.
    fn preprocess(frame: &Frame, region: &FaceRegion) -> Vec<u8> {
        let (pixels, w, h) = frame.crop(region);
        let mut canonical = resize_bilinear(&pixels, w, h, CANONICAL_SIZE, CANONICAL_SIZE);
        equalize_histogram(&mut canonical);
        canonical
    }
}

fn histogram(pixels: impl Iterator<Item = u8>, bins: usize) -> Vec<f64> {
    let shift = 256 / bins;
    let mut hist = vec![0.0f64; bins];
    for p in pixels {
        hist[p as usize / shift] += 1.0;
    }
    hist
}

fn l2_normalize(mut v: Vec<f64>) -> Vec<f64> {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

fn global_histogram(img: &[u8]) -> Vec<f64> {
    l2_normalize(histogram(img.iter().copied(), GLOBAL_BINS))
}

fn grid_histograms(img: &[u8]) -> Vec<f64> {
    let cell = CANONICAL_SIZE / GRID_CELLS;
    let mut out = Vec::with_capacity(GRID_CELLS * GRID_CELLS * CELL_BINS);

    for row in 0..GRID_CELLS {
        for col in 0..GRID_CELLS {
            let pixels = (row * cell..(row + 1) * cell).flat_map(|y| {
                img[y * CANONICAL_SIZE + col * cell..y * CANONICAL_SIZE + (col + 1) * cell]
                    .iter()
                    .copied()
            });
            out.extend(l2_normalize(histogram(pixels, CELL_BINS)));
        }
    }

    out
}

/// Reflect-101 border index (`-1 → 1`, `n → n-2`).
fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    let r = if i < 0 {
        -i
    } else if i >= n {
        2 * n - 2 - i
    } else {
        i
    };
    r.clamp(0, n - 1) as usize
}

fn gradient_histogram(img: &[u8]) -> Vec<f64> {
    let size = CANONICAL_SIZE;
    let px = |x: isize, y: isize| img[reflect(y, size) * size + reflect(x, size)] as f64;

    let mut hist = vec![0.0f64; GRADIENT_BINS];
    for y in 0..size as isize {
        for x in 0..size as isize {
            let dx = (px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x - 1, y) + px(x - 1, y + 1));
            let dy = (px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x, y - 1) + px(x + 1, y - 1));
            let magnitude = (dx * dx + dy * dy).sqrt();

            // Magnitudes above the range are not counted.
            if magnitude <= GRADIENT_RANGE {
                let bin = ((magnitude * GRADIENT_BINS as f64 / GRADIENT_RANGE) as usize)
                    .min(GRADIENT_BINS - 1);
                hist[bin] += 1.0;
            }
        }
    }

    let total = hist.iter().sum::<f64>() + GRADIENT_EPSILON;
    hist.iter().map(|c| c / total).collect()
}
