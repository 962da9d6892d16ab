//! Minimal liveness gate: eye-pair presence inside a detected face.
//!
//! A blank oval, a cropped forehead or a heavily blurred print usually lacks
//! two distinct dark blobs in the upper part of the face. This is a heuristic
//! and not an anti-spoofing system.
//!
//! # Threat Coverage
//!
//! - **Blocks:** featureless or badly framed captures.
//! - **Does not block:** a sharp printed photograph, screen replay, masks.
//!   Authentication does not run this gate at all.

use crate::blob;
use crate::frame::{otsu_threshold, Frame};
use crate::types::FaceRegion;

/// Eye-pair count required to pass.
pub const REQUIRED_EYES: usize = 2;
/// Eye blob extent relative to the face region, per dimension.
const MIN_EYE_FRACTION: f32 = 0.05;
const MAX_EYE_FRACTION: f32 = 0.40;
/// Eye centroids must lie in this upper fraction of the face.
const EYE_BAND: f32 = 0.60;

/// Result of an eye-pair inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct LivenessResult {
    /// Whether the region passed the check.
    pub is_live: bool,
    /// Number of eye-like sub-regions found.
    pub eyes_found: usize,
}

/// Secondary check run on a detected face before enrollment.
pub trait LivenessCheck: Send {
    fn has_liveness_signal(&self, frame: &Frame, region: &FaceRegion) -> bool;
}

/// Counts dark, enclosed, eye-sized blobs in the upper band of the face.
#[derive(Debug, Clone, Copy, Default)]
pub struct EyePairCheck;

impl EyePairCheck {
    pub fn inspect(&self, frame: &Frame, region: &FaceRegion) -> LivenessResult {
        let (pixels, w, h) = frame.crop(region);
        let Some(threshold) = otsu_threshold(&pixels) else {
            return LivenessResult {
                is_live: false,
                eyes_found: 0,
            };
        };

        let mask: Vec<bool> = pixels.iter().map(|&p| p <= threshold).collect();

        let min_w = w as f32 * MIN_EYE_FRACTION;
        let max_w = w as f32 * MAX_EYE_FRACTION;
        let min_h = h as f32 * MIN_EYE_FRACTION;
        let max_h = h as f32 * MAX_EYE_FRACTION;
        let band = h as f32 * EYE_BAND;

        let eyes_found = blob::label(&mask, w, h)
            .iter()
            .filter(|b| !b.touches_border(w, h))
            .filter(|b| {
                let bw = b.width as f32;
                let bh = b.height as f32;
                bw >= min_w && bw <= max_w && bh >= min_h && bh <= max_h
            })
            .filter(|b| b.centroid_y < band)
            .count();

        tracing::debug!(threshold, eyes_found, "liveness inspection");

        LivenessResult {
            is_live: eyes_found >= REQUIRED_EYES,
            eyes_found,
        }
    }
}

impl LivenessCheck for EyePairCheck {
    fn has_liveness_signal(&self, frame: &Frame, region: &FaceRegion) -> bool {
        self.inspect(frame, region).is_live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: usize = 320;
    const H: usize = 240;
    const FACE: FaceRegion = FaceRegion { x: 100, y: 40, width: 120, height: 150, confidence: 1.0 };

    fn paint(data: &mut [u8], x: usize, y: usize, w: usize, h: usize, v: u8) {
        for yy in y..y + h {
            for xx in x..x + w {
                data[yy * W + xx] = v;
            }
        }
    }

    fn face(features: &[(usize, usize, usize, usize, u8)]) -> Frame {
        let mut data = vec![20u8; W * H];
        paint(&mut data, 100, 40, 120, 150, 190);
        for &(x, y, w, h, v) in features {
            paint(&mut data, 100 + x, 40 + y, w, h, v);
        }
        Frame::from_luma(W as u32, H as u32, data).unwrap()
    }

    #[test]
    fn test_two_eyes_pass() {
        let frame = face(&[(25, 45, 20, 14, 40), (75, 45, 20, 14, 40)]);
        let result = EyePairCheck.inspect(&frame, &FACE);
        assert_eq!(result.eyes_found, 2);
        assert!(result.is_live);
    }

    #[test]
    fn test_mouth_is_not_counted_as_eye() {
        let frame = face(&[(25, 45, 20, 14, 40), (35, 110, 50, 10, 40)]);
        let result = EyePairCheck.inspect(&frame, &FACE);
        assert_eq!(result.eyes_found, 1);
        assert!(!result.is_live);
    }

    #[test]
    fn test_featureless_face_fails() {
        let frame = face(&[]);
        assert!(!EyePairCheck.has_liveness_signal(&frame, &FACE));
    }

    #[test]
    fn test_tiny_specks_are_ignored() {
        // 2x2 blobs are below 5% of the face size
        let frame = face(&[(25, 45, 2, 2, 40), (75, 45, 2, 2, 40)]);
        assert_eq!(EyePairCheck.inspect(&frame, &FACE).eyes_found, 0);
    }

    #[test]
    fn test_region_outside_frame_fails() {
        let frame = face(&[]);
        let outside = FaceRegion { x: 400, y: 400, width: 50, height: 50, confidence: 1.0 };
        assert!(!EyePairCheck.has_liveness_signal(&frame, &outside));
    }
}
