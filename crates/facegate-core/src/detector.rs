//! Face detection.
//!
//! [`FaceDetector`] is the pluggable seam. [`CascadeDetector`] is the
//! production backend: the SeetaFace funnel-structured cascade (via
//! `rustface`) swept over an image pyramid, with overlapping windows merged
//! inside the cascade. [`BlobDetector`] needs no model file; it segments
//! staged captures where the subject is lit against a darker backdrop, and
//! drives the synthetic frames in tests.

use std::io::Cursor;
use std::path::Path;

use thiserror::Error;

use crate::blob;
use crate::frame::{otsu_threshold, Frame};
use crate::types::FaceRegion;

// --- Cascade parameters (fixed, not tunable per call) ---
/// Smallest face side the cascade searches for, in pixels.
pub const MIN_FACE_SIZE: u32 = 80;
/// Downscale step between pyramid levels.
const PYRAMID_SCALE_FACTOR: f32 = 0.8;
/// Minimum cascade score for a merged window to count as a face.
const SCORE_THRESHOLD: f64 = 2.0;
const SLIDE_STEP: u32 = 4;

// --- Blob segmentation parameters ---
const BLOB_MIN_SIZE: usize = 100;
const MIN_ASPECT: f32 = 0.6;
const MAX_ASPECT: f32 = 2.0;
const MIN_FILL_RATIO: f32 = 0.5;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; place seeta_fd_frontal_v1.0.bin in the model directory")]
    ModelNotFound(String),
    #[error("invalid detector model {path}: {source}")]
    InvalidModel {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Locates candidate face regions in a frame.
///
/// Returning zero or several regions is not an error; the caller decides what
/// that means for the attempt.
pub trait FaceDetector: Send {
    fn detect(&self, frame: &Frame) -> Vec<FaceRegion>;
}

/// SeetaFace cascade detector.
///
/// Holds the serialized model; `rustface` detectors are not `Send`, so one is
/// rebuilt from memory for each call.
pub struct CascadeDetector {
    model: Vec<u8>,
}

impl CascadeDetector {
    /// Load the cascade model from `model_path`.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        let path = model_path.display().to_string();
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(path));
        }

        let detector = std::fs::read(model_path).and_then(Self::from_bytes).map_err(|source| {
            DetectorError::InvalidModel {
                path: path.clone(),
                source,
            }
        })?;
        tracing::info!(path = %path, min_face = MIN_FACE_SIZE, "cascade detector loaded");
        Ok(detector)
    }

    /// Validate and keep an in-memory model.
    pub fn from_bytes(model: Vec<u8>) -> Result<Self, std::io::Error> {
        rustface::read_model(Cursor::new(&model))?;
        Ok(Self { model })
    }

    fn build(&self) -> Result<Box<dyn rustface::Detector>, std::io::Error> {
        let model = rustface::read_model(Cursor::new(&self.model))?;
        let mut detector = rustface::create_detector_with_model(model);
        detector.set_min_face_size(MIN_FACE_SIZE);
        detector.set_pyramid_scale_factor(PYRAMID_SCALE_FACTOR);
        detector.set_score_thresh(SCORE_THRESHOLD);
        detector.set_slide_window_step(SLIDE_STEP, SLIDE_STEP);
        Ok(detector)
    }
}

impl FaceDetector for CascadeDetector {
    /// Detect faces, returning regions sorted by cascade score.
    fn detect(&self, frame: &Frame) -> Vec<FaceRegion> {
        // The pyramid cannot hold a single window below this size.
        if frame.width().min(frame.height()) < MIN_FACE_SIZE {
            return Vec::new();
        }

        let mut detector = match self.build() {
            Ok(detector) => detector,
            Err(e) => {
                tracing::warn!(error = %e, "cascade model failed to load");
                return Vec::new();
            }
        };

        let mut image = rustface::ImageData::new(frame.data(), frame.width(), frame.height());
        let mut faces: Vec<FaceRegion> = detector
            .detect(&mut image)
            .iter()
            .filter_map(|face| {
                let bbox = face.bbox();
                clip_to_frame(frame, bbox.x(), bbox.y(), bbox.width(), bbox.height(), face.score() as f32)
            })
            .collect();
        sort_by_confidence(&mut faces);

        tracing::debug!(faces = faces.len(), "cascade detection complete");
        faces
    }
}

/// Intersect a detector box (which may overhang the frame) with the frame.
fn clip_to_frame(frame: &Frame, x: i32, y: i32, width: u32, height: u32, confidence: f32) -> Option<FaceRegion> {
    let x0 = i64::from(x).clamp(0, i64::from(frame.width()));
    let y0 = i64::from(y).clamp(0, i64::from(frame.height()));
    let x1 = (i64::from(x) + i64::from(width)).clamp(0, i64::from(frame.width()));
    let y1 = (i64::from(y) + i64::from(height)).clamp(0, i64::from(frame.height()));

    (x1 > x0 && y1 > y0).then(|| FaceRegion {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0) as u32,
        height: (y1 - y0) as u32,
        confidence,
    })
}

/// Highest confidence first; position breaks ties so output is stable.
fn sort_by_confidence(faces: &mut [FaceRegion]) {
    faces.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then((a.y, a.x).cmp(&(b.y, b.x)))
    });
}

/// Threshold-and-label detector for high-contrast staged captures.
///
/// Keeps bright, compact, roughly face-proportioned components. A component
/// touching the frame border is backdrop, not a face, so a subject darker
/// than its surroundings yields no detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlobDetector;

impl FaceDetector for BlobDetector {
    /// Detect faces, returning regions sorted by confidence (fill ratio).
    fn detect(&self, frame: &Frame) -> Vec<FaceRegion> {
        let Some(threshold) = otsu_threshold(frame.data()) else {
            tracing::debug!("uniform frame, nothing to detect");
            return Vec::new();
        };

        let width = frame.width() as usize;
        let height = frame.height() as usize;
        let mask: Vec<bool> = frame.data().iter().map(|&p| p > threshold).collect();

        let mut result: Vec<FaceRegion> = blob::label(&mask, width, height)
            .into_iter()
            .filter(|b| !b.touches_border(width, height))
            .filter(|b| b.width >= BLOB_MIN_SIZE && b.height >= BLOB_MIN_SIZE)
            .filter(|b| {
                let aspect = b.height as f32 / b.width as f32;
                (MIN_ASPECT..=MAX_ASPECT).contains(&aspect)
            })
            .filter(|b| b.fill_ratio() >= MIN_FILL_RATIO)
            .map(|b| FaceRegion {
                x: b.x as u32,
                y: b.y as u32,
                width: b.width as u32,
                height: b.height as u32,
                confidence: b.fill_ratio(),
            })
            .collect();
        sort_by_confidence(&mut result);

        tracing::debug!(threshold, faces = result.len(), "blob detection complete");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_rects(rects: &[(usize, usize, usize, usize, u8)]) -> Frame {
        let (w, h) = (320usize, 240usize);
        let mut data = vec![20u8; w * h];
        for &(x, y, rw, rh, v) in rects {
            for yy in y..y + rh {
                for xx in x..x + rw {
                    data[yy * w + xx] = v;
                }
            }
        }
        Frame::from_luma(w as u32, h as u32, data).unwrap()
    }

    #[test]
    fn test_detects_single_face() {
        let frame = frame_with_rects(&[(100, 40, 120, 150, 190)]);
        let faces = BlobDetector.detect(&frame);
        assert_eq!(faces.len(), 1);
        assert_eq!((faces[0].x, faces[0].y, faces[0].width, faces[0].height), (100, 40, 120, 150));
    }

    #[test]
    fn test_face_with_dark_features_keeps_full_box() {
        let frame = frame_with_rects(&[
            (100, 40, 120, 150, 190),
            (125, 85, 20, 14, 40),
            (175, 85, 20, 14, 40),
        ]);
        let faces = BlobDetector.detect(&frame);
        assert_eq!(faces.len(), 1);
        assert_eq!((faces[0].width, faces[0].height), (120, 150));
        assert!(faces[0].confidence < 1.0);
    }

    #[test]
    fn test_two_faces_are_both_reported() {
        let frame = frame_with_rects(&[(10, 40, 120, 150, 190), (180, 40, 120, 150, 190)]);
        assert_eq!(BlobDetector.detect(&frame).len(), 2);
    }

    #[test]
    fn test_blank_frame_has_no_face() {
        let frame = frame_with_rects(&[]);
        assert!(BlobDetector.detect(&frame).is_empty());
    }

    #[test]
    fn test_small_blob_is_ignored() {
        let frame = frame_with_rects(&[(10, 40, 60, 60, 190)]);
        assert!(BlobDetector.detect(&frame).is_empty());
    }

    #[test]
    fn test_elongated_blob_is_ignored() {
        // 300 wide, 110 tall → aspect 0.37
        let frame = frame_with_rects(&[(10, 60, 300, 110, 190)]);
        assert!(BlobDetector.detect(&frame).is_empty());
    }

    #[test]
    fn test_face_darker_than_backdrop_is_not_reported_as_whole_frame() {
        let (w, h) = (320usize, 240usize);
        let mut data = vec![230u8; w * h];
        for (x0, y0, rw, rh, v) in [(100, 40, 120, 150, 150), (125, 85, 20, 14, 40), (175, 85, 20, 14, 40), (135, 150, 50, 10, 60)] {
            for y in y0..y0 + rh {
                for x in x0..x0 + rw {
                    data[y * w + x] = v;
                }
            }
        }
        let frame = Frame::from_luma(w as u32, h as u32, data).unwrap();
        assert!(BlobDetector.detect(&frame).is_empty());
    }

    #[test]
    fn test_blob_touching_border_is_ignored() {
        let frame = frame_with_rects(&[(0, 40, 120, 150, 190)]);
        assert!(BlobDetector.detect(&frame).is_empty());
    }

    #[test]
    fn test_clip_to_frame() {
        let frame = frame_with_rects(&[]);
        let r = clip_to_frame(&frame, -20, 200, 100, 100, 3.5).unwrap();
        assert_eq!((r.x, r.y, r.width, r.height), (0, 200, 80, 40));
        assert!(clip_to_frame(&frame, 330, 10, 50, 50, 1.0).is_none());
        assert!(clip_to_frame(&frame, -100, -100, 50, 50, 1.0).is_none());
    }

    #[test]
    fn test_sort_by_confidence_is_stable_on_ties() {
        let region = |x, confidence| FaceRegion { x, y: 0, width: 10, height: 10, confidence };
        let mut faces = vec![region(50, 1.0), region(10, 1.0), region(30, 4.0)];
        sort_by_confidence(&mut faces);
        assert_eq!(faces.iter().map(|f| f.x).collect::<Vec<_>>(), vec![30, 10, 50]);
    }

    #[test]
    fn test_missing_cascade_model() {
        let err = CascadeDetector::load(Path::new("/nonexistent/seeta_fd_frontal_v1.0.bin")).err();
        assert!(matches!(err, Some(DetectorError::ModelNotFound(_))));
    }

    #[test]
    fn test_truncated_cascade_model_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seeta_fd_frontal_v1.0.bin");
        std::fs::write(&path, [1u8, 0, 0]).unwrap();
        let err = CascadeDetector::load(&path).err();
        assert!(matches!(err, Some(DetectorError::InvalidModel { .. })));
        assert!(CascadeDetector::from_bytes(Vec::new()).is_err());
    }

    #[test]
    fn test_detection_is_deterministic() {
        let frame = frame_with_rects(&[(100, 40, 120, 150, 190), (125, 85, 20, 14, 40)]);
        assert_eq!(BlobDetector.detect(&frame), BlobDetector.detect(&frame));
    }
}
