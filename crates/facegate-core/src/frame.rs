//! Frame type and the grayscale primitives built on it: decoding, cropping,
//! resize, equalization and Otsu thresholding.

use std::path::Path;

use crate::types::FaceRegion;

/// A single-channel (intensity) frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame has zero width or height ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("invalid luma length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

impl Frame {
    /// Wrap a row-major 8-bit grayscale buffer of `width * height` bytes.
    pub fn from_luma(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Convert any decoded image to intensity.
    pub fn from_image(img: &image::DynamicImage) -> Result<Self, FrameError> {
        let luma = img.to_luma8();
        let (width, height) = luma.dimensions();
        Self::from_luma(width, height, luma.into_raw())
    }

    /// Decode an image file (any format supported by the `image` crate).
    pub fn open(path: &Path) -> Result<Self, FrameError> {
        let img = image::open(path)?;
        Self::from_image(&img)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Clamp a region to the frame bounds. Returns `None` if nothing remains.
    pub fn clamp_region(&self, region: &FaceRegion) -> Option<(usize, usize, usize, usize)> {
        let x0 = (region.x as usize).min(self.width as usize);
        let y0 = (region.y as usize).min(self.height as usize);
        let x1 = (region.x as usize + region.width as usize).min(self.width as usize);
        let y1 = (region.y as usize + region.height as usize).min(self.height as usize);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }

    /// Copy out the pixels of `region` (clamped to the frame).
    ///
    /// Returns `(pixels, width, height)`; empty when the region lies outside the frame.
    pub fn crop(&self, region: &FaceRegion) -> (Vec<u8>, usize, usize) {
        let Some((x0, y0, w, h)) = self.clamp_region(region) else {
            return (Vec::new(), 0, 0);
        };
        let stride = self.width as usize;
        let mut out = Vec::with_capacity(w * h);
        for y in y0..y0 + h {
            out.extend_from_slice(&self.data[y * stride + x0..y * stride + x0 + w]);
        }
        (out, w, h)
    }
}

/// Bilinear resize of a grayscale buffer (pixel-centre aligned).
pub fn resize_bilinear(src: &[u8], width: usize, height: usize, new_w: usize, new_h: usize) -> Vec<u8> {
    let mut resized = vec![0u8; new_w * new_h];
    if width == 0 || height == 0 || src.len() < width * height {
        return resized;
    }

    let scale_x = width as f32 / new_w as f32;
    let scale_y = height as f32 / new_h as f32;

    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = src[y0 * width + x0] as f32;
            let tr = src[y0 * width + x1] as f32;
            let bl = src[y1 * width + x0] as f32;
            let br = src[y1 * width + x1] as f32;

            let val = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            resized[y * new_w + x] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    resized
}

/// Global histogram equalization in-place.
///
/// The darkest occupied intensity maps to 0 and the CDF is stretched over
/// 0–255. A constant image is left unchanged.
pub fn equalize_histogram(gray: &mut [u8]) {
    if gray.is_empty() {
        return;
    }

    let mut hist = [0u32; 256];
    for &p in gray.iter() {
        hist[p as usize] += 1;
    }

    let total = gray.len() as u32;
    let Some(first) = hist.iter().position(|&c| c > 0) else {
        return;
    };
    if hist[first] == total {
        return;
    }

    let scale = 255.0f32 / (total - hist[first]) as f32;
    let mut lut = [0u8; 256];
    let mut cumulative = 0u32;
    for i in (first + 1)..256 {
        cumulative += hist[i];
        lut[i] = (cumulative as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }

    for p in gray.iter_mut() {
        *p = lut[*p as usize];
    }
}

/// Otsu's threshold: the intensity `t` maximising between-class variance when
/// splitting pixels into `<= t` and `> t`. `None` for empty or uniform input.
pub fn otsu_threshold(gray: &[u8]) -> Option<u8> {
    if gray.is_empty() {
        return None;
    }

    let mut hist = [0u64; 256];
    for &p in gray {
        hist[p as usize] += 1;
    }

    let total = gray.len() as f64;
    let sum_all: f64 = hist.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();

    let mut weight_bg = 0.0f64;
    let mut sum_bg = 0.0f64;
    let mut best_var = -1.0f64;
    let mut threshold = None;

    for (i, &count) in hist.iter().enumerate() {
        weight_bg += count as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }
        sum_bg += i as f64 * count as f64;

        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_all - sum_bg) / weight_fg;
        let between = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);
        if between > best_var {
            best_var = between;
            threshold = Some(i as u8);
        }
    }

    threshold
}
