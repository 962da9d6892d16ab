//! 4-connected component labelling over a binary mask.

/// Bounding box and moments of one connected component.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Blob {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    /// Number of member pixels.
    pub area: usize,
    pub centroid_y: f32,
}

impl Blob {
    /// Fraction of the bounding box covered by member pixels.
    pub fn fill_ratio(&self) -> f32 {
        self.area as f32 / (self.width * self.height) as f32
    }

    pub fn touches_border(&self, width: usize, height: usize) -> bool {
        self.x == 0 || self.y == 0 || self.x + self.width == width || self.y + self.height == height
    }
}

/// Label the `true` pixels of a row-major `width × height` mask.
///
/// Components are returned in raster order of their first pixel, so output is
/// deterministic for a given mask.
pub(crate) fn label(mask: &[bool], width: usize, height: usize) -> Vec<Blob> {
    let mut seen = vec![false; mask.len()];
    let mut blobs = Vec::new();
    let mut stack = Vec::new();

    for start in 0..mask.len().min(width * height) {
        if !mask[start] || seen[start] {
            continue;
        }

        seen[start] = true;
        stack.push(start);

        let (mut min_x, mut min_y) = (usize::MAX, usize::MAX);
        let (mut max_x, mut max_y) = (0usize, 0usize);
        let mut area = 0usize;
        let mut sum_y = 0usize;

        while let Some(idx) = stack.pop() {
            let x = idx % width;
            let y = idx / width;
            area += 1;
            sum_y += y;
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);

            let mut visit = |n: usize| {
                if mask[n] && !seen[n] {
                    seen[n] = true;
                    stack.push(n);
                }
            };
            if x > 0 {
                visit(idx - 1);
            }
            if x + 1 < width {
                visit(idx + 1);
            }
            if y > 0 {
                visit(idx - width);
            }
            if y + 1 < height {
                visit(idx + width);
            }
        }

        blobs.push(Blob {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
            area,
            centroid_y: sum_y as f32 / area as f32,
        });
    }

    blobs
}
