//! Multi-metric similarity scoring between two encodings.
//!
//! The score blends three independent signals with fixed weights and is
//! clamped to [0, 1]:
//!
//! | signal                                   | weight |
//! |------------------------------------------|--------|
//! | cosine similarity                        | 0.4    |
//! | Pearson correlation                      | 0.3    |
//! | `1 - ‖a − b‖ / √len` (inverted distance) | 0.3    |
//!
//! Every term is computed so that swapping the arguments performs the same
//! floating-point operations, which makes the score exactly symmetric.

pub const COSINE_WEIGHT: f64 = 0.4;
pub const CORRELATION_WEIGHT: f64 = 0.3;
pub const DISTANCE_WEIGHT: f64 = 0.3;

/// Largest absolute component; 0 for an all-zero vector.
fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |m: f64, x| m.max(x.abs()))
}

/// Cosine and correlation are scale-invariant; dividing by the largest
/// component first keeps their sums of squares out of overflow and underflow.
fn scale_of(v: &[f64]) -> Option<f64> {
    let m = max_abs(v);
    (m > 0.0 && m.is_finite()).then_some(m)
}

/// Cosine similarity of the L2-normalized vectors, in [-1, 1].
///
/// A zero-norm input contributes 0.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let (Some(sa), Some(sb)) = (scale_of(a), scale_of(b)) else {
        return 0.0;
    };

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (x / sa, y / sb);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 {
        (dot / denom).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Pearson correlation coefficient, in [-1, 1].
///
/// Zero-variance input has no defined correlation and contributes 0 instead of NaN.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    let (Some(sa), Some(sb)) = (scale_of(a), scale_of(b)) else {
        return 0.0;
    };
    if n == 0 {
        return 0.0;
    }

    let mean_a = a.iter().map(|x| x / sa).sum::<f64>() / n as f64;
    let mean_b = b.iter().map(|y| y / sb).sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let da = x / sa - mean_a;
        let db = y / sb - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom > 0.0 && denom.is_finite() {
        (cov / denom).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// `1 - ‖a − b‖ / √len`. Equals 1 for identical vectors; may go negative for
/// vectors far outside the unit range (the final score is clamped).
pub fn inverted_euclidean(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let dist = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt();
    1.0 - dist / (a.len() as f64).sqrt()
}

/// Weighted similarity in [0, 1].
///
/// # Panics
///
/// Panics if `a` and `b` differ in length: comparing encodings from
/// different encoder layouts is a programming error.
pub fn similarity(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(
        a.len(),
        b.len(),
        "encoding length mismatch: {} vs {}",
        a.len(),
        b.len()
    );

    let score = COSINE_WEIGHT * cosine(a, b)
        + CORRELATION_WEIGHT * pearson(a, b)
        + DISTANCE_WEIGHT * inverted_euclidean(a, b);

    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}
