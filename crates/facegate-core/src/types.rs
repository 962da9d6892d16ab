use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::VerifyError;
use crate::gallery::GalleryEntry;
use crate::similarity;

/// Axis-aligned face rectangle within a source frame, as produced by a detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Detector-specific score; higher = more face-like.
    pub confidence: f32,
}

impl FaceRegion {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Fixed-length face descriptor (352 values for encoder v1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    pub values: Vec<f64>,
    /// Encoder parameter set that produced these values.
    pub version: u32,
}

impl Encoding {
    /// Weighted multi-metric similarity in [0, 1]. Higher = more similar.
    ///
    /// # Panics
    ///
    /// Panics if the two encodings differ in length.
    pub fn similarity(&self, other: &Encoding) -> f64 {
        similarity::similarity(&self.values, &other.values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Enrolled identity handle: trimmed, non-empty, case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn parse(raw: &str) -> Result<Self, VerifyError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(VerifyError::InvalidIdentity {
                reason: "identity cannot be empty".to_string(),
            });
        }
        if trimmed.chars().any(char::is_control) {
            return Err(VerifyError::InvalidIdentity {
                reason: "identity cannot contain control characters".to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = VerifyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Identity::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

/// Optional descriptive metadata kept alongside an enrolled identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

/// Result of matching a probe encoding against a gallery.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Similarity of the best candidate in [0, 1]; 0 for an empty gallery.
    pub similarity: f64,
    /// Identity of the matched entry (only when `matched`).
    pub identity: Option<Identity>,
}

/// Strategy for comparing a probe encoding against a gallery of enrolled faces.
pub trait Matcher: Send {
    fn compare(&self, probe: &Encoding, gallery: &[GalleryEntry], threshold: f64) -> MatchResult;
}

/// Arg-max matcher over the weighted similarity score.
///
/// Visits every gallery entry. Equal scores resolve to the lexicographically
/// smallest identity so the outcome never depends on backend iteration order.
/// Accepts iff the best score is `>= threshold`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedMatcher;

impl Matcher for WeightedMatcher {
    fn compare(&self, probe: &Encoding, gallery: &[GalleryEntry], threshold: f64) -> MatchResult {
        let mut best_sim = f64::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, entry) in gallery.iter().enumerate() {
            let sim = probe.similarity(&entry.encoding);
            tracing::debug!(identity = %entry.identity, similarity = sim, "candidate scored");

            let better = match best_idx {
                None => true,
                Some(b) => sim > best_sim || (sim == best_sim && entry.identity < gallery[b].identity),
            };
            if better {
                best_sim = sim;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_sim >= threshold => MatchResult {
                matched: true,
                similarity: best_sim,
                identity: Some(gallery[idx].identity.clone()),
            },
            Some(_) => MatchResult {
                matched: false,
                similarity: best_sim,
                identity: None,
            },
            None => MatchResult {
                matched: false,
                similarity: 0.0,
                identity: None,
            },
        }
    }
}
