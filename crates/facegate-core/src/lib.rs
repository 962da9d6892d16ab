//! facegate-core: face enrollment and verification engine.
//!
//! Classical pipeline: cascade face detection, an eye-pair liveness gate, a
//! histogram/gradient feature encoder and a weighted multi-metric similarity
//! scorer. Storage is reached through the [`Gallery`]
//! and [`AuditLog`] traits.

mod blob;
pub mod audit;
pub mod detector;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod gallery;
pub mod liveness;
pub mod similarity;
pub mod types;
pub mod verifier;

pub use audit::{AuditCounts, AuditLog, AuditRecord, MemoryAuditLog, Stats, UNKNOWN_IDENTITY};
pub use detector::{BlobDetector, CascadeDetector, DetectorError, FaceDetector};
pub use encoder::{FeatureEncoder, ENCODING_LEN, ENCODING_VERSION};
pub use error::{StoreError, VerifyError, VerifyErrorKind};
pub use frame::{Frame, FrameError};
pub use gallery::{Gallery, GalleryEntry, MemoryGallery};
pub use liveness::{EyePairCheck, LivenessCheck};
pub use types::{Encoding, FaceRegion, Identity, MatchResult, Matcher, Profile, WeightedMatcher};
pub use verifier::{
    CancelToken, Decision, EngineState, Enrollment, IdentitySummary, NeverCancel, Verifier, VerifierConfig,
    MATCH_THRESHOLD,
};
