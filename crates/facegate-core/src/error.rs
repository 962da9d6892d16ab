use serde::Serialize;
use thiserror::Error;

use crate::types::Identity;

/// Failure from a Gallery or Audit Log backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("identity '{0}' is already enrolled")]
    Duplicate(Identity),
    #[error("encoding for '{identity}' was produced by encoder v{found}, expected v{expected}; re-enroll required")]
    VersionMismatch {
        identity: String,
        found: u32,
        expected: u32,
    },
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wrap an arbitrary backend error (SQL driver, filesystem, ...).
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

/// Typed kind of a [`VerifyError`], stable for presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyErrorKind {
    NoFaceDetected,
    AmbiguousFrame,
    LivenessCheckFailed,
    InvalidIdentity,
    DuplicateIdentity,
    NoEnrolledIdentities,
    NotRecognized,
    StorageFailure,
    Cancelled,
}

/// Outcome of a failed enrollment or authentication attempt.
///
/// None of these are fatal to the process. The `Display` text is the
/// human-readable reason shown to a user; [`VerifyError::kind`] is the typed
/// kind callers branch on.
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("no face detected; make sure your face is visible and well lit")]
    NoFaceDetected,
    #[error("{count} faces detected; only one person may be in frame")]
    AmbiguousFrame { count: usize },
    #[error("face validation failed; look directly at the camera")]
    LivenessCheckFailed,
    #[error("invalid identity: {reason}")]
    InvalidIdentity { reason: String },
    #[error("identity '{0}' already exists; delete it before enrolling again")]
    DuplicateIdentity(Identity),
    #[error("no identities enrolled yet")]
    NoEnrolledIdentities,
    #[error("face not recognized (confidence {confidence:.2})")]
    NotRecognized { confidence: f64 },
    #[error("storage failure: {0}")]
    StorageFailure(#[source] StoreError),
    #[error("operation cancelled before commit")]
    Cancelled,
}

impl VerifyError {
    pub fn kind(&self) -> VerifyErrorKind {
        match self {
            VerifyError::NoFaceDetected => VerifyErrorKind::NoFaceDetected,
            VerifyError::AmbiguousFrame { .. } => VerifyErrorKind::AmbiguousFrame,
            VerifyError::LivenessCheckFailed => VerifyErrorKind::LivenessCheckFailed,
            VerifyError::InvalidIdentity { .. } => VerifyErrorKind::InvalidIdentity,
            VerifyError::DuplicateIdentity(_) => VerifyErrorKind::DuplicateIdentity,
            VerifyError::NoEnrolledIdentities => VerifyErrorKind::NoEnrolledIdentities,
            VerifyError::NotRecognized { .. } => VerifyErrorKind::NotRecognized,
            VerifyError::StorageFailure(_) => VerifyErrorKind::StorageFailure,
            VerifyError::Cancelled => VerifyErrorKind::Cancelled,
        }
    }

    /// Whether a fresh capture may succeed where this attempt failed.
    pub fn is_recapturable(&self) -> bool {
        matches!(
            self,
            VerifyError::NoFaceDetected
                | VerifyError::AmbiguousFrame { .. }
                | VerifyError::LivenessCheckFailed
                | VerifyError::NotRecognized { .. }
        )
    }
}

impl From<StoreError> for VerifyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(identity) => VerifyError::DuplicateIdentity(identity),
            other => VerifyError::StorageFailure(other),
        }
    }
}
