//! Verification engine: orchestrates detection, liveness, encoding and
//! matching against the gallery, and owns the audit trail.
//!
//! A [`Verifier`] is single-operation-at-a-time: every operation takes
//! `&mut self`, so callers that share one across threads must serialize access
//! (the CLI does this by owning it on a dedicated engine thread).
//!
//! # Commit points
//!
//! Enrollment commits exactly once (gallery insert). Authentication commits
//! exactly once (audit append), plus a best-effort last-login stamp after an
//! accepted decision. The [`CancelToken`] is polled between steps and right
//! before each commit, so a cancelled call leaves gallery and audit log
//! untouched.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::audit::{AuditLog, AuditRecord, Stats};
use crate::detector::FaceDetector;
use crate::encoder::FeatureEncoder;
use crate::error::{StoreError, VerifyError};
use crate::frame::Frame;
use crate::gallery::{Gallery, GalleryEntry};
use crate::liveness::{EyePairCheck, LivenessCheck};
use crate::types::{Encoding, FaceRegion, Identity, Matcher, Profile, WeightedMatcher};

/// Minimum similarity accepted as a match.
pub const MATCH_THRESHOLD: f64 = 0.6;

/// Deployment-wide calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerifierConfig {
    /// Accept iff best similarity `>=` this value. Must lie in [0, 1].
    pub match_threshold: f64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            match_threshold: MATCH_THRESHOLD,
        }
    }
}

/// Polled by long-running operations; `true` aborts before the next commit.
pub trait CancelToken {
    fn is_cancelled(&self) -> bool;
}

impl CancelToken for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

/// Token that never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl CancelToken for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Engine lifecycle: `Idle → Capturing → {Enrolling | Authenticating} → Decided → Idle`.
///
/// Any in-flight state may also fall back to `Idle` when an attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Capturing,
    Enrolling,
    Authenticating,
    Decided,
}

impl EngineState {
    pub fn can_transition_to(self, next: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self, next),
            (Idle, Capturing)
                | (Capturing, Enrolling)
                | (Capturing, Authenticating)
                | (Enrolling, Decided)
                | (Authenticating, Decided)
                | (Capturing | Enrolling | Authenticating | Decided, Idle)
        )
    }
}

/// Outcome of a completed authentication.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub accepted: bool,
    /// Matched identity; only set when `accepted`.
    pub identity: Option<Identity>,
    /// Best similarity × 100, reported on reject too.
    pub confidence: f64,
}

impl Decision {
    /// Turn a reject into [`VerifyError::NotRecognized`].
    pub fn ensure_accepted(self) -> Result<Self, VerifyError> {
        if self.accepted {
            Ok(self)
        } else {
            Err(VerifyError::NotRecognized {
                confidence: self.confidence,
            })
        }
    }
}

/// Outcome of a successful enrollment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enrollment {
    pub identity: Identity,
    pub region: FaceRegion,
    pub enrolled_at: DateTime<Utc>,
}

/// Enrolled identity metadata, without the encoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentitySummary {
    pub identity: Identity,
    pub profile: Profile,
    pub enrolled_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<GalleryEntry> for IdentitySummary {
    fn from(entry: GalleryEntry) -> Self {
        Self {
            identity: entry.identity,
            profile: entry.profile,
            enrolled_at: entry.enrolled_at,
            last_login: entry.last_login,
        }
    }
}

/// The enrollment / authentication engine.
pub struct Verifier<G: Gallery, A: AuditLog> {
    gallery: G,
    audit: A,
    detector: Box<dyn FaceDetector>,
    liveness: Box<dyn LivenessCheck>,
    encoder: FeatureEncoder,
    matcher: Box<dyn Matcher>,
    config: VerifierConfig,
    state: EngineState,
}

impl<G: Gallery, A: AuditLog> Verifier<G, A> {
    /// Build a verifier around `detector` with the built-in liveness check and matcher.
    pub fn new(gallery: G, audit: A, detector: impl FaceDetector + 'static) -> Self {
        Self {
            gallery,
            audit,
            detector: Box::new(detector),
            liveness: Box::new(EyePairCheck),
            encoder: FeatureEncoder,
            matcher: Box::new(WeightedMatcher),
            config: VerifierConfig::default(),
            state: EngineState::Idle,
        }
    }

    pub fn with_detector(mut self, detector: impl FaceDetector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    pub fn with_liveness(mut self, liveness: impl LivenessCheck + 'static) -> Self {
        self.liveness = Box::new(liveness);
        self
    }

    pub fn with_matcher(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    pub fn with_config(mut self, config: VerifierConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn gallery(&self) -> &G {
        &self.gallery
    }

    pub fn audit_log(&self) -> &A {
        &self.audit
    }

    // --- Enrollment ---

    pub fn enroll(&mut self, identity: &str, profile: Profile, frame: &Frame) -> Result<Enrollment, VerifyError> {
        self.enroll_with(identity, profile, frame, &NeverCancel)
    }

    /// Enroll `identity` from a single-face frame that passes the liveness check.
    pub fn enroll_with<C: CancelToken + ?Sized>(
        &mut self,
        identity: &str,
        profile: Profile,
        frame: &Frame,
        cancel: &C,
    ) -> Result<Enrollment, VerifyError> {
        let result = self.run_enroll(identity, profile, frame, cancel);
        self.transition(EngineState::Idle);
        if let Err(e) = &result {
            tracing::info!(identity, reason = %e, "enrollment rejected");
        }
        result
    }

    fn run_enroll<C: CancelToken + ?Sized>(
        &mut self,
        identity: &str,
        profile: Profile,
        frame: &Frame,
        cancel: &C,
    ) -> Result<Enrollment, VerifyError> {
        let identity = Identity::parse(identity)?;
        if self.gallery.contains(&identity)? {
            return Err(VerifyError::DuplicateIdentity(identity));
        }

        check(cancel)?;
        self.transition(EngineState::Capturing);
        let region = self.detect_one(frame)?;

        self.transition(EngineState::Enrolling);
        if !self.liveness.has_liveness_signal(frame, &region) {
            return Err(VerifyError::LivenessCheckFailed);
        }
        let encoding = self.encoder.encode(frame, &region);

        check(cancel)?;
        let enrolled_at = Utc::now();
        self.gallery.insert(GalleryEntry {
            identity: identity.clone(),
            encoding,
            profile,
            enrolled_at,
            last_login: None,
        })?;

        self.transition(EngineState::Decided);
        tracing::info!(identity = %identity, x = region.x, y = region.y, width = region.width, height = region.height, "identity enrolled");

        Ok(Enrollment {
            identity,
            region,
            enrolled_at,
        })
    }

    // --- Authentication ---

    pub fn authenticate(&mut self, frame: &Frame) -> Result<Decision, VerifyError> {
        self.authenticate_with(frame, &NeverCancel)
    }

    /// Match the single face in `frame` against every enrolled identity.
    ///
    /// A reject is a successful call returning `accepted: false`; use
    /// [`Decision::ensure_accepted`] to treat it as an error. Every call that
    /// reaches the gallery comparison appends exactly one audit record.
    pub fn authenticate_with<C: CancelToken + ?Sized>(
        &mut self,
        frame: &Frame,
        cancel: &C,
    ) -> Result<Decision, VerifyError> {
        let result = self.run_authenticate(frame, cancel);
        self.transition(EngineState::Idle);
        if let Err(e) = &result {
            tracing::info!(reason = %e, "authentication aborted");
        }
        result
    }

    fn run_authenticate<C: CancelToken + ?Sized>(&mut self, frame: &Frame, cancel: &C) -> Result<Decision, VerifyError> {
        check(cancel)?;
        self.transition(EngineState::Capturing);
        let region = self.detect_one(frame)?;

        self.transition(EngineState::Authenticating);
        let probe = self.encoder.encode(frame, &region);

        let entries = self.gallery.get_all()?;
        if entries.is_empty() {
            return Err(VerifyError::NoEnrolledIdentities);
        }
        ensure_comparable(&probe, &entries)?;

        let result = self
            .matcher
            .compare(&probe, &entries, self.config.match_threshold);
        let decision = Decision {
            accepted: result.matched,
            identity: result.identity,
            confidence: result.similarity * 100.0,
        };

        check(cancel)?;
        let timestamp = Utc::now();
        self.audit.append(AuditRecord {
            identity: decision.identity.clone(),
            success: decision.accepted,
            confidence: decision.confidence,
            timestamp,
        })?;

        if let Some(identity) = &decision.identity {
            if let Err(e) = self.gallery.record_login(identity, timestamp) {
                tracing::warn!(identity = %identity, error = %e, "failed to record last login");
            }
        }

        self.transition(EngineState::Decided);
        tracing::info!(
            accepted = decision.accepted,
            identity = decision.identity.as_ref().map_or(crate::audit::UNKNOWN_IDENTITY, Identity::as_str),
            confidence = decision.confidence,
            candidates = entries.len(),
            "authentication decided"
        );

        Ok(decision)
    }

    // --- Management ---

    /// Remove an enrolled identity. `Ok(false)` if it was not enrolled.
    pub fn remove(&mut self, identity: &str) -> Result<bool, VerifyError> {
        let identity = Identity::parse(identity)?;
        let removed = self.gallery.remove(&identity)?;
        tracing::info!(identity = %identity, removed, "identity removed");
        Ok(removed)
    }

    pub fn identities(&self) -> Result<Vec<IdentitySummary>, VerifyError> {
        Ok(self
            .gallery
            .get_all()?
            .into_iter()
            .map(IdentitySummary::from)
            .collect())
    }

    /// Most recent audit records, newest first.
    pub fn history(&self, limit: usize) -> Result<Vec<AuditRecord>, VerifyError> {
        Ok(self.audit.list(limit)?)
    }

    /// Counted fresh on every call.
    pub fn stats(&self) -> Result<Stats, VerifyError> {
        let counts = self.audit.counts()?;
        Ok(Stats {
            total_identities: self.gallery.count()?,
            total_attempts: counts.total,
            successful_attempts: counts.successful,
            failed_attempts: counts.failed,
        })
    }

    fn detect_one(&self, frame: &Frame) -> Result<FaceRegion, VerifyError> {
        let faces = self.detector.detect(frame);
        match faces.as_slice() {
            [] => Err(VerifyError::NoFaceDetected),
            [region] => Ok(*region),
            _ => Err(VerifyError::AmbiguousFrame { count: faces.len() }),
        }
    }

    fn transition(&mut self, next: EngineState) {
        if self.state == next {
            return;
        }
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid engine transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(from = ?self.state, to = ?next, "engine state");
        self.state = next;
    }
}

/// Stored encodings must come from the running encoder layout; anything else
/// needs a re-enroll, never a score.
fn ensure_comparable(probe: &Encoding, entries: &[GalleryEntry]) -> Result<(), StoreError> {
    for entry in entries {
        if entry.encoding.version != probe.version {
            return Err(StoreError::VersionMismatch {
                identity: entry.identity.to_string(),
                found: entry.encoding.version,
                expected: probe.version,
            });
        }
        if entry.encoding.len() != probe.len() {
            return Err(StoreError::Corrupt(format!(
                "encoding for '{}' has {} values, expected {}",
                entry.identity,
                entry.encoding.len(),
                probe.len()
            )));
        }
    }
    Ok(())
}

fn check<C: CancelToken + ?Sized>(cancel: &C) -> Result<(), VerifyError> {
    if cancel.is_cancelled() {
        Err(VerifyError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditCounts, MemoryAuditLog};
    use crate::error::VerifyErrorKind;
    use crate::gallery::MemoryGallery;

    const W: usize = 320;
    const H: usize = 240;
    const FACE: FaceRegion = FaceRegion { x: 100, y: 40, width: 120, height: 150, confidence: 1.0 };

    /// Detector stub returning fixed regions.
    struct Fixed(Vec<FaceRegion>);

    impl FaceDetector for Fixed {
        fn detect(&self, _frame: &Frame) -> Vec<FaceRegion> {
            self.0.clone()
        }
    }

    struct Live(bool);

    impl LivenessCheck for Live {
        fn has_liveness_signal(&self, _frame: &Frame, _region: &FaceRegion) -> bool {
            self.0
        }
    }

    /// Audit log whose appends always fail.
    struct BrokenAudit;

    impl AuditLog for BrokenAudit {
        fn append(&mut self, _record: AuditRecord) -> Result<(), StoreError> {
            Err(StoreError::backend(std::io::Error::other("disk full")))
        }

        fn list(&self, _limit: usize) -> Result<Vec<AuditRecord>, StoreError> {
            Ok(Vec::new())
        }

        fn counts(&self) -> Result<AuditCounts, StoreError> {
            Ok(AuditCounts::default())
        }
    }

    fn face_frame() -> Frame {
        let mut data = vec![20u8; W * H];
        for y in 40..190 {
            for x in 100..220 {
                data[y * W + x] = 190;
            }
        }
        for &(ex, ey) in &[(125usize, 85usize), (175, 85)] {
            for y in ey..ey + 14 {
                for x in ex..ex + 20 {
                    data[y * W + x] = 40;
                }
            }
        }
        Frame::from_luma(W as u32, H as u32, data).unwrap()
    }

    fn ramp_frame() -> Frame {
        let mut data = vec![20u8; W * H];
        for y in 40..190 {
            for (i, x) in (100..220).enumerate() {
                data[y * W + x] = 100 + (i % 150) as u8;
            }
        }
        Frame::from_luma(W as u32, H as u32, data).unwrap()
    }

    fn verifier() -> Verifier<MemoryGallery, MemoryAuditLog> {
        Verifier::new(MemoryGallery::new(), MemoryAuditLog::new(), Fixed(vec![FACE])).with_liveness(Live(true))
    }

    #[test]
    fn test_state_transitions() {
        use EngineState::*;
        assert!(Idle.can_transition_to(Capturing));
        assert!(Capturing.can_transition_to(Enrolling));
        assert!(Authenticating.can_transition_to(Decided));
        assert!(Decided.can_transition_to(Idle));
        assert!(!Idle.can_transition_to(Decided));
        assert!(!Enrolling.can_transition_to(Authenticating));
        assert!(!Decided.can_transition_to(Capturing));
    }

    #[test]
    fn test_enroll_then_authenticate() {
        let mut v = verifier();
        let enrolled = v.enroll("alice", Profile::default(), &face_frame()).unwrap();
        assert_eq!(enrolled.identity.as_str(), "alice");
        assert_eq!(v.state(), EngineState::Idle);

        let decision = v.authenticate(&face_frame()).unwrap();
        assert!(decision.accepted);
        assert_eq!(decision.identity.unwrap().as_str(), "alice");
        assert!(decision.confidence >= 60.0);
        assert_eq!(v.state(), EngineState::Idle);
    }

    #[test]
    fn test_enroll_rejects_blank_identity() {
        let mut v = verifier();
        let err = v.enroll("   ", Profile::default(), &face_frame()).unwrap_err();
        assert_eq!(err.kind(), VerifyErrorKind::InvalidIdentity);
    }

    #[test]
    fn test_enroll_duplicate_checked_before_capture() {
        let mut v = verifier();
        v.enroll("alice", Profile::default(), &face_frame()).unwrap();
        let err = v.enroll(" alice", Profile::default(), &ramp_frame()).unwrap_err();
        assert_eq!(err.kind(), VerifyErrorKind::DuplicateIdentity);
        assert_eq!(v.gallery().count().unwrap(), 1);
    }

    #[test]
    fn test_detection_outcomes_are_classified() {
        let mut none = verifier().with_detector(Fixed(vec![]));
        assert_eq!(
            none.enroll("alice", Profile::default(), &face_frame()).unwrap_err().kind(),
            VerifyErrorKind::NoFaceDetected
        );

        let mut two = verifier().with_detector(Fixed(vec![FACE, FACE]));
        let err = two.authenticate(&face_frame()).unwrap_err();
        assert!(matches!(err, VerifyError::AmbiguousFrame { count: 2 }));
        assert_eq!(two.state(), EngineState::Idle);
    }

    #[test]
    fn test_liveness_gates_enrollment_only() {
        let mut v = verifier();
        v.enroll("alice", Profile::default(), &face_frame()).unwrap();

        let mut v = v.with_liveness(Live(false));
        let err = v.enroll("bob", Profile::default(), &face_frame()).unwrap_err();
        assert_eq!(err.kind(), VerifyErrorKind::LivenessCheckFailed);
        assert!(!v.gallery().contains(&Identity::parse("bob").unwrap()).unwrap());

        // Authentication does not consult the liveness check
        assert!(v.authenticate(&face_frame()).unwrap().accepted);
    }

    #[test]
    fn test_reject_is_audited_as_unknown() {
        let mut v = verifier();
        v.enroll("alice", Profile::default(), &face_frame()).unwrap();

        let decision = v.authenticate(&ramp_frame()).unwrap();
        assert!(!decision.accepted);
        assert!(decision.identity.is_none());
        assert!(decision.confidence < 60.0);

        let history = v.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].success);
        assert_eq!(history[0].identity_label(), "unknown");

        let err = decision.ensure_accepted().unwrap_err();
        assert_eq!(err.kind(), VerifyErrorKind::NotRecognized);
    }

    #[test]
    fn test_empty_gallery_is_not_audited() {
        let mut v = verifier();
        let err = v.authenticate(&face_frame()).unwrap_err();
        assert_eq!(err.kind(), VerifyErrorKind::NoEnrolledIdentities);
        assert!(v.audit_log().is_empty());
    }

    #[test]
    fn test_accepted_authentication_records_login() {
        let mut v = verifier();
        v.enroll("alice", Profile::default(), &face_frame()).unwrap();
        v.authenticate(&face_frame()).unwrap();
        let ids = v.identities().unwrap();
        assert!(ids[0].last_login.is_some());
    }

    #[test]
    fn test_cancelled_enroll_commits_nothing() {
        let mut v = verifier();
        let cancel = AtomicBool::new(true);
        let err = v
            .enroll_with("alice", Profile::default(), &face_frame(), &cancel)
            .unwrap_err();
        assert_eq!(err.kind(), VerifyErrorKind::Cancelled);
        assert_eq!(v.gallery().count().unwrap(), 0);
        assert_eq!(v.state(), EngineState::Idle);
    }

    #[test]
    fn test_cancelled_authenticate_is_not_audited() {
        let mut v = verifier();
        v.enroll("alice", Profile::default(), &face_frame()).unwrap();
        let cancel = AtomicBool::new(true);
        let err = v.authenticate_with(&face_frame(), &cancel).unwrap_err();
        assert_eq!(err.kind(), VerifyErrorKind::Cancelled);
        assert!(v.audit_log().is_empty());
    }

    #[test]
    fn test_audit_failure_surfaces_as_storage_failure() {
        let mut v = Verifier::new(MemoryGallery::new(), BrokenAudit, Fixed(vec![FACE])).with_liveness(Live(true));
        v.enroll("alice", Profile::default(), &face_frame()).unwrap();
        let err = v.authenticate(&face_frame()).unwrap_err();
        assert_eq!(err.kind(), VerifyErrorKind::StorageFailure);
    }

    fn seeded(entry: GalleryEntry) -> Verifier<MemoryGallery, MemoryAuditLog> {
        let mut gallery = MemoryGallery::new();
        gallery.insert(entry).unwrap();
        Verifier::new(gallery, MemoryAuditLog::new(), Fixed(vec![FACE]))
    }

    fn stored(name: &str, encoding: Encoding) -> GalleryEntry {
        GalleryEntry {
            identity: Identity::parse(name).unwrap(),
            encoding,
            profile: Profile::default(),
            enrolled_at: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn test_stale_encoding_version_is_never_scored() {
        let mut encoding = FeatureEncoder.encode(&face_frame(), &FACE);
        encoding.version = 0;
        let mut v = seeded(stored("stale", encoding));

        let err = v.authenticate(&face_frame()).unwrap_err();
        assert!(matches!(
            err,
            VerifyError::StorageFailure(StoreError::VersionMismatch { found: 0, expected: 1, .. })
        ));
        assert!(v.audit_log().is_empty());
        assert_eq!(v.state(), EngineState::Idle);
    }

    #[test]
    fn test_wrong_length_encoding_is_storage_failure_not_panic() {
        let mut encoding = FeatureEncoder.encode(&face_frame(), &FACE);
        encoding.values.truncate(10);
        let mut v = seeded(stored("short", encoding));

        let err = v.authenticate(&face_frame()).unwrap_err();
        assert!(matches!(err, VerifyError::StorageFailure(StoreError::Corrupt(_))));
        assert!(v.audit_log().is_empty());
    }

    #[test]
    fn test_remove_and_stats() {
        let mut v = verifier();
        v.enroll("alice", Profile::default(), &face_frame()).unwrap();
        v.authenticate(&face_frame()).unwrap();
        v.authenticate(&ramp_frame()).unwrap();

        assert_eq!(
            v.stats().unwrap(),
            Stats { total_identities: 1, total_attempts: 2, successful_attempts: 1, failed_attempts: 1 }
        );

        assert!(v.remove("alice").unwrap());
        assert!(!v.remove("alice").unwrap());
        assert_eq!(v.stats().unwrap().total_identities, 0);
        assert_eq!(v.stats().unwrap().total_attempts, 2);
    }
}
