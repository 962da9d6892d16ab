//! Append-only audit trail of authentication attempts.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::error::StoreError;
use crate::types::Identity;

/// Identity recorded for attempts that matched nobody.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// One authentication attempt. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    /// Matched identity; `None` for a rejected attempt.
    #[serde(serialize_with = "identity_or_unknown")]
    pub identity: Option<Identity>,
    pub success: bool,
    /// Reported confidence in [0, 100].
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// The recorded identity, or [`UNKNOWN_IDENTITY`].
    pub fn identity_label(&self) -> &str {
        self.identity.as_ref().map_or(UNKNOWN_IDENTITY, Identity::as_str)
    }
}

fn identity_or_unknown<S: Serializer>(identity: &Option<Identity>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(identity.as_ref().map_or(UNKNOWN_IDENTITY, Identity::as_str))
}

/// Attempt totals, counted from the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditCounts {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Aggregate view over gallery and audit log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total_identities: usize,
    pub total_attempts: usize,
    pub successful_attempts: usize,
    pub failed_attempts: usize,
}

/// Storage backend for the audit trail.
///
/// `append` errors must be surfaced to the caller, never swallowed.
pub trait AuditLog: Send {
    fn append(&mut self, record: AuditRecord) -> Result<(), StoreError>;

    /// Newest first, at most `limit` records.
    fn list(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError>;

    fn counts(&self) -> Result<AuditCounts, StoreError>;
}

/// In-memory audit log.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Vec<AuditRecord>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&mut self, record: AuditRecord) -> Result<(), StoreError> {
        self.records.push(record);
        Ok(())
    }

    fn list(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError> {
        // Stable sort keeps append order for equal timestamps; reversed, newest wins.
        let mut records: Vec<_> = self.records.iter().rev().cloned().collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }

    fn counts(&self) -> Result<AuditCounts, StoreError> {
        let successful = self.records.iter().filter(|r| r.success).count();
        Ok(AuditCounts {
            total: self.records.len(),
            successful,
            failed: self.records.len() - successful,
        })
    }
}
