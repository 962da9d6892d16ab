//! Gallery: the persistent set of enrolled identities.
//!
//! [`Gallery`] is the storage seam the verifier talks to. [`MemoryGallery`]
//! is the in-process backend used by tests and embedders; the CLI ships a
//! SQLite backend.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreError;
use crate::types::{Encoding, Identity, Profile};

/// One enrolled identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GalleryEntry {
    pub identity: Identity,
    pub encoding: Encoding,
    pub profile: Profile,
    pub enrolled_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Storage backend for enrolled identities.
///
/// Implementations must reject a second `insert` for an identity that is
/// already present with [`StoreError::Duplicate`], and must never hand out a
/// partially written entry.
pub trait Gallery: Send {
    fn insert(&mut self, entry: GalleryEntry) -> Result<(), StoreError>;

    /// Every entry, ordered by identity.
    fn get_all(&self) -> Result<Vec<GalleryEntry>, StoreError>;

    /// Remove an identity. Returns `false` if it was not enrolled.
    fn remove(&mut self, identity: &Identity) -> Result<bool, StoreError>;

    fn contains(&self, identity: &Identity) -> Result<bool, StoreError>;

    /// Stamp the last successful authentication time.
    fn record_login(&mut self, identity: &Identity, at: DateTime<Utc>) -> Result<(), StoreError>;

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.get_all()?.len())
    }
}

/// In-memory gallery keyed by identity.
#[derive(Debug, Default)]
pub struct MemoryGallery {
    entries: BTreeMap<Identity, GalleryEntry>,
}

impl MemoryGallery {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Gallery for MemoryGallery {
    fn insert(&mut self, entry: GalleryEntry) -> Result<(), StoreError> {
        if self.entries.contains_key(&entry.identity) {
            return Err(StoreError::Duplicate(entry.identity));
        }
        self.entries.insert(entry.identity.clone(), entry);
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<GalleryEntry>, StoreError> {
        Ok(self.entries.values().cloned().collect())
    }

    fn remove(&mut self, identity: &Identity) -> Result<bool, StoreError> {
        Ok(self.entries.remove(identity).is_some())
    }

    fn contains(&self, identity: &Identity) -> Result<bool, StoreError> {
        Ok(self.entries.contains_key(identity))
    }

    fn record_login(&mut self, identity: &Identity, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(entry) = self.entries.get_mut(identity) {
            entry.last_login = Some(at);
        }
        Ok(())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> GalleryEntry {
        GalleryEntry {
            identity: Identity::parse(name).unwrap(),
            encoding: Encoding { values: vec![0.1, 0.2, 0.3], version: 1 },
            profile: Profile::default(),
            enrolled_at: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn test_insert_and_get_all_ordered() {
        let mut gallery = MemoryGallery::new();
        gallery.insert(entry("carol")).unwrap();
        gallery.insert(entry("alice")).unwrap();
        let names: Vec<_> = gallery
            .get_all()
            .unwrap()
            .into_iter()
            .map(|e| e.identity.to_string())
            .collect();
        assert_eq!(names, vec!["alice", "carol"]);
        assert_eq!(gallery.count().unwrap(), 2);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut gallery = MemoryGallery::new();
        gallery.insert(entry("alice")).unwrap();
        let err = gallery.insert(entry("alice")).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(id) if id.as_str() == "alice"));
        assert_eq!(gallery.count().unwrap(), 1);
    }

    #[test]
    fn test_remove_reports_presence() {
        let mut gallery = MemoryGallery::new();
        let alice = Identity::parse("alice").unwrap();
        gallery.insert(entry("alice")).unwrap();
        assert!(gallery.remove(&alice).unwrap());
        assert!(!gallery.remove(&alice).unwrap());
        assert!(!gallery.contains(&alice).unwrap());
    }

    #[test]
    fn test_record_login_sets_timestamp() {
        let mut gallery = MemoryGallery::new();
        let alice = Identity::parse("alice").unwrap();
        gallery.insert(entry("alice")).unwrap();
        let now = Utc::now();
        gallery.record_login(&alice, now).unwrap();
        assert_eq!(gallery.get_all().unwrap()[0].last_login, Some(now));
    }
}
