//! SQLite persistence for the gallery and the audit log.
//!
//! Identities are soft-deleted (`active = 0`): the row and its audit history
//! stay, and the same handle may be enrolled again. Encodings are stored as
//! little-endian f64 blobs next to the encoder version that produced them.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use facegate_core::{
    AuditCounts, AuditLog, AuditRecord, Encoding, Gallery, GalleryEntry, Identity, Profile, StoreError,
    ENCODING_LEN, ENCODING_VERSION,
};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS identities (
         identity TEXT PRIMARY KEY,
         full_name TEXT,
         email TEXT,
         encoding BLOB NOT NULL,
         encoding_version INTEGER NOT NULL,
         enrolled_at TEXT NOT NULL,
         last_login TEXT,
         active INTEGER NOT NULL DEFAULT 1
     );
     CREATE TABLE IF NOT EXISTS audit_log (
         id INTEGER PRIMARY KEY AUTOINCREMENT,
         identity TEXT NOT NULL,
         success INTEGER NOT NULL,
         confidence REAL NOT NULL,
         timestamp TEXT NOT NULL
     );
     CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);";

/// Open (or create) the database and return both adapters.
///
/// Each adapter owns its own connection; both must be used from one thread
/// at a time.
pub fn open(db_path: &Path) -> Result<(SqliteGallery, SqliteAuditLog), StoreError> {
    if db_path != Path::new(":memory:") {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StoreError::backend)?;
        }
    }

    let gallery = SqliteGallery::new(connect(db_path)?);
    let audit = SqliteAuditLog::new(connect(db_path)?);
    tracing::info!(path = %db_path.display(), "database opened");
    Ok((gallery, audit))
}

fn connect(db_path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(db_path).map_err(StoreError::backend)?;
    // In-memory databases answer "memory" and keep going.
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
        .map_err(StoreError::backend)?;
    conn.execute_batch(SCHEMA).map_err(StoreError::backend)?;
    Ok(conn)
}

/// Gallery backed by the `identities` table.
pub struct SqliteGallery {
    conn: Connection,
}

impl SqliteGallery {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

type IdentityRow = (
    String,
    Option<String>,
    Option<String>,
    Vec<u8>,
    u32,
    String,
    Option<String>,
);

impl Gallery for SqliteGallery {
    fn insert(&mut self, entry: GalleryEntry) -> Result<(), StoreError> {
        validate_encoding(&entry.identity, &entry.encoding)?;
        let blob = encoding_to_bytes(&entry.encoding.values);

        // Re-enrolling a soft-deleted handle revives its row; an active row is a duplicate.
        let changed = self
            .conn
            .execute(
                "INSERT INTO identities
                     (identity, full_name, email, encoding, encoding_version, enrolled_at, last_login, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, 1)
                 ON CONFLICT(identity) DO UPDATE SET
                     full_name = excluded.full_name,
                     email = excluded.email,
                     encoding = excluded.encoding,
                     encoding_version = excluded.encoding_version,
                     enrolled_at = excluded.enrolled_at,
                     last_login = NULL,
                     active = 1
                 WHERE identities.active = 0",
                params![
                    entry.identity.as_str(),
                    entry.profile.full_name,
                    entry.profile.email,
                    blob,
                    entry.encoding.version,
                    format_timestamp(&entry.enrolled_at),
                ],
            )
            .map_err(StoreError::backend)?;

        if changed == 0 {
            return Err(StoreError::Duplicate(entry.identity));
        }
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<GalleryEntry>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT identity, full_name, email, encoding, encoding_version, enrolled_at, last_login
                 FROM identities WHERE active = 1 ORDER BY identity",
            )
            .map_err(StoreError::backend)?;

        let rows: Vec<IdentityRow> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })
            .map_err(StoreError::backend)?
            .collect::<Result<_, _>>()
            .map_err(StoreError::backend)?;

        rows.into_iter().map(decode_entry).collect()
    }

    fn remove(&mut self, identity: &Identity) -> Result<bool, StoreError> {
        let affected = self
            .conn
            .execute(
                "UPDATE identities SET active = 0 WHERE identity = ?1 AND active = 1",
                [identity.as_str()],
            )
            .map_err(StoreError::backend)?;
        Ok(affected > 0)
    }

    fn contains(&self, identity: &Identity) -> Result<bool, StoreError> {
        self.conn
            .query_row(
                "SELECT 1 FROM identities WHERE identity = ?1 AND active = 1",
                [identity.as_str()],
                |_| Ok(()),
            )
            .optional()
            .map(|row| row.is_some())
            .map_err(StoreError::backend)
    }

    fn record_login(&mut self, identity: &Identity, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.conn
            .execute(
                "UPDATE identities SET last_login = ?2 WHERE identity = ?1 AND active = 1",
                params![identity.as_str(), format_timestamp(&at)],
            )
            .map_err(StoreError::backend)?;
        Ok(())
    }

    fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM identities WHERE active = 1", [], |row| row.get(0))
            .map_err(StoreError::backend)?;
        Ok(count as usize)
    }
}

fn decode_entry(row: IdentityRow) -> Result<GalleryEntry, StoreError> {
    let (identity, full_name, email, blob, version, enrolled_at, last_login) = row;

    if version != ENCODING_VERSION {
        return Err(StoreError::VersionMismatch {
            identity,
            found: version,
            expected: ENCODING_VERSION,
        });
    }

    let values = bytes_to_encoding_strict(&blob)
        .map_err(|reason| StoreError::Corrupt(format!("encoding for '{identity}': {reason}")))?;
    let identity = Identity::parse(&identity)
        .map_err(|e| StoreError::Corrupt(format!("identity {identity:?}: {e}")))?;

    Ok(GalleryEntry {
        identity,
        encoding: Encoding { values, version },
        profile: Profile { full_name, email },
        enrolled_at: parse_timestamp(&enrolled_at)?,
        last_login: last_login.as_deref().map(parse_timestamp).transpose()?,
    })
}

/// Audit log backed by the `audit_log` table.
pub struct SqliteAuditLog {
    conn: Connection,
}

impl SqliteAuditLog {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

impl AuditLog for SqliteAuditLog {
    fn append(&mut self, record: AuditRecord) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO audit_log (identity, success, confidence, timestamp) VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.identity_label(),
                    record.success,
                    record.confidence,
                    format_timestamp(&record.timestamp),
                ],
            )
            .map_err(StoreError::backend)?;
        Ok(())
    }

    fn list(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self
            .conn
            .prepare(
                "SELECT identity, success, confidence, timestamp FROM audit_log
                 ORDER BY timestamp DESC, id DESC LIMIT ?1",
            )
            .map_err(StoreError::backend)?;

        let rows: Vec<(String, bool, f64, String)> = stmt
            .query_map([limit], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
            .map_err(StoreError::backend)?
            .collect::<Result<_, _>>()
            .map_err(StoreError::backend)?;

        rows.into_iter()
            .map(|(identity, success, confidence, timestamp)| -> Result<AuditRecord, StoreError> {
                // Rejected attempts carry the sentinel, never a real identity.
                let identity = if success {
                    Some(
                        Identity::parse(&identity)
                            .map_err(|e| StoreError::Corrupt(format!("audit identity {identity:?}: {e}")))?,
                    )
                } else {
                    None
                };
                Ok(AuditRecord {
                    identity,
                    success,
                    confidence,
                    timestamp: parse_timestamp(&timestamp)?,
                })
            })
            .collect()
    }

    fn counts(&self) -> Result<AuditCounts, StoreError> {
        let (total, successful): (i64, i64) = self
            .conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(success), 0) FROM audit_log",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(StoreError::backend)?;
        Ok(AuditCounts {
            total: total as usize,
            successful: successful as usize,
            failed: (total - successful) as usize,
        })
    }
}

// ── Serialization helpers ─────────────────────────────────────────────────────

/// Fixed-width RFC 3339 so that text order equals time order.
fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {raw:?}: {e}")))
}

fn encoding_to_bytes(values: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 8);
    for &v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn bytes_to_encoding_strict(bytes: &[u8]) -> Result<Vec<f64>, String> {
    if bytes.len() != ENCODING_LEN * 8 {
        return Err(format!("blob is {} bytes, expected {}", bytes.len(), ENCODING_LEN * 8));
    }
    let mut values = Vec::with_capacity(ENCODING_LEN);
    for chunk in bytes.chunks_exact(8) {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(chunk);
        let v = f64::from_le_bytes(arr);
        if !v.is_finite() {
            return Err("non-finite value".to_string());
        }
        values.push(v);
    }
    Ok(values)
}

fn validate_encoding(identity: &Identity, encoding: &Encoding) -> Result<(), StoreError> {
    if encoding.version != ENCODING_VERSION {
        return Err(StoreError::VersionMismatch {
            identity: identity.to_string(),
            found: encoding.version,
            expected: ENCODING_VERSION,
        });
    }
    if encoding.len() != ENCODING_LEN || encoding.values.iter().any(|v| !v.is_finite()) {
        return Err(StoreError::Corrupt(format!(
            "refusing to store malformed encoding for '{identity}'"
        )));
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
