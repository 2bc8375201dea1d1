//! SQLite catalog of every source ever seen.
//!
//! One row per distinct origin. Rows are only ever inserted and filled in;
//! nothing here deletes. Every write runs in autocommit mode with
//! `synchronous = FULL`, so a crash loses at most the statement in flight.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::Serialize;
use thiserror::Error;

use crate::domain::{FileRecord, Fingerprint, Origin, TagSet, METADATA_VERSION};

/// Current schema version stored in `PRAGMA user_version`
const SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS file (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint      TEXT NOT NULL,
    size             INTEGER NOT NULL,
    orig_archive     TEXT,
    orig_path        TEXT NOT NULL,
    path             TEXT,
    artist           TEXT,
    album            TEXT,
    title            TEXT,
    disk             INTEGER,
    track            INTEGER,
    metadata_version INTEGER,
    created_at       TEXT NOT NULL,
    placed_at        TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS file_origin_index
    ON file (COALESCE(orig_archive, ''), orig_path);
CREATE UNIQUE INDEX IF NOT EXISTS file_path_index
    ON file (path) WHERE path IS NOT NULL;
CREATE INDEX IF NOT EXISTS file_content_index
    ON file (fingerprint, size);
";

const SELECT_COLUMNS: &str = "id, fingerprint, size, orig_archive, orig_path, path, \
     artist, album, title, disk, track, metadata_version, created_at, placed_at";

/// Errors that can occur in the catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Origin already registered: {0}")]
    DuplicateOrigin(Origin),

    #[error("Destination already taken: {0}")]
    DestinationTaken(PathBuf),

    #[error("Record {id} is already placed at {path}")]
    AlreadyPlaced { id: i64, path: PathBuf },

    #[error("Record not found: {0}")]
    NotFound(i64),

    #[error("Catalog is locked by another process: {0}")]
    Locked(PathBuf),

    #[error("Unsupported catalog schema version {0}")]
    UnsupportedSchema(i32),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fields needed to create a record
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub origin: Origin,
    pub fingerprint: Fingerprint,
    pub size: u64,
}

/// Which records `list` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFilter {
    #[default]
    All,

    /// Only records without a destination
    Unplaced,
}

/// Aggregate counts over the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub records: u64,
    pub tagged: u64,
    pub placed: u64,
    pub unplaced: u64,
    pub from_archives: u64,
    pub placed_bytes: u64,
}

/// The persistent catalog
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open (or create) a catalog database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory catalog (tests, dry inspection)
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CatalogError> {
        conn.execute_batch("PRAGMA synchronous = FULL;")?;
        Self::migrate(&conn)?;
        Ok(Self { conn })
    }

    fn migrate(conn: &Connection) -> Result<(), CatalogError> {
        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        match version {
            0 => {
                conn.execute_batch(SCHEMA_V1)?;
                conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
                Ok(())
            }
            SCHEMA_VERSION => Ok(()),
            other => Err(CatalogError::UnsupportedSchema(other)),
        }
    }

    /// Insert a new record. Fails with `DuplicateOrigin` if the origin exists.
    pub fn insert(&self, new: &NewRecord) -> Result<FileRecord, CatalogError> {
        let archive = archive_column(&new.origin);
        let created_at = Utc::now();

        let result = self.conn.execute(
            "INSERT INTO file (fingerprint, size, orig_archive, orig_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new.fingerprint.as_str(),
                new.size as i64,
                archive,
                new.origin.member_path(),
                created_at,
            ],
        );

        match result {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(CatalogError::DuplicateOrigin(new.origin.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        let id = self.conn.last_insert_rowid();
        self.get(id)
    }

    /// Find the record for an origin, inserting it if absent.
    ///
    /// The lookup and the insert run in one transaction. Returns the record
    /// and whether it was created by this call.
    pub fn find_or_insert(&self, new: &NewRecord) -> Result<(FileRecord, bool), CatalogError> {
        let tx = self.conn.unchecked_transaction()?;

        if let Some(existing) = self.find_by_origin(&new.origin)? {
            tx.commit()?;
            return Ok((existing, false));
        }

        let record = self.insert(new)?;
        tx.commit()?;
        Ok((record, true))
    }

    /// Get a record by id
    pub fn get(&self, id: i64) -> Result<FileRecord, CatalogError> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM file WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                record_from_row,
            )
            .optional()?
            .ok_or(CatalogError::NotFound(id))
    }

    /// Look up a record by origin
    pub fn find_by_origin(&self, origin: &Origin) -> Result<Option<FileRecord>, CatalogError> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM file
                     WHERE COALESCE(orig_archive, '') = ?1 AND orig_path = ?2",
                    SELECT_COLUMNS
                ),
                params![archive_column(origin).unwrap_or_default(), origin.member_path()],
                record_from_row,
            )
            .optional()?;

        Ok(record)
    }

    /// Find a placed record (other than `exclude_id`) with identical content
    pub fn find_placed_by_content(
        &self,
        fingerprint: &Fingerprint,
        size: u64,
        exclude_id: i64,
    ) -> Result<Option<FileRecord>, CatalogError> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM file
                     WHERE fingerprint = ?1 AND size = ?2 AND path IS NOT NULL AND id != ?3
                     ORDER BY id LIMIT 1",
                    SELECT_COLUMNS
                ),
                params![fingerprint.as_str(), size as i64, exclude_id],
                record_from_row,
            )
            .optional()?;

        Ok(record)
    }

    /// Find the record that owns a destination path
    pub fn find_by_destination(&self, path: &Path) -> Result<Option<FileRecord>, CatalogError> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {} FROM file WHERE path = ?1", SELECT_COLUMNS),
                params![path.to_string_lossy()],
                record_from_row,
            )
            .optional()?;

        Ok(record)
    }

    /// Persist all five tag fields and mark metadata as extracted
    pub fn set_tags(&self, id: i64, tags: &TagSet) -> Result<FileRecord, CatalogError> {
        let updated = self.conn.execute(
            "UPDATE file
             SET title = ?1, artist = ?2, album = ?3, track = ?4, disk = ?5, metadata_version = ?6
             WHERE id = ?7",
            params![
                tags.title,
                tags.artist,
                tags.album,
                tags.track,
                tags.disk,
                METADATA_VERSION,
                id
            ],
        )?;

        if updated == 0 {
            return Err(CatalogError::NotFound(id));
        }
        self.get(id)
    }

    /// Commit the destination path. Only succeeds while the record has none.
    pub fn set_destination(&self, id: i64, path: &Path) -> Result<FileRecord, CatalogError> {
        let result = self.conn.execute(
            "UPDATE file SET path = ?1, placed_at = ?2 WHERE id = ?3 AND path IS NULL",
            params![path.to_string_lossy(), Utc::now(), id],
        );

        let updated = match result {
            Ok(n) => n,
            Err(e) if is_constraint_violation(&e) => {
                return Err(CatalogError::DestinationTaken(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        if updated == 0 {
            let existing = self.get(id)?;
            return Err(match existing.destination {
                Some(path) => CatalogError::AlreadyPlaced { id, path },
                None => CatalogError::NotFound(id),
            });
        }
        self.get(id)
    }

    /// Most recent records first
    pub fn list(&self, filter: RecordFilter, limit: usize) -> Result<Vec<FileRecord>, CatalogError> {
        let clause = match filter {
            RecordFilter::All => "",
            RecordFilter::Unplaced => "WHERE path IS NULL",
        };

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM file {} ORDER BY id DESC LIMIT ?1",
            SELECT_COLUMNS, clause
        ))?;
        let records = stmt
            .query_map(params![limit as i64], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Aggregate counts
    pub fn stats(&self) -> Result<CatalogStats, CatalogError> {
        let stats = self.conn.query_row(
            "SELECT COUNT(*),
                    COUNT(metadata_version),
                    COUNT(path),
                    COUNT(orig_archive),
                    COALESCE(SUM(CASE WHEN path IS NOT NULL THEN size ELSE 0 END), 0)
             FROM file",
            [],
            |row| {
                let records: i64 = row.get(0)?;
                let placed: i64 = row.get(2)?;
                Ok(CatalogStats {
                    records: records as u64,
                    tagged: row.get::<_, i64>(1)? as u64,
                    placed: placed as u64,
                    unplaced: (records - placed) as u64,
                    from_archives: row.get::<_, i64>(3)? as u64,
                    placed_bytes: row.get::<_, i64>(4)? as u64,
                })
            },
        )?;

        Ok(stats)
    }
}

/// Exclusive advisory lock that keeps a second writer off the catalog
pub struct CatalogLock {
    file: File,
    path: PathBuf,
}

impl CatalogLock {
    /// Lock `<catalog>.lock` without blocking
    pub fn acquire(catalog_path: &Path) -> Result<Self, CatalogError> {
        let path = lock_path(catalog_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        file.try_lock_exclusive()
            .map_err(|_| CatalogError::Locked(path.clone()))?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CatalogLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn lock_path(catalog_path: &Path) -> PathBuf {
    let mut name = catalog_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    catalog_path.with_file_name(name)
}

fn archive_column(origin: &Origin) -> Option<String> {
    origin.archive().map(|a| a.to_string_lossy().into_owned())
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let metadata_version: Option<u32> = row.get(11)?;
    let tags = TagSet {
        artist: row.get(6)?,
        album: row.get(7)?,
        title: row.get(8)?,
        disk: row.get(9)?,
        track: row.get(10)?,
    };
    let tags = if metadata_version.is_some() || !tags.is_empty() {
        Some(tags)
    } else {
        None
    };

    Ok(FileRecord {
        id: row.get(0)?,
        fingerprint: Fingerprint::from_hex(row.get::<_, String>(1)?),
        size: row.get::<_, i64>(2)? as u64,
        origin: Origin::from_columns(row.get(3)?, row.get(4)?),
        destination: row.get::<_, Option<String>>(5)?.map(PathBuf::from),
        tags,
        metadata_version,
        created_at: row.get::<_, DateTime<Utc>>(12)?,
        placed_at: row.get(13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_record(path: &str, content: &str) -> NewRecord {
        NewRecord {
            origin: Origin::standalone(path),
            fingerprint: Fingerprint::from_hex(format!("{:0>64}", content)),
            size: content.len() as u64,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let catalog = Catalog::open_in_memory().unwrap();
        let record = catalog.insert(&new_record("/in/a.mp3", "aa")).unwrap();

        assert_eq!(record.id, 1);
        assert_eq!(record.size, 2);
        assert_eq!(record.destination, None);
        assert_eq!(record.metadata_version, None);
        assert_eq!(record.tags, None);

        let fetched = catalog.get(record.id).unwrap();
        assert_eq!(fetched, record);
    }

    #[test]
    fn test_duplicate_origin_rejected() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.insert(&new_record("/in/a.mp3", "aa")).unwrap();

        let result = catalog.insert(&new_record("/in/a.mp3", "bb"));
        assert!(matches!(result, Err(CatalogError::DuplicateOrigin(_))));
    }

    #[test]
    fn test_same_entry_name_in_different_archives() {
        let catalog = Catalog::open_in_memory().unwrap();
        let fp = Fingerprint::from_hex("ab");

        for archive in ["/t/one.zip", "/t/two.zip"] {
            catalog
                .insert(&NewRecord {
                    origin: Origin::archive_entry(archive, "song.mp3"),
                    fingerprint: fp.clone(),
                    size: 1,
                })
                .unwrap();
        }

        // A standalone file whose path equals an entry name is a different origin too
        catalog
            .insert(&NewRecord {
                origin: Origin::standalone("song.mp3"),
                fingerprint: fp,
                size: 1,
            })
            .unwrap();

        assert_eq!(catalog.stats().unwrap().records, 3);
    }

    #[test]
    fn test_find_or_insert_is_idempotent() {
        let catalog = Catalog::open_in_memory().unwrap();
        let new = new_record("/in/a.mp3", "aa");

        let (first, created) = catalog.find_or_insert(&new).unwrap();
        assert!(created);
        let (second, created) = catalog.find_or_insert(&new).unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(catalog.stats().unwrap().records, 1);
    }

    #[test]
    fn test_set_tags_marks_metadata_version() {
        let catalog = Catalog::open_in_memory().unwrap();
        let record = catalog.insert(&new_record("/in/a.mp3", "aa")).unwrap();

        let tags = TagSet {
            title: Some("First Take".to_string()),
            track: Some(3),
            ..Default::default()
        };
        let updated = catalog.set_tags(record.id, &tags).unwrap();

        assert_eq!(updated.metadata_version, Some(METADATA_VERSION));
        assert_eq!(updated.tags, Some(tags));
        assert!(updated.has_metadata());
    }

    #[test]
    fn test_empty_tags_still_present_after_extraction() {
        let catalog = Catalog::open_in_memory().unwrap();
        let record = catalog.insert(&new_record("/in/a.mp3", "aa")).unwrap();

        let updated = catalog.set_tags(record.id, &TagSet::default()).unwrap();
        assert_eq!(updated.tags, Some(TagSet::default()));
    }

    #[test]
    fn test_destination_set_once() {
        let catalog = Catalog::open_in_memory().unwrap();
        let record = catalog.insert(&new_record("/in/a.mp3", "aa")).unwrap();

        let placed = catalog
            .set_destination(record.id, Path::new("/lib/x/y/a.mp3"))
            .unwrap();
        assert_eq!(placed.destination, Some(PathBuf::from("/lib/x/y/a.mp3")));
        assert!(placed.placed_at.is_some());

        let again = catalog.set_destination(record.id, Path::new("/lib/other.mp3"));
        assert!(matches!(again, Err(CatalogError::AlreadyPlaced { .. })));
        assert_eq!(
            catalog.get(record.id).unwrap().destination,
            Some(PathBuf::from("/lib/x/y/a.mp3"))
        );
    }

    #[test]
    fn test_destination_unique_across_records() {
        let catalog = Catalog::open_in_memory().unwrap();
        let a = catalog.insert(&new_record("/in/a.mp3", "aa")).unwrap();
        let b = catalog.insert(&new_record("/in/b.mp3", "bb")).unwrap();

        catalog.set_destination(a.id, Path::new("/lib/song.mp3")).unwrap();
        let result = catalog.set_destination(b.id, Path::new("/lib/song.mp3"));
        assert!(matches!(result, Err(CatalogError::DestinationTaken(_))));

        let owner = catalog
            .find_by_destination(Path::new("/lib/song.mp3"))
            .unwrap()
            .unwrap();
        assert_eq!(owner.id, a.id);
    }

    #[test]
    fn test_find_placed_by_content() {
        let catalog = Catalog::open_in_memory().unwrap();
        let a = catalog.insert(&new_record("/in/a.mp3", "same")).unwrap();
        let b = catalog.insert(&new_record("/in/b.mp3", "same")).unwrap();

        // Nothing placed yet
        assert!(catalog
            .find_placed_by_content(&b.fingerprint, b.size, b.id)
            .unwrap()
            .is_none());

        catalog.set_destination(a.id, Path::new("/lib/a.mp3")).unwrap();

        let original = catalog
            .find_placed_by_content(&b.fingerprint, b.size, b.id)
            .unwrap()
            .unwrap();
        assert_eq!(original.id, a.id);

        // A record never matches itself
        assert!(catalog
            .find_placed_by_content(&a.fingerprint, a.size, a.id)
            .unwrap()
            .is_none());

        // Same fingerprint, different size is not a duplicate
        assert!(catalog
            .find_placed_by_content(&b.fingerprint, b.size + 1, b.id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_list_and_stats() {
        let catalog = Catalog::open_in_memory().unwrap();
        let a = catalog.insert(&new_record("/in/a.mp3", "aa")).unwrap();
        catalog.insert(&new_record("/in/b.mp3", "bbb")).unwrap();
        catalog
            .insert(&NewRecord {
                origin: Origin::archive_entry("/t/x.zip", "c.mp3"),
                fingerprint: Fingerprint::from_hex("cc"),
                size: 4,
            })
            .unwrap();

        catalog.set_tags(a.id, &TagSet::default()).unwrap();
        catalog.set_destination(a.id, Path::new("/lib/a.mp3")).unwrap();

        let all = catalog.list(RecordFilter::All, 10).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, 3);

        let unplaced = catalog.list(RecordFilter::Unplaced, 10).unwrap();
        assert_eq!(unplaced.len(), 2);

        let limited = catalog.list(RecordFilter::All, 1).unwrap();
        assert_eq!(limited.len(), 1);

        let stats = catalog.stats().unwrap();
        assert_eq!(
            stats,
            CatalogStats {
                records: 3,
                tagged: 1,
                placed: 1,
                unplaced: 2,
                from_archives: 1,
                placed_bytes: 2,
            }
        );
    }

    #[test]
    fn test_reopen_persists_records() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("nested").join("catalog.sqlite3");

        let id = {
            let catalog = Catalog::open(&db_path).unwrap();
            catalog.insert(&new_record("/in/a.mp3", "aa")).unwrap().id
        };

        let catalog = Catalog::open(&db_path).unwrap();
        let record = catalog.find_by_origin(&Origin::standalone("/in/a.mp3")).unwrap().unwrap();
        assert_eq!(record.id, id);
    }

    #[test]
    fn test_lock_is_exclusive() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("catalog.sqlite3");

        let lock = CatalogLock::acquire(&db_path).unwrap();
        assert_eq!(lock.path(), temp.path().join("catalog.sqlite3.lock").as_path());

        let second = CatalogLock::acquire(&db_path);
        assert!(matches!(second, Err(CatalogError::Locked(_))));

        drop(lock);
        assert!(CatalogLock::acquire(&db_path).is_ok());
    }
}
