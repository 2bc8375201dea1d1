//! Catalog records and the values they are keyed by.
//!
//! A `FileRecord` is created once per distinct `Origin` and then filled in
//! place: first with tags, then with a destination path.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Value of `metadata_version` once tags have been extracted and persisted
pub const METADATA_VERSION: u32 = 1;

/// Content fingerprint (lowercase hex SHA-256)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already-computed hex digest
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Get the raw string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for display (first 12 hex chars)
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a source was found
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    /// A standalone file on disk
    Standalone { path: PathBuf },

    /// A member of an archive container
    ArchiveEntry { archive: PathBuf, entry: String },
}

impl Origin {
    pub fn standalone(path: impl Into<PathBuf>) -> Self {
        Self::Standalone { path: path.into() }
    }

    pub fn archive_entry(archive: impl Into<PathBuf>, entry: impl Into<String>) -> Self {
        Self::ArchiveEntry {
            archive: archive.into(),
            entry: entry.into(),
        }
    }

    /// The archive path, if this is an archive member
    pub fn archive(&self) -> Option<&Path> {
        match self {
            Self::Standalone { .. } => None,
            Self::ArchiveEntry { archive, .. } => Some(archive),
        }
    }

    /// The path or entry name within its container, as stored in `orig_path`
    pub fn member_path(&self) -> String {
        match self {
            Self::Standalone { path } => path.to_string_lossy().into_owned(),
            Self::ArchiveEntry { entry, .. } => entry.clone(),
        }
    }

    /// Rebuild an origin from its two catalog columns
    pub fn from_columns(orig_archive: Option<String>, orig_path: String) -> Self {
        match orig_archive {
            Some(archive) => Self::archive_entry(archive, orig_path),
            None => Self::standalone(orig_path),
        }
    }

    /// Final component of the origin's name (entry names use `/` separators)
    pub fn file_name(&self) -> String {
        match self {
            Self::Standalone { path } => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Self::ArchiveEntry { entry, .. } => entry
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(entry)
                .to_string(),
        }
    }

    /// Substring after the final `.` of the file name, unmodified
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        name.rfind('.')
            .map(|idx| name[idx + 1..].to_string())
            .filter(|ext| !ext.is_empty())
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standalone { path } => write!(f, "{}", path.display()),
            Self::ArchiveEntry { archive, entry } => write!(f, "{}!{}", archive.display(), entry),
        }
    }
}

/// Normalized tag set; every field is independently optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track: Option<u32>,
    pub disk: Option<u32>,
}

impl TagSet {
    /// Normalize raw extractor output: blank strings and zero numbers become absent
    pub fn normalized(self) -> Self {
        fn text(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }

        Self {
            title: text(self.title),
            artist: text(self.artist),
            album: text(self.album),
            track: self.track.filter(|n| *n > 0),
            disk: self.disk.filter(|n| *n > 0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.artist.is_none()
            && self.album.is_none()
            && self.track.is_none()
            && self.disk.is_none()
    }
}

/// How far through the pipeline a record has progressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStage {
    /// Registered, tags not yet extracted
    Registered,

    /// Tags attached, not yet placed
    Tagged,

    /// Destination committed
    Placed,
}

impl std::fmt::Display for RecordStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordStage::Registered => write!(f, "registered"),
            RecordStage::Tagged => write!(f, "tagged"),
            RecordStage::Placed => write!(f, "placed"),
        }
    }
}

/// One catalog row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Catalog-assigned identifier
    pub id: i64,

    /// Content fingerprint
    pub fingerprint: Fingerprint,

    /// Content size in bytes
    pub size: u64,

    /// Where the content came from
    pub origin: Origin,

    /// Committed library path, set once after verification
    pub destination: Option<PathBuf>,

    /// Extracted tags (present once metadata has been attached)
    pub tags: Option<TagSet>,

    /// `Some(METADATA_VERSION)` once tags have been persisted
    pub metadata_version: Option<u32>,

    /// When the record was registered
    pub created_at: DateTime<Utc>,

    /// When the destination was committed
    pub placed_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    pub fn stage(&self) -> RecordStage {
        if self.destination.is_some() {
            RecordStage::Placed
        } else if self.has_metadata() {
            RecordStage::Tagged
        } else {
            RecordStage::Registered
        }
    }

    /// Whether tag extraction has already run for this record
    pub fn has_metadata(&self) -> bool {
        self.metadata_version == Some(METADATA_VERSION)
    }

    /// Tags, or an empty set if none were attached
    pub fn tags_or_default(&self) -> TagSet {
        self.tags.clone().unwrap_or_default()
    }
}
