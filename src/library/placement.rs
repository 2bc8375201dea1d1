//! Canonical library paths.
//!
//! ```text
//! <library_root>/<artist>/<album[-disk-N]>/[<NN>-]<title>[-<collision_index>].<ext>
//! ```
//!
//! Planning is pure: the same record and index always yield the same path.

use std::path::{Component, Path, PathBuf};

use crate::domain::FileRecord;

/// Placeholder for any missing tag
pub const UNKNOWN: &str = "unknown";

/// Attempts (including the unsuffixed one) before giving up on a free path
pub const DEFAULT_MAX_COLLISION_ATTEMPTS: u32 = 1000;

/// Where and how records are placed
#[derive(Debug, Clone)]
pub struct PlacementSettings {
    /// Root of the library tree
    pub library_root: PathBuf,

    /// Collision-resolution bound
    pub max_collision_attempts: u32,
}

impl PlacementSettings {
    /// The root is made absolute so catalog paths do not depend on the
    /// working directory of the run that placed them.
    pub fn new(library_root: impl AsRef<Path>) -> Self {
        Self {
            library_root: absolute_root(library_root.as_ref()),
            max_collision_attempts: DEFAULT_MAX_COLLISION_ATTEMPTS,
        }
    }

    /// Set the collision bound (at least one attempt is always made)
    pub fn with_max_collision_attempts(mut self, attempts: u32) -> Self {
        self.max_collision_attempts = attempts.max(1);
        self
    }
}

/// Absolute, lexically normalized form of a path.
///
/// Relative paths are joined onto the current directory; `.` and `..`
/// components are folded without touching the filesystem.
pub fn absolute_root(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Compute the destination for a record
pub fn plan_path(library_root: &Path, record: &FileRecord, collision_index: Option<u32>) -> PathBuf {
    let tags = record.tags_or_default();

    let artist = segment(tags.artist.as_deref());

    let mut album = segment(tags.album.as_deref());
    if let Some(disk) = tags.disk {
        album.push_str(&format!("-disk-{}", disk));
    }

    let mut file_name = String::new();
    if let Some(track) = tags.track {
        file_name.push_str(&format!("{:02}-", track));
    }
    file_name.push_str(&segment(tags.title.as_deref()));
    if let Some(index) = collision_index {
        file_name.push_str(&format!("-{}", index));
    }
    if let Some(ext) = record.origin.extension() {
        file_name.push('.');
        file_name.push_str(&ext);
    }

    library_root.join(artist).join(album).join(file_name)
}

/// Turn a tag value into one path segment
fn segment(value: Option<&str>) -> String {
    let value = value.unwrap_or(UNKNOWN);

    let mut out = String::with_capacity(value.len());
    let mut in_whitespace = false;
    for ch in value.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push('-');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        match ch {
            '/' | '\\' | '\0' => out.push('_'),
            _ => out.push(ch),
        }
    }

    if out == "." || out == ".." {
        return UNKNOWN.to_string();
    }
    out
}
