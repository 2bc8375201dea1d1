//! Input discovery.
//!
//! Expands the paths given on the command line into the media files and
//! archives to process. Directories are walked recursively in file-name
//! order so that repeated runs see the same sequence.

use std::path::{Path, PathBuf};

use glob::Pattern;
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::IngestSettings;

/// Errors that can occur during discovery
#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("Input path does not exist: {0}")]
    NotFound(PathBuf),

    #[error("Invalid archive pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Failed to walk {path}: {message}")]
    Walk { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decides which file names are media and which are archives
#[derive(Debug, Clone)]
pub struct SourceFilter {
    media_extensions: Vec<String>,
    archive_patterns: Vec<Pattern>,
}

impl SourceFilter {
    pub fn new(media_extensions: &[String], archive_patterns: &[String]) -> Result<Self, DiscoverError> {
        let archive_patterns = archive_patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| DiscoverError::InvalidPattern {
                    pattern: p.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            media_extensions: media_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            archive_patterns,
        })
    }

    pub fn from_settings(settings: &IngestSettings) -> Result<Self, DiscoverError> {
        Self::new(&settings.media_extensions, &settings.archive_patterns)
    }

    /// Whether a file or entry name carries a media extension.
    /// Accepts bare names and `/`-separated archive member paths.
    pub fn is_media(&self, name: &str) -> bool {
        let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
        match file_name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => {
                let ext = ext.to_lowercase();
                self.media_extensions.iter().any(|m| *m == ext)
            }
            _ => false,
        }
    }

    /// Whether a file name matches one of the archive patterns
    pub fn is_archive(&self, name: &str) -> bool {
        self.archive_patterns.iter().any(|p| p.matches(name))
    }
}

/// A discovered input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputItem {
    Media(PathBuf),
    Archive(PathBuf),
}

impl InputItem {
    pub fn path(&self) -> &Path {
        match self {
            InputItem::Media(p) | InputItem::Archive(p) => p,
        }
    }
}

fn classify(path: PathBuf, filter: &SourceFilter) -> Option<InputItem> {
    let name = path.file_name()?.to_string_lossy().into_owned();
    // Archive patterns win so that "*.zip" is never mistaken for media
    if filter.is_archive(&name) {
        Some(InputItem::Archive(path))
    } else if filter.is_media(&name) {
        Some(InputItem::Media(path))
    } else {
        None
    }
}

/// Expand input paths into canonical media files and archives.
///
/// Explicit file arguments are classified the same way as files found by
/// walking; anything that is neither media nor archive is dropped.
pub fn discover(paths: &[PathBuf], filter: &SourceFilter) -> Result<Vec<InputItem>, DiscoverError> {
    let mut items = Vec::new();

    for input in paths {
        if !input.exists() {
            return Err(DiscoverError::NotFound(input.clone()));
        }
        let input = input.canonicalize()?;

        if input.is_file() {
            items.extend(classify(input, filter));
            continue;
        }

        for entry in WalkDir::new(&input).sort_by_file_name() {
            let entry = entry.map_err(|e| DiscoverError::Walk {
                path: input.clone(),
                message: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            items.extend(classify(entry.into_path(), filter));
        }
    }

    tracing::debug!(count = items.len(), "Discovered inputs");
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn filter() -> SourceFilter {
        SourceFilter::from_settings(&IngestSettings::default()).unwrap()
    }

    #[test]
    fn test_filter_classification() {
        let filter = filter();

        assert!(filter.is_media("song.MP3"));
        assert!(filter.is_media("Takeout/Music/track.flac"));
        assert!(!filter.is_media("cover.jpg"));
        assert!(!filter.is_media("README"));
        assert!(!filter.is_media("trailing."));
        assert!(filter.is_archive("takeout-1.zip"));
        assert!(!filter.is_archive("song.mp3"));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = SourceFilter::new(&[], &["[".to_string()]);
        assert!(matches!(result, Err(DiscoverError::InvalidPattern { .. })));
    }

    #[test]
    fn test_discover_walks_sorted() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("b-dir");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp.path().join("c.mp3"), b"c").unwrap();
        std::fs::write(temp.path().join("a.zip"), b"zip").unwrap();
        std::fs::write(temp.path().join("notes.txt"), b"txt").unwrap();
        std::fs::write(nested.join("d.ogg"), b"d").unwrap();

        let items = discover(&[temp.path().to_path_buf()], &filter()).unwrap();
        let root = temp.path().canonicalize().unwrap();

        assert_eq!(
            items,
            vec![
                InputItem::Archive(root.join("a.zip")),
                InputItem::Media(root.join("b-dir").join("d.ogg")),
                InputItem::Media(root.join("c.mp3")),
            ]
        );
    }

    #[test]
    fn test_discover_missing_input() {
        let result = discover(&[PathBuf::from("/nonexistent/input")], &filter());
        assert!(matches!(result, Err(DiscoverError::NotFound(_))));
    }
}
