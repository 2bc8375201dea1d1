//! Adapter interfaces for external collaborators.
//!
//! The pipeline never parses media or containers itself. Tag extraction goes
//! through the `TagExtractor` trait and archive traversal through the
//! `ZipEntries` iterator.

pub mod archive;
pub mod tags;

use thiserror::Error;

use crate::domain::TagSet;
use crate::library::Payload;

// Re-export the default implementations
pub use archive::{ArchiveEntry, ArchiveError, ZipEntries};
pub use tags::LoftyTagExtractor;

/// Errors from a tag extractor
#[derive(Debug, Error)]
pub enum TagError {
    #[error("Unreadable media: {0}")]
    Unreadable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for embedded-tag extractors
pub trait TagExtractor {
    /// Human-readable extractor name
    fn name(&self) -> &str;

    /// Read tags from a payload.
    ///
    /// Returns raw values; blank strings are allowed and normalized by the caller.
    /// `extension` is the origin's file extension, used as a format hint.
    fn extract(&self, payload: &Payload, extension: Option<&str>) -> Result<TagSet, TagError>;
}
