//! Tag extraction backed by lofty.

use std::io::Cursor;

use lofty::file::{FileType, TaggedFile, TaggedFileExt};
use lofty::prelude::*;
use lofty::probe::Probe;

use super::{TagError, TagExtractor};
use crate::domain::TagSet;
use crate::library::Payload;

/// Reads ID3, Vorbis comments, MP4 atoms and the other formats lofty knows
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagExtractor;

impl LoftyTagExtractor {
    pub fn new() -> Self {
        Self
    }

    fn read(payload: &Payload, extension: Option<&str>) -> Result<TaggedFile, TagError> {
        match payload {
            Payload::OnDisk(path) => Probe::open(path)
                .map_err(|e| TagError::Unreadable(e.to_string()))?
                .read()
                .map_err(|e| TagError::Unreadable(e.to_string())),
            Payload::InMemory { bytes, .. } => {
                let mut probe = Probe::new(Cursor::new(bytes.as_slice())).guess_file_type()?;
                if probe.file_type().is_none() {
                    if let Some(file_type) = extension.and_then(FileType::from_ext) {
                        probe = probe.set_file_type(file_type);
                    }
                }
                probe
                    .read()
                    .map_err(|e| TagError::Unreadable(e.to_string()))
            }
        }
    }
}

impl TagExtractor for LoftyTagExtractor {
    fn name(&self) -> &str {
        "lofty"
    }

    fn extract(&self, payload: &Payload, extension: Option<&str>) -> Result<TagSet, TagError> {
        let tagged_file = Self::read(payload, extension)?;

        let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
            return Ok(TagSet::default());
        };

        Ok(TagSet {
            title: tag.title().map(|s| s.to_string()),
            artist: tag.artist().map(|s| s.to_string()),
            album: tag.album().map(|s| s.to_string()),
            track: tag.track(),
            disk: tag.disk(),
        })
    }
}
