//! Metadata attachment: extract tags once per record.

use tracing::{debug, warn};

use crate::adapters::TagExtractor;
use crate::domain::{FileRecord, TagSet};
use crate::library::{Catalog, Payload};

use super::error::IngestError;

/// Runs the tag extractor and persists normalized tags
pub struct MetadataAttacher<'c> {
    catalog: &'c Catalog,
    extractor: &'c dyn TagExtractor,
}

impl<'c> MetadataAttacher<'c> {
    pub fn new(catalog: &'c Catalog, extractor: &'c dyn TagExtractor) -> Self {
        Self { catalog, extractor }
    }

    /// Attach tags to a record unless a previous pass already did.
    ///
    /// Extraction failures are not fatal: the record gets empty tags and is
    /// still marked as processed.
    pub fn attach(&self, record: FileRecord, payload: &Payload) -> Result<FileRecord, IngestError> {
        if record.has_metadata() {
            debug!(record_id = record.id, "Metadata already attached, skipping");
            return Ok(record);
        }

        let extension = record.origin.extension();
        let raw = match self.extractor.extract(payload, extension.as_deref()) {
            Ok(tags) => tags,
            Err(e) => {
                warn!(
                    record_id = record.id,
                    origin = %record.origin,
                    extractor = self.extractor.name(),
                    error = %e,
                    "Tag extraction failed, continuing without tags"
                );
                TagSet::default()
            }
        };

        let tags = raw.normalized();
        debug!(
            record_id = record.id,
            artist = ?tags.artist,
            album = ?tags.album,
            title = ?tags.title,
            track = ?tags.track,
            disk = ?tags.disk,
            "Extracted tags"
        );

        Ok(self.catalog.set_tags(record.id, &tags)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::TagError;
    use crate::domain::{Origin, METADATA_VERSION};
    use crate::library::{fingerprint_bytes, NewRecord};
    use std::cell::Cell;

    struct CountingExtractor {
        calls: Cell<usize>,
        result: fn() -> Result<TagSet, TagError>,
    }

    impl TagExtractor for CountingExtractor {
        fn name(&self) -> &str {
            "counting"
        }

        fn extract(&self, _payload: &Payload, _extension: Option<&str>) -> Result<TagSet, TagError> {
            self.calls.set(self.calls.get() + 1);
            (self.result)()
        }
    }

    fn registered(catalog: &Catalog) -> FileRecord {
        catalog
            .insert(&NewRecord {
                origin: Origin::standalone("/in/song.mp3"),
                fingerprint: fingerprint_bytes(b"x"),
                size: 1,
            })
            .unwrap()
    }

    fn payload() -> Payload {
        Payload::InMemory {
            bytes: b"x".to_vec(),
            declared_size: 1,
        }
    }

    #[test]
    fn test_attach_normalizes_and_persists() {
        let catalog = Catalog::open_in_memory().unwrap();
        let extractor = CountingExtractor {
            calls: Cell::new(0),
            result: || {
                Ok(TagSet {
                    title: Some("First Take".to_string()),
                    artist: Some(String::new()),
                    album: Some("Demos".to_string()),
                    track: Some(3),
                    disk: None,
                })
            },
        };
        let attacher = MetadataAttacher::new(&catalog, &extractor);

        let record = attacher.attach(registered(&catalog), &payload()).unwrap();
        let tags = record.tags.clone().unwrap();

        assert_eq!(record.metadata_version, Some(METADATA_VERSION));
        assert_eq!(tags.title.as_deref(), Some("First Take"));
        assert_eq!(tags.artist, None);
        assert_eq!(catalog.get(record.id).unwrap(), record);
    }

    #[test]
    fn test_second_attach_is_noop() {
        let catalog = Catalog::open_in_memory().unwrap();
        let extractor = CountingExtractor {
            calls: Cell::new(0),
            result: || {
                Ok(TagSet {
                    artist: Some("Jane Doe".to_string()),
                    ..Default::default()
                })
            },
        };
        let attacher = MetadataAttacher::new(&catalog, &extractor);

        let first = attacher.attach(registered(&catalog), &payload()).unwrap();
        let refetched = catalog.get(first.id).unwrap();
        let second = attacher.attach(refetched, &payload()).unwrap();

        assert_eq!(extractor.calls.get(), 1);
        assert_eq!(first.tags, second.tags);
    }

    #[test]
    fn test_extraction_failure_yields_empty_tags() {
        let catalog = Catalog::open_in_memory().unwrap();
        let extractor = CountingExtractor {
            calls: Cell::new(0),
            result: || Err(TagError::Unreadable("garbage".to_string())),
        };
        let attacher = MetadataAttacher::new(&catalog, &extractor);

        let record = attacher.attach(registered(&catalog), &payload()).unwrap();
        assert!(record.has_metadata());
        assert_eq!(record.tags, Some(TagSet::default()));
    }
}
