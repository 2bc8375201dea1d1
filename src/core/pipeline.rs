//! One source through the whole chain:
//! register → attach metadata → plan → materialize.

use tracing::{info_span, warn};

use crate::adapters::TagExtractor;
use crate::domain::{Origin, SourceOutcome};
use crate::library::{Catalog, Payload, PlacementSettings};

use super::error::IngestError;
use super::materializer::{ContentWriter, Materializer};
use super::metadata::MetadataAttacher;
use super::registrar::Registrar;

/// A source occurrence and where its bytes are
#[derive(Debug, Clone)]
pub struct Source {
    pub origin: Origin,
    pub payload: Payload,
}

impl Source {
    /// A standalone file on disk
    pub fn file(path: impl Into<std::path::PathBuf>) -> Self {
        let path = path.into();
        Self {
            origin: Origin::standalone(path.clone()),
            payload: Payload::OnDisk(path),
        }
    }

    /// A member of an archive, with bytes already read
    pub fn archive_entry(
        archive: impl Into<std::path::PathBuf>,
        entry: impl Into<String>,
        bytes: Vec<u8>,
        declared_size: u64,
    ) -> Self {
        Self {
            origin: Origin::archive_entry(archive, entry),
            payload: Payload::InMemory {
                bytes,
                declared_size,
            },
        }
    }
}

/// Processes sources one at a time against a single catalog
pub struct IngestPipeline<'c> {
    registrar: Registrar<'c>,
    attacher: MetadataAttacher<'c>,
    materializer: Materializer<'c>,
}

impl<'c> IngestPipeline<'c> {
    pub fn new(
        catalog: &'c Catalog,
        extractor: &'c dyn TagExtractor,
        writer: &'c dyn ContentWriter,
        settings: &'c PlacementSettings,
    ) -> Self {
        Self {
            registrar: Registrar::new(catalog),
            attacher: MetadataAttacher::new(catalog, extractor),
            materializer: Materializer::new(catalog, settings, writer),
        }
    }

    /// Run the full pipeline for one source
    pub fn ingest(&self, source: &Source) -> Result<SourceOutcome, IngestError> {
        let span = info_span!("source", origin = %source.origin);
        let _guard = span.enter();

        let result = self.ingest_inner(source);
        if let Err(e) = &result {
            warn!(error = %e, "Source failed");
        }
        result
    }

    fn ingest_inner(&self, source: &Source) -> Result<SourceOutcome, IngestError> {
        let registration = self
            .registrar
            .register_source(&source.origin, &source.payload)?;

        let record = if registration.record.destination.is_some() {
            registration.record
        } else {
            self.attacher.attach(registration.record, &source.payload)?
        };

        let (materialized, record) = self.materializer.materialize(&record, &source.payload)?;

        Ok(SourceOutcome {
            record,
            newly_registered: registration.created,
            materialized,
        })
    }
}
