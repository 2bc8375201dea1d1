//! Intake registration: one catalog record per origin.

use tracing::debug;

use crate::domain::{FileRecord, Fingerprint, Origin};
use crate::library::{fingerprint_and_size, Catalog, CatalogError, NewRecord, Payload};

use super::error::IngestError;

/// Result of registering a source
#[derive(Debug, Clone)]
pub struct Registration {
    pub record: FileRecord,

    /// False when the origin was already in the catalog
    pub created: bool,
}

/// Finds or creates catalog records
pub struct Registrar<'c> {
    catalog: &'c Catalog,
}

impl<'c> Registrar<'c> {
    pub fn new(catalog: &'c Catalog) -> Self {
        Self { catalog }
    }

    /// Find-or-create by origin with an already computed identity.
    ///
    /// An existing record is returned unchanged.
    pub fn register(
        &self,
        origin: &Origin,
        size: u64,
        fingerprint: Fingerprint,
    ) -> Result<Registration, IngestError> {
        let new = NewRecord {
            origin: origin.clone(),
            fingerprint,
            size,
        };

        match self.catalog.find_or_insert(&new) {
            Ok((record, created)) => Ok(Registration { record, created }),
            Err(CatalogError::DuplicateOrigin(_)) => {
                // Lost a race with another insert; the row exists now
                let record = self
                    .catalog
                    .find_by_origin(origin)?
                    .ok_or_else(|| CatalogError::DuplicateOrigin(origin.clone()))?;
                Ok(Registration {
                    record,
                    created: false,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Register a source, hashing it only if its origin is new
    pub fn register_source(
        &self,
        origin: &Origin,
        payload: &Payload,
    ) -> Result<Registration, IngestError> {
        if let Some(record) = self.catalog.find_by_origin(origin)? {
            debug!(record_id = record.id, %origin, "Origin already registered");
            return Ok(Registration {
                record,
                created: false,
            });
        }

        let (fingerprint, size) = fingerprint_and_size(payload)
            .map_err(|e| IngestError::source_unavailable(origin, e))?;
        self.register(origin, size, fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::fingerprint_bytes;
    use std::path::PathBuf;

    #[test]
    fn test_register_twice_same_id() {
        let catalog = Catalog::open_in_memory().unwrap();
        let registrar = Registrar::new(&catalog);
        let origin = Origin::standalone("/in/song.mp3");

        let first = registrar
            .register(&origin, 5, fingerprint_bytes(b"hello"))
            .unwrap();
        let second = registrar
            .register(&origin, 5, fingerprint_bytes(b"hello"))
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.record.id, second.record.id);
        assert_eq!(catalog.stats().unwrap().records, 1);
    }

    #[test]
    fn test_existing_origin_skips_hashing() {
        let catalog = Catalog::open_in_memory().unwrap();
        let registrar = Registrar::new(&catalog);
        let origin = Origin::standalone("/gone/song.mp3");

        registrar
            .register(&origin, 5, fingerprint_bytes(b"hello"))
            .unwrap();

        // The file no longer exists, but the origin is known so nothing is read
        let registration = registrar
            .register_source(&origin, &Payload::OnDisk(PathBuf::from("/gone/song.mp3")))
            .unwrap();
        assert!(!registration.created);
        assert_eq!(registration.record.fingerprint, fingerprint_bytes(b"hello"));
    }

    #[test]
    fn test_missing_source_is_unavailable() {
        let catalog = Catalog::open_in_memory().unwrap();
        let registrar = Registrar::new(&catalog);
        let origin = Origin::standalone("/gone/other.mp3");

        let result =
            registrar.register_source(&origin, &Payload::OnDisk(PathBuf::from("/gone/other.mp3")));
        assert!(matches!(result, Err(IngestError::SourceUnavailable { .. })));
        assert_eq!(catalog.stats().unwrap().records, 0);
    }

    #[test]
    fn test_archive_entry_uses_declared_size() {
        let catalog = Catalog::open_in_memory().unwrap();
        let registrar = Registrar::new(&catalog);
        let origin = Origin::archive_entry("/t/takeout-1.zip", "song2.mp3");

        let registration = registrar
            .register_source(
                &origin,
                &Payload::InMemory {
                    bytes: b"hello".to_vec(),
                    declared_size: 5,
                },
            )
            .unwrap();

        assert!(registration.created);
        assert_eq!(registration.record.size, 5);
        assert_eq!(registration.record.origin, origin);
    }
}
