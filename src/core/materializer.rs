//! Materialization: write a record's content into the library and commit it.
//!
//! ```text
//! Planned ──► DuplicateSkipped        (placed record with same fingerprint+size)
//!    │
//!    ├──► CollisionStormExceeded      (no free path within the attempt bound)
//!    │
//!    └──► write ──► verify ──► commit ──► Placed
//!                     │
//!                     └──► WriteVerificationFailed (catalog untouched)
//! ```
//!
//! The catalog's `path` column is written only after the file on disk has been
//! re-read and its fingerprint matched.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::domain::{FileRecord, Materialized};
use crate::library::{fingerprint_file, plan_path, Catalog, Payload, PlacementSettings};

use super::error::IngestError;

/// Writes payload bytes to a destination path whose parent exists
pub trait ContentWriter {
    fn write(&self, payload: &Payload, destination: &Path) -> io::Result<()>;
}

/// Writes into a temp file beside the destination, fsyncs, then renames
#[derive(Debug, Default, Clone, Copy)]
pub struct AtomicWriter;

impl ContentWriter for AtomicWriter {
    fn write(&self, payload: &Payload, destination: &Path) -> io::Result<()> {
        let parent = destination
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"))?;

        let mut temp = NamedTempFile::new_in(parent)?;
        match payload {
            Payload::OnDisk(source) => {
                let mut reader = File::open(source)?;
                io::copy(&mut reader, temp.as_file_mut())?;
            }
            Payload::InMemory { bytes, .. } => temp.write_all(bytes)?,
        }
        temp.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            temp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o644))?;
        }

        temp.persist(destination).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Places records into the library tree
pub struct Materializer<'c> {
    catalog: &'c Catalog,
    settings: &'c PlacementSettings,
    writer: &'c dyn ContentWriter,
}

impl<'c> Materializer<'c> {
    pub fn new(
        catalog: &'c Catalog,
        settings: &'c PlacementSettings,
        writer: &'c dyn ContentWriter,
    ) -> Self {
        Self {
            catalog,
            settings,
            writer,
        }
    }

    /// Run the materialization state machine for one record
    pub fn materialize(
        &self,
        record: &FileRecord,
        payload: &Payload,
    ) -> Result<(Materialized, FileRecord), IngestError> {
        if let Some(path) = &record.destination {
            debug!(record_id = record.id, path = %path.display(), "Record already placed");
            return Ok((Materialized::AlreadyPlaced { path: path.clone() }, record.clone()));
        }

        // Content identity decides duplication, not name or origin
        if let Some(original) =
            self.catalog
                .find_placed_by_content(&record.fingerprint, record.size, record.id)?
        {
            let original_path = original.destination.clone().unwrap_or_default();
            info!(
                record_id = record.id,
                origin = %record.origin,
                original_id = original.id,
                original = %original_path.display(),
                "Duplicate content, skipping"
            );
            return Ok((
                Materialized::DuplicateSkipped {
                    original_id: original.id,
                    original_path,
                },
                record.clone(),
            ));
        }

        let (destination, collision_index) = self.resolve_destination(record)?;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| IngestError::WriteVerificationFailed {
                path: destination.clone(),
                reason: format!("cannot create directory {}: {}", parent.display(), e),
            })?;
        }

        if let Err(e) = self.writer.write(payload, &destination) {
            return Err(match e.kind() {
                io::ErrorKind::NotFound if matches!(payload, Payload::OnDisk(p) if !p.exists()) => {
                    IngestError::source_unavailable(&record.origin, e)
                }
                _ => IngestError::WriteVerificationFailed {
                    path: destination,
                    reason: format!("write failed: {}", e),
                },
            });
        }

        if let Err(reason) = verify(&destination, record) {
            warn!(
                record_id = record.id,
                path = %destination.display(),
                %reason,
                "Verification failed, removing written file"
            );
            let _ = fs::remove_file(&destination);
            return Err(IngestError::WriteVerificationFailed {
                path: destination,
                reason,
            });
        }

        let placed = self.catalog.set_destination(record.id, &destination)?;
        info!(
            record_id = record.id,
            origin = %record.origin,
            path = %destination.display(),
            "Placed"
        );

        Ok((
            Materialized::Placed {
                path: destination,
                collision_index,
            },
            placed,
        ))
    }

    /// Find the first candidate path no record owns yet
    fn resolve_destination(&self, record: &FileRecord) -> Result<(PathBuf, Option<u32>), IngestError> {
        let root = &self.settings.library_root;
        let mut last_candidate = PathBuf::new();

        for attempt in 0..self.settings.max_collision_attempts {
            let collision_index = if attempt == 0 { None } else { Some(attempt) };
            let candidate = plan_path(root, record, collision_index);

            if self.catalog.find_by_destination(&candidate)?.is_none() {
                if candidate.exists() {
                    warn!(
                        record_id = record.id,
                        path = %candidate.display(),
                        "Replacing untracked file at destination"
                    );
                }
                return Ok((candidate, collision_index));
            }
            debug!(record_id = record.id, candidate = %candidate.display(), "Destination occupied");
            last_candidate = candidate;
        }

        Err(IngestError::CollisionStormExceeded {
            attempts: self.settings.max_collision_attempts,
            last_candidate,
        })
    }
}

/// Re-read the written file and compare against the catalog fingerprint
fn verify(path: &Path, record: &FileRecord) -> Result<(), String> {
    if !path.exists() {
        return Err("file was not created".to_string());
    }

    let written = fingerprint_file(path).map_err(|e| format!("file is not readable: {}", e))?;
    if written != record.fingerprint {
        return Err(format!(
            "fingerprint mismatch: expected {}, found {}",
            record.fingerprint.short(),
            written.short()
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Origin, TagSet};
    use crate::library::{fingerprint_bytes, NewRecord};
    use tempfile::TempDir;

    fn tagged(catalog: &Catalog, origin: Origin, bytes: &[u8], tags: TagSet) -> FileRecord {
        let record = catalog
            .insert(&NewRecord {
                origin,
                fingerprint: fingerprint_bytes(bytes),
                size: bytes.len() as u64,
            })
            .unwrap();
        catalog.set_tags(record.id, &tags).unwrap()
    }

    fn in_memory(bytes: &[u8]) -> Payload {
        Payload::InMemory {
            bytes: bytes.to_vec(),
            declared_size: bytes.len() as u64,
        }
    }

    #[test]
    fn test_atomic_writer_copies_file() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source.mp3");
        std::fs::write(&source, b"payload").unwrap();
        let destination = temp.path().join("dest.mp3");

        AtomicWriter
            .write(&Payload::OnDisk(source), &destination)
            .unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"payload");

        // Overwrites a stale file at the same path
        AtomicWriter
            .write(&in_memory(b"fresh"), &destination)
            .unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"fresh");
    }

    #[test]
    fn test_places_and_commits() {
        let temp = TempDir::new().unwrap();
        let catalog = Catalog::open_in_memory().unwrap();
        let settings = PlacementSettings::new(temp.path().join("lib"));
        let materializer = Materializer::new(&catalog, &settings, &AtomicWriter);

        let record = tagged(
            &catalog,
            Origin::standalone("/in/song.mp3"),
            b"abc",
            TagSet {
                artist: Some("Jane Doe".to_string()),
                ..Default::default()
            },
        );

        let (outcome, placed) = materializer.materialize(&record, &in_memory(b"abc")).unwrap();
        let expected = temp.path().join("lib/Jane-Doe/unknown/unknown.mp3");

        assert_eq!(
            outcome,
            Materialized::Placed {
                path: expected.clone(),
                collision_index: None
            }
        );
        assert_eq!(placed.destination, Some(expected.clone()));
        assert_eq!(std::fs::read(&expected).unwrap(), b"abc");

        // Materializing again is a no-op
        let (again, _) = materializer.materialize(&placed, &in_memory(b"abc")).unwrap();
        assert_eq!(again, Materialized::AlreadyPlaced { path: expected });
    }

    #[test]
    fn test_collision_storm_is_bounded() {
        let temp = TempDir::new().unwrap();
        let catalog = Catalog::open_in_memory().unwrap();
        let settings = PlacementSettings::new(temp.path()).with_max_collision_attempts(2);
        let materializer = Materializer::new(&catalog, &settings, &AtomicWriter);

        for (i, content) in [b"one", b"two"].iter().enumerate() {
            let record = tagged(
                &catalog,
                Origin::standalone(format!("/in/{}.mp3", i)),
                *content,
                TagSet::default(),
            );
            materializer.materialize(&record, &in_memory(*content)).unwrap();
        }

        let third = tagged(
            &catalog,
            Origin::standalone("/in/2.mp3"),
            b"three",
            TagSet::default(),
        );
        let result = materializer.materialize(&third, &in_memory(b"three"));
        assert!(matches!(
            result,
            Err(IngestError::CollisionStormExceeded { attempts: 2, .. })
        ));
        assert_eq!(catalog.get(third.id).unwrap().destination, None);
    }

    #[derive(Clone, Default)]
    struct CapturedLog(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_untracked_file_is_reported_and_replaced() {
        let temp = TempDir::new().unwrap();
        let catalog = Catalog::open_in_memory().unwrap();
        let settings = PlacementSettings::new(temp.path());
        let materializer = Materializer::new(&catalog, &settings, &AtomicWriter);

        let stray = temp.path().join("unknown/unknown/unknown.mp3");
        fs::create_dir_all(stray.parent().unwrap()).unwrap();
        fs::write(&stray, b"left over").unwrap();

        let record = tagged(
            &catalog,
            Origin::standalone("/in/song.mp3"),
            b"fresh",
            TagSet::default(),
        );

        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let (outcome, _) = tracing::subscriber::with_default(subscriber, || {
            materializer.materialize(&record, &in_memory(b"fresh")).unwrap()
        });

        assert_eq!(outcome.library_path(), &stray);
        assert_eq!(fs::read(&stray).unwrap(), b"fresh");
        let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Replacing untracked file"), "{}", output);
    }
}
