//! Zip archive traversal.
//!
//! Entries are read one at a time; only accepted entries are decompressed
//! into memory.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::ZipArchive;

/// Cap on up-front allocation, since declared sizes come from the container
const MAX_PREALLOCATE_BYTES: u64 = 64 * 1024 * 1024;

/// Errors that can occur while reading an archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to open archive {path}: {message}")]
    Open { path: PathBuf, message: String },

    #[error("Failed to read entry #{index} of {path}: {message}")]
    Entry {
        path: PathBuf,
        index: usize,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One file inside an archive
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Entry name as stored in the container
    pub name: String,

    /// Decompressed bytes
    pub bytes: Vec<u8>,

    /// Uncompressed size declared by the container
    pub declared_size: u64,
}

/// Iterator over the accepted file entries of a zip archive
pub struct ZipEntries<F> {
    path: PathBuf,
    archive: ZipArchive<BufReader<File>>,
    next_index: usize,
    accept: F,
    skipped: usize,
}

impl<F> ZipEntries<F>
where
    F: Fn(&str) -> bool,
{
    /// Open an archive; `accept` decides which entry names are yielded
    pub fn open(path: &Path, accept: F) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(BufReader::new(file)).map_err(|e| ArchiveError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            archive,
            next_index: 0,
            accept,
            skipped: 0,
        })
    }

    /// Archive path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total entries in the container, including directories
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// File entries passed over so far because `accept` rejected them
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<F> Iterator for ZipEntries<F>
where
    F: Fn(&str) -> bool,
{
    type Item = Result<ArchiveEntry, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_index < self.archive.len() {
            let index = self.next_index;
            self.next_index += 1;

            let mut file = match self.archive.by_index(index) {
                Ok(file) => file,
                Err(e) => {
                    return Some(Err(ArchiveError::Entry {
                        path: self.path.clone(),
                        index,
                        message: e.to_string(),
                    }))
                }
            };

            if file.is_dir() {
                continue;
            }

            let name = file.name().to_string();
            if !(self.accept)(&name) {
                self.skipped += 1;
                continue;
            }

            let declared_size = file.size();
            let mut bytes = Vec::with_capacity(declared_size.min(MAX_PREALLOCATE_BYTES) as usize);
            return Some(match file.read_to_end(&mut bytes) {
                Ok(_) => Ok(ArchiveEntry {
                    name,
                    bytes,
                    declared_size,
                }),
                Err(e) => Err(ArchiveError::Entry {
                    path: self.path.clone(),
                    index,
                    message: e.to_string(),
                }),
            });
        }

        None
    }
}
