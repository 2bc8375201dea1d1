//! Content identity: SHA-256 fingerprint plus size.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::domain::Fingerprint;

/// Read buffer for hashing files on disk
const HASH_CHUNK_BYTES: usize = 1024 * 1024;

/// Where a source's bytes live
#[derive(Debug, Clone)]
pub enum Payload {
    /// A file on disk
    OnDisk(PathBuf),

    /// Bytes already produced by archive traversal, with the container's declared size
    InMemory { bytes: Vec<u8>, declared_size: u64 },
}

impl Payload {
    /// Size recorded in the catalog for this payload.
    ///
    /// For archive entries this is the container's declared size, not the
    /// length of `bytes`.
    pub fn catalog_size(&self) -> io::Result<u64> {
        match self {
            Payload::OnDisk(path) => Ok(std::fs::metadata(path)?.len()),
            Payload::InMemory { declared_size, .. } => Ok(*declared_size),
        }
    }
}

/// Fingerprint a byte slice
pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Fingerprint::from_hex(hex::encode(hasher.finalize()))
}

/// Fingerprint a file on disk, streaming it in chunks
pub fn fingerprint_file(path: &Path) -> io::Result<Fingerprint> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_CHUNK_BYTES];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(Fingerprint::from_hex(hex::encode(hasher.finalize())))
}

/// Compute the catalog identity of a payload
pub fn fingerprint_and_size(payload: &Payload) -> io::Result<(Fingerprint, u64)> {
    match payload {
        Payload::OnDisk(path) => {
            let fingerprint = fingerprint_file(path)?;
            let size = payload.catalog_size()?;
            Ok((fingerprint, size))
        }
        Payload::InMemory {
            bytes,
            declared_size,
        } => Ok((fingerprint_bytes(bytes), *declared_size)),
    }
}
