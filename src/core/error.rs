//! Per-source failures.
//!
//! Every variant aborts only the source being processed; the driver logs it
//! and moves on to the next source.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::Origin;
use crate::library::CatalogError;

/// Errors that abort processing of one source
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Source unavailable: {origin}: {source}")]
    SourceUnavailable {
        origin: Origin,
        #[source]
        source: std::io::Error,
    },

    #[error("No free destination after {attempts} attempts (last tried {last_candidate})")]
    CollisionStormExceeded {
        attempts: u32,
        last_candidate: PathBuf,
    },

    #[error("Write verification failed for {path}: {reason}")]
    WriteVerificationFailed { path: PathBuf, reason: String },

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl IngestError {
    pub fn source_unavailable(origin: &Origin, source: std::io::Error) -> Self {
        Self::SourceUnavailable {
            origin: origin.clone(),
            source,
        }
    }
}
