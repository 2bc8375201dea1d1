//! Core intake logic.
//!
//! This module contains:
//! - Registrar: Find-or-create catalog records by origin
//! - MetadataAttacher: One-time tag extraction per record
//! - Materializer: Dedup, collision resolution, write, verify, commit
//! - IngestPipeline: Chains the above for one source

pub mod error;
pub mod materializer;
pub mod metadata;
pub mod pipeline;
pub mod registrar;

// Re-export commonly used types
pub use error::IngestError;
pub use materializer::{AtomicWriter, ContentWriter, Materializer};
pub use metadata::MetadataAttacher;
pub use pipeline::{IngestPipeline, Source};
pub use registrar::{Registrar, Registration};
