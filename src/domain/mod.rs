//! Domain types for mediashelf.
//!
//! This module contains the core data structures:
//! - FileRecord: One catalog row per distinct origin
//! - Origin: Standalone path or archive member
//! - Materialized: What happened when a record was placed

pub mod outcome;
pub mod record;

// Re-export commonly used types
pub use outcome::{Materialized, SourceOutcome};
pub use record::{FileRecord, Fingerprint, Origin, RecordStage, TagSet, METADATA_VERSION};
