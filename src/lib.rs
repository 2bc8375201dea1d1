//! mediashelf - Content-addressed media intake
//!
//! Pulls media out of scattered exports (loose files, nested directories,
//! zip takeouts) into one library tree, keyed by content so the same song
//! is stored once no matter how many exports carry it.
//!
//! # Architecture
//!
//! Every source goes through the same chain:
//! - Register: find-or-create a catalog record for its origin
//! - Attach metadata: read tags once, normalize, persist
//! - Plan: derive `<artist>/<album>/<disk-track-title>.<ext>` from tags
//! - Materialize: skip known content, resolve collisions, write, verify, commit
//!
//! The SQLite catalog is the only durable state. A library path is recorded
//! only after the written file has been read back and its fingerprint matched,
//! so a crashed run can simply be started again.
//!
//! # Modules
//!
//! - `adapters`: Tag reading (lofty) and zip traversal
//! - `core`: Registrar, MetadataAttacher, Materializer, IngestPipeline
//! - `domain`: Data structures (FileRecord, Origin, TagSet, outcomes)
//! - `ingest`: Input discovery and batch runs
//! - `library`: Catalog, fingerprinting, path planning
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Ingest a directory and a takeout archive
//! mediashelf ingest ~/exports ~/Downloads/takeout-1.zip
//!
//! # Inspect the catalog
//! mediashelf status
//! mediashelf list --unplaced
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;
pub mod library;

// Re-export main types at crate root for convenience
pub use core::{IngestError, IngestPipeline, Source};
pub use domain::{FileRecord, Fingerprint, Materialized, Origin, SourceOutcome, TagSet};
pub use ingest::{IngestReport, IngestRun};
pub use library::{Catalog, CatalogError, PlacementSettings};
