//! The catalog and the library tree it describes.
//!
//! # Storage Layout
//!
//! ```text
//! ~/.mediashelf/
//! ├── catalog.sqlite3           # One row per source ever seen
//! ├── catalog.sqlite3.lock      # Held while an ingest run is active
//! └── library/
//!     └── <artist>/
//!         └── <album>[-disk-N]/
//!             └── [NN-]<title>[-K].<ext>
//! ```

pub mod catalog;
pub mod identity;
pub mod placement;

pub use catalog::{Catalog, CatalogError, CatalogLock, CatalogStats, NewRecord, RecordFilter};
pub use identity::{fingerprint_and_size, fingerprint_bytes, fingerprint_file, Payload};
pub use placement::{absolute_root, plan_path, PlacementSettings, DEFAULT_MAX_COLLISION_ATTEMPTS, UNKNOWN};
