//! Batch intake of scattered media exports.
//!
//! ```text
//! paths ─► discover ─► [media file | zip archive ─► entries] ─► IngestPipeline
//!                                                                     │
//!                                                               IngestReport
//! ```

pub mod discover;
pub mod run;

// Re-export key types
pub use discover::{discover, DiscoverError, InputItem, SourceFilter};
pub use run::{IngestReport, IngestRun, SourceFailure};
