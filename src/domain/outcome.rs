//! Results of pushing one source through the pipeline.

use std::path::PathBuf;

use serde::Serialize;

use super::record::{FileRecord, Origin};

/// Terminal state of materialization for a record that did not fail
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Materialized {
    /// Content written, verified and committed
    Placed {
        path: PathBuf,
        collision_index: Option<u32>,
    },

    /// Identical content is already placed by another record
    DuplicateSkipped {
        original_id: i64,
        original_path: PathBuf,
    },

    /// This record was placed by an earlier run
    AlreadyPlaced { path: PathBuf },
}

impl Materialized {
    /// Library path holding this content, whichever record owns it
    pub fn library_path(&self) -> &PathBuf {
        match self {
            Self::Placed { path, .. } | Self::AlreadyPlaced { path } => path,
            Self::DuplicateSkipped { original_path, .. } => original_path,
        }
    }
}

/// Everything the driver needs to report about one source
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    /// The record as it stands after the pipeline pass
    pub record: FileRecord,

    /// Whether this pass created the record
    pub newly_registered: bool,

    /// Materialization result
    pub materialized: Materialized,
}

impl SourceOutcome {
    pub fn origin(&self) -> &Origin {
        &self.record.origin
    }
}
