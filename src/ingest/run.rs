//! A single intake run over discovered inputs.
//!
//! Sources are processed strictly one after another. A failing source is
//! recorded in the report and the run moves on to the next one.

use serde::Serialize;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::adapters::ZipEntries;
use crate::core::{IngestPipeline, Source};
use crate::domain::{Materialized, SourceOutcome};

use super::discover::{InputItem, SourceFilter};

/// A source that could not be processed
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SourceFailure {
    /// Origin as displayed (`path` or `archive!entry`)
    pub origin: String,
    pub error: String,
}

/// Summary of one run
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    /// Sources handed to the pipeline
    pub sources: usize,
    /// Records created by this run
    pub registered: usize,
    pub placed: usize,
    pub duplicates: usize,
    pub already_placed: usize,
    pub failed: usize,
    /// Archive members that were not media
    pub skipped_entries: usize,
    pub failures: Vec<SourceFailure>,
}

impl IngestReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            sources: 0,
            registered: 0,
            placed: 0,
            duplicates: 0,
            already_placed: 0,
            failed: 0,
            skipped_entries: 0,
            failures: Vec::new(),
        }
    }

    fn record_outcome(&mut self, outcome: &SourceOutcome) {
        if outcome.newly_registered {
            self.registered += 1;
        }
        match outcome.materialized {
            Materialized::Placed { .. } => self.placed += 1,
            Materialized::DuplicateSkipped { .. } => self.duplicates += 1,
            Materialized::AlreadyPlaced { .. } => self.already_placed += 1,
        }
    }

    fn record_failure(&mut self, origin: impl ToString, error: impl ToString) {
        self.failed += 1;
        self.failures.push(SourceFailure {
            origin: origin.to_string(),
            error: error.to_string(),
        });
    }

    /// True when nothing failed
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Drives the pipeline over a list of inputs
pub struct IngestRun<'c> {
    run_id: Uuid,
    pipeline: IngestPipeline<'c>,
    filter: &'c SourceFilter,
}

impl<'c> IngestRun<'c> {
    pub fn new(pipeline: IngestPipeline<'c>, filter: &'c SourceFilter) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline,
            filter,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Process every input and return the run summary
    pub fn execute(&self, inputs: &[InputItem]) -> IngestReport {
        let span = info_span!("ingest", run_id = %self.run_id);
        let _guard = span.enter();

        info!(inputs = inputs.len(), "Starting ingest run");
        let mut report = IngestReport::new(self.run_id);

        for item in inputs {
            match item {
                InputItem::Media(path) => {
                    self.process(&Source::file(path.clone()), &mut report);
                }
                InputItem::Archive(path) => self.process_archive(path, &mut report),
            }
        }

        info!(
            sources = report.sources,
            placed = report.placed,
            duplicates = report.duplicates,
            already_placed = report.already_placed,
            failed = report.failed,
            "Ingest run finished"
        );
        report
    }

    fn process(&self, source: &Source, report: &mut IngestReport) {
        report.sources += 1;
        match self.pipeline.ingest(source) {
            Ok(outcome) => report.record_outcome(&outcome),
            Err(e) => report.record_failure(&source.origin, e),
        }
    }

    fn process_archive(&self, path: &std::path::Path, report: &mut IngestReport) {
        let filter = self.filter;
        let mut entries = match ZipEntries::open(path, |name: &str| filter.is_media(name)) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(archive = %path.display(), error = %e, "Cannot open archive");
                report.record_failure(path.display(), e);
                return;
            }
        };

        for entry in entries.by_ref() {
            match entry {
                Ok(entry) => {
                    let source =
                        Source::archive_entry(path, entry.name, entry.bytes, entry.declared_size);
                    self.process(&source, report);
                }
                Err(e) => {
                    warn!(archive = %path.display(), error = %e, "Cannot read archive entry");
                    report.record_failure(path.display(), e);
                }
            }
        }

        report.skipped_entries += entries.skipped();
    }
}
