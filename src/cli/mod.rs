//! Command-line interface for mediashelf.
//!
//! Provides commands for ingesting exports, inspecting the catalog,
//! and showing the resolved configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::LoftyTagExtractor;
use crate::config::{self, ResolvedConfig};
use crate::core::{AtomicWriter, IngestPipeline};
use crate::domain::FileRecord;
use crate::ingest::{discover, IngestReport, IngestRun, SourceFilter};
use crate::library::{Catalog, CatalogError, CatalogLock, RecordFilter};

const RULE: &str = "════════════════════════════════════════════════════════════════";

/// mediashelf - Content-addressed media intake
#[derive(Parser, Debug)]
#[command(name = "mediashelf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Library root (overrides config and MEDIASHELF_LIBRARY)
    #[arg(long, global = true)]
    pub library: Option<PathBuf>,

    /// Catalog database file
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest media files, directories and zip exports
    Ingest {
        /// Files or directories to scan
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Show catalog statistics
    Status,

    /// List catalog records, newest first
    List {
        /// Maximum number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Only records without a library path
        #[arg(long)]
        unplaced: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one catalog record
    Show {
        /// Record ID
        id: i64,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let cfg = config::load_config()?.with_overrides(self.library, self.catalog);

        match self.command {
            Commands::Ingest { paths } => ingest(&cfg, &paths),
            Commands::Status => show_status(&cfg),
            Commands::List {
                limit,
                unplaced,
                json,
            } => list_records(&cfg, limit, unplaced, json),
            Commands::Show { id, json } => show_record(&cfg, id, json),
            Commands::Config => show_config(&cfg),
        }
    }
}

fn open_catalog(cfg: &ResolvedConfig) -> Result<Catalog> {
    Catalog::open(&cfg.catalog)
        .with_context(|| format!("Failed to open catalog: {}", cfg.catalog.display()))
}

/// Run an ingest over the given paths.
///
/// Per-source failures are reported but do not change the exit status.
fn ingest(cfg: &ResolvedConfig, paths: &[PathBuf]) -> Result<()> {
    let filter = SourceFilter::from_settings(&cfg.ingest)?;
    let inputs = discover(paths, &filter)?;

    if inputs.is_empty() {
        println!("No media files or archives found.");
        return Ok(());
    }

    let _lock = CatalogLock::acquire(&cfg.catalog).map_err(|e| match e {
        CatalogError::Locked(_) => anyhow::anyhow!("Another ingest is running: {}", e),
        other => anyhow::Error::new(other),
    })?;

    let catalog = open_catalog(cfg)?;
    let settings = cfg.prepare_library()?;
    let extractor = LoftyTagExtractor;
    let writer = AtomicWriter;

    let pipeline = IngestPipeline::new(&catalog, &extractor, &writer, &settings);
    let run = IngestRun::new(pipeline, &filter);

    println!(
        "Ingesting {} input(s) into {}",
        inputs.len(),
        settings.library_root.display()
    );
    let report = run.execute(&inputs);
    print_report(&report);

    Ok(())
}

fn print_report(report: &IngestReport) {
    println!();
    println!("{}", RULE);
    println!("  Run:              {}", report.run_id);
    println!("  Sources:          {}", report.sources);
    println!("  New records:      {}", report.registered);
    println!("  Placed:           {}", report.placed);
    println!("  Duplicates:       {}", report.duplicates);
    println!("  Already placed:   {}", report.already_placed);
    println!("  Skipped entries:  {}", report.skipped_entries);
    println!("  Failed:           {}", report.failed);
    println!("{}", RULE);

    if !report.failures.is_empty() {
        eprintln!("\nFailures:");
        for failure in &report.failures {
            eprintln!("  {}: {}", failure.origin, failure.error);
        }
    }
}

fn show_status(cfg: &ResolvedConfig) -> Result<()> {
    let catalog = open_catalog(cfg)?;
    let stats = catalog.stats()?;

    println!("Catalog: {}", cfg.catalog.display());
    println!("Library: {}", cfg.library.display());
    println!();
    println!("  Records:        {}", stats.records);
    println!("  With metadata:  {}", stats.tagged);
    println!("  Placed:         {}", stats.placed);
    println!("  Unplaced:       {}", stats.unplaced);
    println!("  From archives:  {}", stats.from_archives);
    println!("  Placed bytes:   {}", stats.placed_bytes);

    Ok(())
}

fn list_records(cfg: &ResolvedConfig, limit: usize, unplaced: bool, json: bool) -> Result<()> {
    let catalog = open_catalog(cfg)?;
    let filter = if unplaced {
        RecordFilter::Unplaced
    } else {
        RecordFilter::All
    };
    let records = catalog.list(filter, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("Catalog is empty. Use 'mediashelf ingest <path>' to add media.");
        return Ok(());
    }

    println!("{:<8} {:<14} {:<11} {:<50}", "ID", "FINGERPRINT", "STAGE", "ORIGIN");
    println!("{}", "-".repeat(86));

    for record in &records {
        println!(
            "{:<8} {:<14} {:<11} {:<50}",
            record.id,
            record.fingerprint.short(),
            record.stage().to_string(),
            truncate(&record.origin.to_string(), 50)
        );
    }

    println!("\nShown: {} records", records.len());

    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let head: String = text.chars().take(width - 3).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

fn show_record(cfg: &ResolvedConfig, id: i64, json: bool) -> Result<()> {
    let catalog = open_catalog(cfg)?;
    let record = catalog.get(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_record(&record);
    }

    Ok(())
}

fn print_record(record: &FileRecord) {
    let tags = record.tags_or_default();
    let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    let show_num = |value: Option<u32>| value.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());

    println!("{}", RULE);
    println!("  ID:          {}", record.id);
    println!("  Stage:       {}", record.stage());
    println!("  Fingerprint: {}", record.fingerprint);
    println!("  Size:        {} bytes", record.size);
    println!("  Origin:      {}", record.origin);
    println!(
        "  Library:     {}",
        record
            .destination
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not placed)".to_string())
    );
    println!("  Registered:  {}", record.created_at);
    if let Some(placed_at) = record.placed_at {
        println!("  Placed:      {}", placed_at);
    }
    println!("{}", RULE);

    if record.has_metadata() {
        println!("  Artist: {}", show(&tags.artist));
        println!("  Album:  {}", show(&tags.album));
        println!("  Title:  {}", show(&tags.title));
        println!("  Disk:   {}", show_num(tags.disk));
        println!("  Track:  {}", show_num(tags.track));
    } else {
        println!("  (no metadata yet)");
    }
}

fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("{}", RULE);
    println!("  mediashelf Configuration");
    println!("{}", RULE);
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Library:  {}", cfg.library.display());
    println!("  Catalog:  {}", cfg.catalog.display());
    println!();
    println!("Ingest:");
    println!("  Media extensions:       {}", cfg.ingest.media_extensions.join(", "));
    println!("  Archive patterns:       {}", cfg.ingest.archive_patterns.join(", "));
    println!("  Max collision attempts: {}", cfg.ingest.max_collision_attempts);

    Ok(())
}
