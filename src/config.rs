//! Configuration for mediashelf paths and intake rules.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags (`--library`, `--catalog`)
//! 2. Environment variables (MEDIASHELF_HOME, MEDIASHELF_LIBRARY)
//! 3. Config file (.mediashelf/config.yaml)
//! 4. Defaults (~/.mediashelf)
//!
//! Config file discovery:
//! - Searches current directory and parents for .mediashelf/config.yaml
//! - `paths.home` is relative to the .mediashelf/ directory, the other paths
//!   to the project directory that contains it

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::library::{absolute_root, PlacementSettings, DEFAULT_MAX_COLLISION_ATTEMPTS};

const CONFIG_DIR: &str = ".mediashelf";
const CONFIG_FILE: &str = "config.yaml";

pub const ENV_HOME: &str = "MEDIASHELF_HOME";
pub const ENV_LIBRARY: &str = "MEDIASHELF_LIBRARY";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to .mediashelf/)
    pub home: Option<String>,
    /// Library root (relative to the project directory)
    pub library: Option<String>,
    /// Catalog database file (relative to the project directory)
    pub catalog: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestConfig {
    pub media_extensions: Option<Vec<String>>,
    pub archive_patterns: Option<Vec<String>>,
    pub max_collision_attempts: Option<u32>,
}

/// Intake rules after defaults are applied
#[derive(Debug, Clone, Serialize)]
pub struct IngestSettings {
    /// Lowercase extensions treated as media
    pub media_extensions: Vec<String>,
    /// Glob patterns on file names treated as archives
    pub archive_patterns: Vec<String>,
    /// Collision-resolution bound
    pub max_collision_attempts: u32,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            media_extensions: ["mp3", "flac", "ogg", "m4a", "opus", "wav", "aac", "wma"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            archive_patterns: vec!["*.zip".to_string()],
            max_collision_attempts: DEFAULT_MAX_COLLISION_ATTEMPTS,
        }
    }
}

impl IngestSettings {
    fn from_file(config: &IngestConfig) -> Result<Self> {
        let defaults = Self::default();

        let max_collision_attempts = config
            .max_collision_attempts
            .unwrap_or(defaults.max_collision_attempts);
        if max_collision_attempts < 1 {
            bail!("ingest.max_collision_attempts must be at least 1");
        }

        Ok(Self {
            media_extensions: config
                .media_extensions
                .as_ref()
                .map(|exts| {
                    exts.iter()
                        .map(|e| e.trim_start_matches('.').to_lowercase())
                        .collect()
                })
                .unwrap_or(defaults.media_extensions),
            archive_patterns: config
                .archive_patterns
                .clone()
                .unwrap_or(defaults.archive_patterns),
            max_collision_attempts,
        })
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// Engine state directory
    pub home: PathBuf,
    /// Library root
    pub library: PathBuf,
    /// Catalog database file
    pub catalog: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Intake rules
    pub ingest: IngestSettings,
}

impl ResolvedConfig {
    /// Apply command-line overrides (relative paths resolve against the cwd)
    pub fn with_overrides(mut self, library: Option<PathBuf>, catalog: Option<PathBuf>) -> Self {
        if let Some(library) = library {
            self.library = absolute_root(&library);
        }
        if let Some(catalog) = catalog {
            self.catalog = absolute_root(&catalog);
        }
        self
    }

    /// Placement settings for the materializer
    pub fn placement_settings(&self) -> PlacementSettings {
        PlacementSettings::new(&self.library)
            .with_max_collision_attempts(self.ingest.max_collision_attempts)
    }

    /// Create the library root and pin placement to its canonical path
    pub fn prepare_library(&self) -> Result<PlacementSettings> {
        std::fs::create_dir_all(&self.library)
            .with_context(|| format!("Failed to create library: {}", self.library.display()))?;
        let root = self
            .library
            .canonicalize()
            .with_context(|| format!("Failed to resolve library: {}", self.library.display()))?;

        Ok(PlacementSettings::new(root)
            .with_max_collision_attempts(self.ingest.max_collision_attempts))
    }
}

/// Environment values that override the config file
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub home: Option<PathBuf>,
    pub library: Option<PathBuf>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            home: std::env::var(ENV_HOME).ok().map(PathBuf::from),
            library: std::env::var(ENV_LIBRARY).ok().map(PathBuf::from),
        }
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to a base directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Resolve configuration starting the file search at `start`
pub fn resolve_config(start: &Path, env: &EnvOverrides, default_home: PathBuf) -> Result<ResolvedConfig> {
    let config_file = find_config_file(start);
    let parsed = config_file
        .as_deref()
        .map(load_config_file)
        .transpose()?;

    let (dot_dir, project_dir) = match &config_file {
        Some(path) => {
            let dot_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
            let project_dir = dot_dir.parent().unwrap_or(Path::new(".")).to_path_buf();
            (dot_dir, project_dir)
        }
        None => (PathBuf::from("."), PathBuf::from(".")),
    };
    let paths = parsed.as_ref().map(|c| c.paths.clone()).unwrap_or_default();

    let home = match (&env.home, &paths.home) {
        (Some(home), _) => home.clone(),
        (None, Some(home)) => resolve_path(&dot_dir, home),
        (None, None) => default_home,
    };

    let library = match (&env.library, &paths.library) {
        (Some(library), _) => library.clone(),
        (None, Some(library)) => resolve_path(&project_dir, library),
        (None, None) => home.join("library"),
    };

    let catalog = paths
        .catalog
        .as_deref()
        .map(|c| resolve_path(&project_dir, c))
        .unwrap_or_else(|| home.join("catalog.sqlite3"));

    let ingest = match &parsed {
        Some(c) => IngestSettings::from_file(&c.ingest).with_context(|| {
            format!(
                "Invalid config file: {}",
                config_file.as_deref().unwrap_or(Path::new("?")).display()
            )
        })?,
        None => IngestSettings::default(),
    };

    Ok(ResolvedConfig {
        home: absolute_root(&home),
        library: absolute_root(&library),
        catalog: absolute_root(&catalog),
        config_file,
        ingest,
    })
}

/// Load configuration from all sources for the current process
pub fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    resolve_config(&cwd, &EnvOverrides::from_env(), default_home)
}
