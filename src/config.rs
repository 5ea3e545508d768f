use color_eyre::eyre::eyre;
use color_eyre::Result;
use sdfview_cli::Args;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::dataset::DEFAULT_STRUCTURE_COLUMN;
use crate::paginator::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::render_cache::DEFAULT_CACHE_CAPACITY;

const CONFIG_FILE: &str = "config.toml";
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Location of `config.toml`: `<config dir>/sdfview/` by default, or any directory
/// handed to [`ConfigManager::with_dir`].
#[derive(Debug, Clone)]
pub struct ConfigManager {
    dir: PathBuf,
}

impl ConfigManager {
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn new(app_name: &str) -> Result<Self> {
        let base = dirs::config_dir()
            .ok_or_else(|| eyre!("No configuration directory available on this system"))?;
        Ok(Self::with_dir(base.join(app_name)))
    }

    pub fn config_dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// The user config file, whether or not it exists yet.
    pub fn config_file(&self) -> PathBuf {
        self.config_path(CONFIG_FILE)
    }

    pub fn ensure_config_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            eyre!(
                "Could not create config directory {}: {}",
                self.dir.display(),
                e
            )
        })
    }

    /// The commented template written by `--generate-config`.
    pub fn generate_default_config(&self) -> String {
        DEFAULT_CONFIG_TEMPLATE.to_string()
    }

    /// Writes the template to [`Self::config_file`]. An existing file is only replaced
    /// with `force`.
    pub fn write_default_config(&self, force: bool) -> Result<PathBuf> {
        let target = self.config_file();
        if target.exists() && !force {
            return Err(eyre!(
                "{} already exists; pass --force to replace it",
                target.display()
            ));
        }
        self.ensure_config_dir()?;
        std::fs::write(&target, DEFAULT_CONFIG_TEMPLATE)
            .map_err(|e| eyre!("Could not write {}: {}", target.display(), e))?;
        Ok(target)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration format version (for future compatibility)
    pub version: String,
    pub file_loading: FileLoadingConfig,
    pub display: DisplayConfig,
    pub performance: PerformanceConfig,
    pub dataset: DatasetConfig,
    pub filter: FilterConfig,
    pub debug: DebugConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileLoadingConfig {
    pub delimiter: Option<char>,
    pub infer_schema_length: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub page_size: usize,
    pub page_size_options: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub cache_capacity: usize,
    pub event_poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub structure_column: String,
    pub search_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub max_range_columns: usize,
    pub enable_history: bool,
    pub history_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            file_loading: FileLoadingConfig::default(),
            display: DisplayConfig::default(),
            performance: PerformanceConfig::default(),
            dataset: DatasetConfig::default(),
            filter: FilterConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_size_options: vec![10, 20, 50, 100, 200],
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            event_poll_interval_ms: 25,
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            structure_column: DEFAULT_STRUCTURE_COLUMN.to_string(),
            search_column: None,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_range_columns: 5,
            enable_history: true,
            history_limit: 1000,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_level: "info".to_string(),
        }
    }
}

// Configuration loading and merging
impl AppConfig {
    /// Load configuration from all layers (default → user)
    pub fn load(app_name: &str) -> Result<Self> {
        let manager = ConfigManager::new(app_name)?;
        Self::load_from(&manager)
    }

    /// Load defaults merged with the config file managed by `manager`, if any.
    pub fn load_from(manager: &ConfigManager) -> Result<Self> {
        let mut config = AppConfig::default();
        config.merge(Self::load_user_config(manager)?);
        config.validate()?;
        Ok(config)
    }

    fn load_user_config(manager: &ConfigManager) -> Result<AppConfig> {
        let config_path = manager.config_file();

        if !config_path.exists() {
            return Ok(AppConfig::default());
        }

        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            eyre!(
                "Failed to read config file at {}: {}",
                config_path.display(),
                e
            )
        })?;

        toml::from_str(&content).map_err(|e| {
            eyre!(
                "Failed to parse config file at {}: {}",
                config_path.display(),
                e
            )
        })
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: AppConfig) {
        if other.version != AppConfig::default().version {
            self.version = other.version;
        }

        self.file_loading.merge(other.file_loading);
        self.display.merge(other.display);
        self.performance.merge(other.performance);
        self.dataset.merge(other.dataset);
        self.filter.merge(other.filter);
        self.debug.merge(other.debug);
    }

    /// Apply command-line overrides (CLI takes precedence over the file)
    pub fn apply_args(&mut self, args: &Args) {
        if args.delimiter.is_some() {
            self.file_loading.delimiter = args.delimiter;
        }
        if args.infer_schema_length.is_some() {
            self.file_loading.infer_schema_length = args.infer_schema_length;
        }
        if let Some(page_size) = args.page_size {
            self.display.page_size = page_size;
        }
        if let Some(capacity) = args.cache_capacity {
            self.performance.cache_capacity = capacity;
        }
        if let Some(column) = &args.structure_column {
            self.dataset.structure_column = column.clone();
        }
        if args.search_column.is_some() {
            self.dataset.search_column = args.search_column.clone();
        }
        if args.debug {
            self.debug.enabled = true;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.version.starts_with("0.1") {
            return Err(eyre!(
                "Unsupported config version: {}. Expected 0.1.x in {}",
                self.version,
                CONFIG_FILE
            ));
        }

        let page_sizes = 1..=MAX_PAGE_SIZE;
        if !page_sizes.contains(&self.display.page_size) {
            return Err(eyre!(
                "display.page_size must be between 1 and {} (got {}) in {}",
                MAX_PAGE_SIZE,
                self.display.page_size,
                CONFIG_FILE
            ));
        }
        if self.display.page_size_options.is_empty() {
            return Err(eyre!(
                "display.page_size_options must not be empty in {}",
                CONFIG_FILE
            ));
        }
        if let Some(bad) = self
            .display
            .page_size_options
            .iter()
            .find(|&&s| !page_sizes.contains(&s))
        {
            return Err(eyre!(
                "display.page_size_options entries must be between 1 and {} (got {}) in {}",
                MAX_PAGE_SIZE,
                bad,
                CONFIG_FILE
            ));
        }

        if self.performance.cache_capacity == 0 {
            return Err(eyre!(
                "performance.cache_capacity must be greater than 0 in {}",
                CONFIG_FILE
            ));
        }
        if self.performance.event_poll_interval_ms == 0 {
            return Err(eyre!(
                "performance.event_poll_interval_ms must be greater than 0 in {}",
                CONFIG_FILE
            ));
        }

        if self.dataset.structure_column.trim().is_empty() {
            return Err(eyre!(
                "dataset.structure_column must not be empty in {}",
                CONFIG_FILE
            ));
        }

        if !LOG_LEVELS.contains(&self.debug.log_level.to_lowercase().as_str()) {
            return Err(eyre!(
                "Invalid debug.log_level: {}. Must be one of {} in {}",
                self.debug.log_level,
                LOG_LEVELS.join(", "),
                CONFIG_FILE
            ));
        }

        Ok(())
    }

    /// Next configured page size after `current`, wrapping around.
    pub fn next_page_size(&self, current: usize) -> usize {
        let options = &self.display.page_size_options;
        options
            .iter()
            .copied()
            .find(|&s| s > current)
            .or_else(|| options.first().copied())
            .unwrap_or(current)
    }

    /// Previous configured page size before `current`, wrapping around.
    pub fn prev_page_size(&self, current: usize) -> usize {
        let options = &self.display.page_size_options;
        options
            .iter()
            .rev()
            .copied()
            .find(|&s| s < current)
            .or_else(|| options.last().copied())
            .unwrap_or(current)
    }
}

// Merge implementations for each config section
impl FileLoadingConfig {
    pub fn merge(&mut self, other: Self) {
        if other.delimiter.is_some() {
            self.delimiter = other.delimiter;
        }
        if other.infer_schema_length.is_some() {
            self.infer_schema_length = other.infer_schema_length;
        }
    }
}

impl DisplayConfig {
    pub fn merge(&mut self, other: Self) {
        let default = DisplayConfig::default();
        if other.page_size != default.page_size {
            self.page_size = other.page_size;
        }
        if other.page_size_options != default.page_size_options {
            let mut options = other.page_size_options;
            options.sort_unstable();
            options.dedup();
            self.page_size_options = options;
        }
    }
}

impl PerformanceConfig {
    pub fn merge(&mut self, other: Self) {
        let default = PerformanceConfig::default();
        if other.cache_capacity != default.cache_capacity {
            self.cache_capacity = other.cache_capacity;
        }
        if other.event_poll_interval_ms != default.event_poll_interval_ms {
            self.event_poll_interval_ms = other.event_poll_interval_ms;
        }
    }
}

impl DatasetConfig {
    pub fn merge(&mut self, other: Self) {
        let default = DatasetConfig::default();
        if other.structure_column != default.structure_column {
            self.structure_column = other.structure_column;
        }
        if other.search_column.is_some() {
            self.search_column = other.search_column;
        }
    }
}

impl FilterConfig {
    pub fn merge(&mut self, other: Self) {
        let default = FilterConfig::default();
        if other.max_range_columns != default.max_range_columns {
            self.max_range_columns = other.max_range_columns;
        }
        if other.enable_history != default.enable_history {
            self.enable_history = other.enable_history;
        }
        if other.history_limit != default.history_limit {
            self.history_limit = other.history_limit;
        }
    }
}

impl DebugConfig {
    pub fn merge(&mut self, other: Self) {
        let default = DebugConfig::default();
        if other.enabled != default.enabled {
            self.enabled = other.enabled;
        }
        if other.log_level != default.log_level {
            self.log_level = other.log_level;
        }
    }
}

const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../config/default.toml");
