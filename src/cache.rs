use color_eyre::Result;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// History file for accepted filter expressions.
pub const FILTER_HISTORY: &str = "filter_history.txt";
/// History file for search strings.
pub const SEARCH_HISTORY: &str = "search_history.txt";
pub const LOG_FILE: &str = "sdfview.log";

/// Registry of known cache files
const CACHE_FILES: &[&str] = &[FILTER_HISTORY, SEARCH_HISTORY, LOG_FILE];

/// Manages the on-disk cache directory: input histories and the log file.
#[derive(Debug, Clone)]
pub struct CacheManager {
    pub(crate) cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(app_name: &str) -> Result<Self> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| color_eyre::eyre::eyre!("Could not determine cache directory"))?
            .join(app_name);

        Ok(Self { cache_dir })
    }

    /// Use a specific directory (tests, portable installs).
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cache_file(&self, filename: &str) -> PathBuf {
        self.cache_dir.join(filename)
    }

    pub fn ensure_cache_dir(&self) -> Result<()> {
        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir)?;
        }
        Ok(())
    }

    pub fn clear_file(&self, filename: &str) -> Result<()> {
        let file_path = self.cache_file(filename);
        if file_path.exists() {
            fs::remove_file(&file_path)?;
        }
        Ok(())
    }

    /// Removes every registered cache file. Files that cannot be removed are logged
    /// and skipped.
    pub fn clear_all(&self) -> Result<()> {
        for filename in CACHE_FILES {
            let file_path = self.cache_file(filename);
            if file_path.exists() {
                if let Err(e) = fs::remove_file(&file_path) {
                    warn!(file = filename, error = %e, "could not remove cache file");
                    eprintln!("Warning: Could not remove cache file {}: {}", filename, e);
                }
            }
        }
        Ok(())
    }

    /// Entries of a history file, oldest first. A missing file is an empty history.
    pub fn load_history(&self, filename: &str) -> Result<Vec<String>> {
        let history_file = self.cache_file(filename);
        if !history_file.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&history_file)?);
        let mut history = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                history.push(line);
            }
        }
        Ok(history)
    }

    /// Writes the most recent `limit` entries.
    pub fn save_history(&self, filename: &str, history: &[String], limit: usize) -> Result<()> {
        self.ensure_cache_dir()?;
        let mut file = fs::File::create(self.cache_file(filename))?;
        let start = history.len().saturating_sub(limit);
        for entry in &history[start..] {
            writeln!(file, "{}", entry)?;
        }
        Ok(())
    }
}

/// Appends `entry` unless it repeats the most recent one.
pub fn add_to_history(history: &mut Vec<String>, entry: String) {
    if history.last() == Some(&entry) {
        return;
    }
    history.push(entry);
}
