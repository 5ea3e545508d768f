//! File logging through `tracing`.
//!
//! The TUI owns the terminal, so events go to `<cache dir>/sdfview.log` rather than
//! stderr. `SDFVIEW_LOG` overrides the configured level with a full filter
//! directive (e.g. `SDFVIEW_LOG=sdfview::render_cache=trace`).

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::LOG_FILE;
use crate::config::AppConfig;

pub const LOG_ENV_VAR: &str = "SDFVIEW_LOG";

/// Level used when neither the environment nor `--debug` says otherwise.
pub fn effective_level(config: &AppConfig) -> &str {
    if config.debug.enabled {
        "debug"
    } else {
        config.debug.log_level.as_str()
    }
}

fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,sdfview={level},sdfview_cli={level}"))
    })
}

/// Installs the global subscriber writing to `cache_dir/sdfview.log`.
///
/// Returns the log path, or `None` when the file cannot be opened or a subscriber
/// is already installed. Logging problems never stop the application.
pub fn init(config: &AppConfig, cache_dir: &Path) -> Option<PathBuf> {
    if std::fs::create_dir_all(cache_dir).is_err() {
        return None;
    }
    let path = cache_dir.join(LOG_FILE);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .ok()?;

    let layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(build_env_filter(effective_level(config)))
        .with(layer)
        .try_init()
        .ok()?;
    Some(path)
}
