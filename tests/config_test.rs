use clap::Parser;
use sdfview::config::{AppConfig, ConfigManager};
use sdfview::source::LoadOptions;
use sdfview::{Args, FileFormat};
use std::fs;
use tempfile::TempDir;

fn setup_test_config_dir() -> (TempDir, ConfigManager) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_manager = ConfigManager::with_dir(temp_dir.path().to_path_buf());
    (temp_dir, config_manager)
}

#[test]
fn test_default_config() {
    let config = AppConfig::default();
    assert_eq!(config.version, "0.1");
    assert_eq!(config.display.page_size, 20);
    assert_eq!(config.display.page_size_options, vec![10, 20, 50, 100, 200]);
    assert_eq!(config.performance.cache_capacity, 500);
    assert_eq!(config.performance.event_poll_interval_ms, 25);
    assert_eq!(config.dataset.structure_column, "SMILES");
    assert_eq!(config.dataset.search_column, None);
    assert_eq!(config.filter.max_range_columns, 5);
    assert!(config.filter.enable_history);
    assert_eq!(config.filter.history_limit, 1000);
    assert!(!config.debug.enabled);
    assert!(config.validate().is_ok());
}

#[test]
fn test_generate_default_config() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    let template = config_manager.generate_default_config();
    for section in [
        "[file_loading]",
        "[display]",
        "[performance]",
        "[dataset]",
        "[filter]",
        "[debug]",
    ] {
        assert!(template.contains(section), "missing {}", section);
    }
}

#[test]
fn test_write_config_without_force_fails_if_exists() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    let path = config_manager.write_default_config(false).unwrap();
    assert!(path.exists());
    assert!(config_manager.write_default_config(false).is_err());
    assert!(config_manager.write_default_config(true).is_ok());
}

#[test]
fn test_load_config_with_no_file() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    let config = AppConfig::load_from(&config_manager).unwrap();
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_load_partial_user_config() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    config_manager.ensure_config_dir().unwrap();
    fs::write(
        config_manager.config_file(),
        r#"
[display]
page_size = 50

[dataset]
structure_column = "Canonical_SMILES"
search_column = "Name"
"#,
    )
    .unwrap();

    let config = AppConfig::load_from(&config_manager).unwrap();
    assert_eq!(config.display.page_size, 50);
    assert_eq!(config.dataset.structure_column, "Canonical_SMILES");
    assert_eq!(config.dataset.search_column.as_deref(), Some("Name"));
    assert_eq!(config.performance.cache_capacity, 500);
}

#[test]
fn test_invalid_user_config_names_the_file() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    config_manager.ensure_config_dir().unwrap();
    fs::write(
        config_manager.config_file(),
        "[display]\npage_size = 500\n",
    )
    .unwrap();
    let err = AppConfig::load_from(&config_manager).unwrap_err();
    assert!(err.to_string().contains("config.toml"), "got: {}", err);
}

#[test]
fn test_cli_overrides_file() {
    let mut config = AppConfig::default();
    config.display.page_size = 50;
    let args = Args::parse_from([
        "sdfview",
        "mols.csv",
        "--page-size",
        "10",
        "--structure-column",
        "Molblock",
        "--delimiter",
        ";",
        "--format",
        "csv",
        "--debug",
    ]);
    config.apply_args(&args);
    assert_eq!(config.display.page_size, 10);
    assert!(config.debug.enabled);

    let opts = LoadOptions::from_config(&config, args.format);
    assert_eq!(opts.format, Some(FileFormat::Csv));
    assert_eq!(opts.structure_column, "Molblock");
    assert_eq!(opts.delimiter, Some(b';'));
}
