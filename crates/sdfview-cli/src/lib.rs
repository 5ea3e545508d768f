//! Command-line surface of sdfview.
//!
//! Lives in its own crate so `build.rs` can turn [`Args`] into a manpage and the
//! `gen_docs` binary can print the option reference without pulling in polars.

use clap::{CommandFactory, Parser, ValueEnum};
use std::path::{Path, PathBuf};

/// Input formats. Picked from the file extension unless `--format` names one.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FileFormat {
    /// MDL structure-data file (.sdf, .sd, .mol)
    Sdf,
    /// Comma-separated values
    Csv,
    /// Tab-separated values
    Tsv,
}

impl FileFormat {
    /// Detect file format from path extension, looking through a trailing `.gz`.
    /// Returns None when extension is missing or unknown.
    pub fn from_path(path: &Path) -> Option<Self> {
        let inner = if is_gzipped(path) {
            Path::new(path.file_stem()?)
        } else {
            path
        };
        inner
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Parse format from extension string (e.g. "sdf", "csv").
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "sdf" | "sd" | "mol" => Some(Self::Sdf),
            "csv" => Some(Self::Csv),
            "tsv" | "tab" => Some(Self::Tsv),
            _ => None,
        }
    }

    /// Field separator for delimited formats.
    pub fn separator(&self) -> Option<u8> {
        match self {
            Self::Sdf => None,
            Self::Csv => Some(b','),
            Self::Tsv => Some(b'\t'),
        }
    }
}

/// True when the path ends in `.gz`.
pub fn is_gzipped(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

/// Command-line arguments for sdfview
#[derive(Clone, Parser, Debug)]
#[command(
    name = "sdfview",
    version,
    about = "Browse SDF/CSV molecule tables in the terminal",
    long_about = "Browse SDF/CSV molecule tables in the terminal.\n\nRows can be narrowed with a small filter language (comparisons joined by and/or/not), a substring search and numeric ranges. Each row's structure is drawn as an SVG and cached, and pages can be printed as JSON or exported as HTML."
)]
pub struct Args {
    /// Path to the SDF, CSV or TSV file to open (optionally gzip-compressed).
    /// Not required with --generate-config or --clear-cache
    #[arg(required_unless_present_any = ["generate_config", "clear_cache"], value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Force file format (sdf, csv, tsv). By default format is detected from the file extension.
    #[arg(long = "format", value_enum)]
    pub format: Option<FileFormat>,

    /// Field delimiter for delimited text files (overrides the format default)
    #[arg(long = "delimiter", value_name = "CHAR")]
    pub delimiter: Option<char>,

    /// Number of rows to use when inferring CSV column types (default: 1000)
    #[arg(long = "infer-schema-length", value_name = "N")]
    pub infer_schema_length: Option<usize>,

    /// Column holding the structure encoding (SMILES or molblock). Default: SMILES
    #[arg(long = "structure-column", value_name = "COLUMN")]
    pub structure_column: Option<String>,

    /// Column searched by --search and the interactive search box. Default: the structure column
    #[arg(long = "search-column", value_name = "COLUMN")]
    pub search_column: Option<String>,

    /// Filter expression, e.g. "MW > 300 & LogP < 5"
    #[arg(long = "filter", value_name = "EXPR")]
    pub filter: Option<String>,

    /// Case-insensitive substring to look for in the search column
    #[arg(long = "search", value_name = "TEXT")]
    pub search: Option<String>,

    /// Inclusive numeric range filter. Use once per column. Example: --range MW:100:500
    #[arg(long = "range", value_name = "COL:MIN:MAX")]
    pub range: Vec<String>,

    /// Page to show (1-based; out-of-range pages are clamped)
    #[arg(long = "page", value_name = "N")]
    pub page: Option<usize>,

    /// Rows per page, 1-200 (default: 20)
    #[arg(long = "page-size", value_name = "N")]
    pub page_size: Option<usize>,

    /// Number of rendered structures to keep in memory (default: 500)
    #[arg(long = "cache-capacity", value_name = "N")]
    pub cache_capacity: Option<usize>,

    /// Print the selected page as JSON and exit
    #[arg(long = "print", action)]
    pub print: bool,

    /// Write the selected page as an HTML table and exit
    #[arg(long = "export-html", value_name = "FILE")]
    pub export_html: Option<PathBuf>,

    /// Print render cache statistics after printing or exporting
    #[arg(long = "stats", action)]
    pub stats: bool,

    /// Enable debug mode to show operational information
    #[arg(long = "debug", action)]
    pub debug: bool,

    /// Clear all cache data and exit
    #[arg(long = "clear-cache", action)]
    pub clear_cache: bool,

    /// Generate default configuration file at ~/.config/sdfview/config.toml
    #[arg(long = "generate-config", action)]
    pub generate_config: bool,

    /// Force overwrite existing config file when using --generate-config
    #[arg(long = "force", requires = "generate_config", action)]
    pub force: bool,
}

impl Args {
    /// Whether the run produces output and exits instead of opening the TUI.
    pub fn is_batch(&self) -> bool {
        self.print || self.export_html.is_some()
    }
}

fn markdown_cell(s: &str) -> String {
    s.replace('|', "\\|").replace(['\n', '\r'], " ")
}

fn value_placeholder(arg: &clap::Arg) -> String {
    arg.get_value_names()
        .unwrap_or_default()
        .iter()
        .map(|n| format!("<{}>", n.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `-s, --long <VALUE>` for flags, `PATH` or `[PATH]` for positionals.
fn option_label(arg: &clap::Arg) -> String {
    let placeholder = value_placeholder(arg);
    if arg.is_positional() {
        return if arg.is_required_set() {
            placeholder
        } else {
            format!("[{}]", placeholder)
        };
    }
    let names: Vec<String> = arg
        .get_short()
        .map(|s| format!("-{}", s))
        .into_iter()
        .chain(arg.get_long().map(|l| format!("--{}", l)))
        .collect();
    let mut label = names.join(", ");
    if arg.get_action().takes_values() && !placeholder.is_empty() {
        label.push(' ');
        label.push_str(&placeholder);
    }
    label
}

/// Markdown reference of every command-line option, as printed by `gen_docs`.
pub fn render_options_markdown() -> String {
    let mut cmd = Args::command();
    cmd.build();

    let rows: Vec<String> = cmd
        .get_arguments()
        .filter(|arg| !matches!(arg.get_id().as_str(), "help" | "version"))
        .map(|arg| {
            let help = arg
                .get_help()
                .map(|h| markdown_cell(&h.to_string()))
                .unwrap_or_else(|| "-".to_string());
            let default = arg
                .get_default_values()
                .iter()
                .map(|v| v.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            format!("| `{}` | {} | {} |", option_label(arg), help, markdown_cell(&default))
        })
        .collect();

    format!(
        "# sdfview command line\n\n```\n{}\n```\n\n| Option | Description | Default |\n|---|---|---|\n{}\n",
        cmd.render_usage(),
        rows.join("\n")
    )
}
