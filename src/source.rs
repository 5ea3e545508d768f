//! Loading SDF and CSV/TSV files into a [`Dataset`].
//!
//! Any failure here is a [`DatasetError`]: the caller gets either a complete
//! dataset with its structure column in place, or nothing.

use polars::prelude::*;
use sdfview_cli::{is_gzipped, FileFormat};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::dataset::{Column, ColumnType, Dataset, Record, Schema, Value, DEFAULT_STRUCTURE_COLUMN};
use crate::error::DatasetError;

/// Column added for the SDF title line.
pub const TITLE_COLUMN: &str = "Name";
/// Column added for the connection table when a record carries no SMILES item.
pub const MOLBLOCK_COLUMN: &str = "Molblock";

const SDF_RECORD_END: &str = "$$$$";

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    pub format: Option<FileFormat>,
    pub structure_column: String,
    pub delimiter: Option<u8>,
    pub has_header: bool,
    pub infer_schema_length: Option<usize>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            format: None,
            structure_column: DEFAULT_STRUCTURE_COLUMN.to_string(),
            delimiter: None,
            has_header: true,
            infer_schema_length: Some(1000),
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_structure_column(mut self, column: impl Into<String>) -> Self {
        self.structure_column = column.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Options from the merged configuration (CLI overrides already applied) plus
    /// the `--format` flag.
    pub fn from_config(config: &AppConfig, format: Option<FileFormat>) -> Self {
        let mut opts = LoadOptions::new();
        opts.format = format;
        opts.structure_column = config.dataset.structure_column.clone();
        opts.delimiter = config
            .file_loading
            .delimiter
            .and_then(|c| u8::try_from(c).ok());
        if config.file_loading.infer_schema_length.is_some() {
            opts.infer_schema_length = config.file_loading.infer_schema_length;
        }
        opts
    }
}

fn io_error(path: &Path, source: std::io::Error) -> DatasetError {
    DatasetError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Reads the whole file, gunzipping when the name ends in `.gz`.
fn read_bytes(path: &Path) -> Result<Vec<u8>, DatasetError> {
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    let mut reader: Box<dyn Read> = if is_gzipped(path) {
        Box::new(flate2::read::GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| io_error(path, e))?;
    Ok(bytes)
}

/// Loads `path` according to `options`, detecting the format from the extension
/// unless one is forced.
pub fn load(path: &Path, options: &LoadOptions) -> Result<Dataset, DatasetError> {
    let format = options
        .format
        .or_else(|| FileFormat::from_path(path))
        .ok_or_else(|| DatasetError::UnsupportedFormat(path.to_path_buf()))?;
    let bytes = read_bytes(path)?;
    debug!(path = %path.display(), bytes = bytes.len(), ?format, "read input file");

    let dataset = match format {
        FileFormat::Sdf => parse_sdf(&String::from_utf8_lossy(&bytes), options, path)?,
        FileFormat::Csv | FileFormat::Tsv => {
            let separator = options
                .delimiter
                .or(format.separator())
                .unwrap_or(b',');
            read_delimited(bytes, separator, options, path)?
        }
    };
    info!(
        path = %path.display(),
        rows = dataset.len(),
        columns = dataset.schema().len(),
        "dataset loaded"
    );
    Ok(dataset)
}

/// Delimited text through the polars CSV reader.
pub fn read_delimited(
    bytes: Vec<u8>,
    separator: u8,
    options: &LoadOptions,
    source: &Path,
) -> Result<Dataset, DatasetError> {
    let mut read_options = CsvReadOptions::default();
    read_options.has_header = options.has_header;
    read_options.infer_schema_length = options.infer_schema_length;
    read_options = read_options.map_parse_options(|opts| opts.with_separator(separator));
    let df = CsvReader::new(std::io::Cursor::new(bytes))
        .with_options(read_options)
        .finish()?;
    if df.height() == 0 {
        return Err(DatasetError::Empty(source.to_path_buf()));
    }
    dataframe_to_dataset(&df, &options.structure_column)
}

/// Converts a polars frame: numeric dtypes become numeric columns, everything else
/// is cast to text. Nulls stay null.
pub fn dataframe_to_dataset(df: &DataFrame, structure_column: &str) -> Result<Dataset, DatasetError> {
    let mut columns = Vec::with_capacity(df.width());
    let mut cells: Vec<Vec<Value>> = Vec::with_capacity(df.width());

    for column in df.get_columns() {
        let name = column.name().to_string();
        let series = column.as_materialized_series();
        if series.dtype().is_numeric() {
            let cast = series.cast(&DataType::Float64)?;
            let values = cast
                .f64()?
                .into_iter()
                .map(|v| v.map(Value::Number).unwrap_or(Value::Null))
                .collect();
            columns.push(Column::new(name, ColumnType::Numeric));
            cells.push(values);
        } else {
            let cast = series.cast(&DataType::String)?;
            let values = cast
                .str()?
                .into_iter()
                .map(|v| v.map(|s| Value::Text(s.to_string())).unwrap_or(Value::Null))
                .collect();
            columns.push(Column::new(name, ColumnType::Text));
            cells.push(values);
        }
    }

    let schema = Schema::new(columns, structure_column)?;
    let records = (0..df.height())
        .map(|row| Record::new(cells.iter().map(|col| col[row].clone()).collect()))
        .collect();
    Dataset::new(schema, records)
}

struct SdfRecord {
    title: String,
    molblock: String,
    items: Vec<(String, String)>,
}

/// Extracts `Name` from a data header such as `>  <Name>  (1)`.
fn data_item_name(line: &str) -> Option<&str> {
    let start = line.find('<')? + 1;
    let end = line[start..].find('>')? + start;
    Some(line[start..end].trim())
}

fn parse_sdf_record(lines: &[&str], number: usize) -> Result<SdfRecord, DatasetError> {
    let header_end = lines
        .iter()
        .position(|l| l.starts_with('>'))
        .unwrap_or(lines.len());
    let molblock_end = lines[..header_end]
        .iter()
        .position(|l| l.trim_end() == "M  END")
        .map(|i| i + 1)
        .unwrap_or(header_end);
    if molblock_end < 4 {
        return Err(DatasetError::Sdf {
            record: number,
            message: "molblock is shorter than its four header lines".to_string(),
        });
    }
    let molblock = lines[..molblock_end].join("\n");
    let title = lines[0].trim().to_string();

    let mut items = Vec::new();
    let mut i = header_end;
    while i < lines.len() {
        let line = lines[i];
        if !line.starts_with('>') {
            i += 1;
            continue;
        }
        let name = data_item_name(line).ok_or_else(|| DatasetError::Sdf {
            record: number,
            message: format!("data header without <name>: {}", line.trim()),
        })?;
        i += 1;
        let mut value_lines = Vec::new();
        while i < lines.len() && !lines[i].trim().is_empty() && !lines[i].starts_with('>') {
            value_lines.push(lines[i].trim_end());
            i += 1;
        }
        items.push((name.to_string(), value_lines.join("\n")));
    }
    Ok(SdfRecord {
        title,
        molblock,
        items,
    })
}

/// Parses SDF text. Every data item becomes a column; a column is numeric when all
/// its non-empty values parse as numbers.
pub fn parse_sdf(text: &str, options: &LoadOptions, source: &Path) -> Result<Dataset, DatasetError> {
    let mut records = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim_end() == SDF_RECORD_END {
            records.push(parse_sdf_record(&block, records.len() + 1)?);
            block.clear();
        } else {
            block.push(line);
        }
    }
    // A final record without a terminator still counts.
    if block.iter().any(|l| !l.trim().is_empty()) {
        records.push(parse_sdf_record(&block, records.len() + 1)?);
    }
    if records.is_empty() {
        return Err(DatasetError::Empty(source.to_path_buf()));
    }

    let mut names: Vec<String> = Vec::new();
    for record in &records {
        for (name, _) in &record.items {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    let has_titles = records.iter().any(|r| !r.title.is_empty());
    let title_column = has_titles && !names.iter().any(|n| n == TITLE_COLUMN);
    let molblock_column = !names.iter().any(|n| n == DEFAULT_STRUCTURE_COLUMN)
        && !names.iter().any(|n| n == MOLBLOCK_COLUMN);

    let mut column_names: Vec<String> = Vec::new();
    if title_column {
        column_names.push(TITLE_COLUMN.to_string());
    }
    column_names.extend(names.iter().cloned());
    if molblock_column {
        column_names.push(MOLBLOCK_COLUMN.to_string());
    }

    let rows: Vec<Vec<Option<&str>>> = records
        .iter()
        .map(|r| {
            column_names
                .iter()
                .map(|col| {
                    let raw = if title_column && col == TITLE_COLUMN {
                        Some(r.title.as_str())
                    } else if molblock_column && col == MOLBLOCK_COLUMN {
                        Some(r.molblock.as_str())
                    } else {
                        r.items
                            .iter()
                            .find(|(n, _)| n == col)
                            .map(|(_, v)| v.as_str())
                    };
                    raw.filter(|v| !v.trim().is_empty())
                })
                .collect()
        })
        .collect();

    let columns: Vec<Column> = column_names
        .iter()
        .enumerate()
        .map(|(c, name)| {
            let mut present = rows.iter().filter_map(|row| row[c]).peekable();
            let numeric = name != MOLBLOCK_COLUMN
                && present.peek().is_some()
                && present.all(|v| v.trim().parse::<f64>().is_ok());
            Column::new(
                name.clone(),
                if numeric {
                    ColumnType::Numeric
                } else {
                    ColumnType::Text
                },
            )
        })
        .collect();

    let values: Vec<Record> = rows
        .into_iter()
        .map(|row| {
            Record::new(
                row.into_iter()
                    .zip(columns.iter())
                    .map(|(cell, col)| match cell {
                        None => Value::Null,
                        Some(v) if col.is_numeric() => v
                            .trim()
                            .parse::<f64>()
                            .map(Value::Number)
                            .unwrap_or(Value::Null),
                        Some(v) => Value::Text(v.to_string()),
                    })
                    .collect(),
            )
        })
        .collect();

    let schema = Schema::new(columns, sdf_structure_column(&names, options))?;
    Dataset::new(schema, values)
}

/// Files without a SMILES item fall back to their molblocks, unless another column
/// was asked for.
fn sdf_structure_column<'a>(items: &[String], options: &'a LoadOptions) -> &'a str {
    let requested = options.structure_column.as_str();
    if requested == DEFAULT_STRUCTURE_COLUMN && !items.iter().any(|n| n == requested) {
        debug!("no {} data items, using molblocks as structures", requested);
        MOLBLOCK_COLUMN
    } else {
        requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDF: &str = "\
ethanol
  sdfview

  3  2  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 C   0  0
    1.2990    0.7500    0.0000 C   0  0
    2.5981    0.0000    0.0000 O   0  0
  1  2  1  0
  2  3  1  0
M  END
>  <SMILES>
CCO

>  <MW>  (1)
46.07

$$$$
benzene
  sdfview

  0  0  0  0  0  0  0  0  0  0999 V2000
M  END
>  <SMILES>
c1ccccc1

>  <MW>
78.11

>  <Vendor>
ACME

$$$$
";

    #[test]
    fn test_parse_sdf_columns_and_types() {
        let ds = parse_sdf(SDF, &LoadOptions::new(), Path::new("x.sdf")).unwrap();
        assert_eq!(ds.len(), 2);
        let names: Vec<&str> = ds.schema().names().collect();
        assert_eq!(names, vec!["Name", "SMILES", "MW", "Vendor"]);
        assert!(ds.schema().column("MW").unwrap().is_numeric());
        assert!(!ds.schema().column("SMILES").unwrap().is_numeric());
        assert_eq!(ds.value(0, "Name"), Some(&Value::Text("ethanol".to_string())));
        assert_eq!(ds.value(1, "MW"), Some(&Value::Number(78.11)));
        assert_eq!(ds.value(0, "Vendor"), Some(&Value::Null));
    }

    #[test]
    fn test_sdf_without_smiles_uses_molblock() {
        let text = SDF.replace("<SMILES>", "<ID>");
        let ds = parse_sdf(&text, &LoadOptions::new(), Path::new("x.sdf")).unwrap();
        assert_eq!(ds.schema().structure_column().name, MOLBLOCK_COLUMN);
        let molblock = ds.value(0, MOLBLOCK_COLUMN).unwrap().to_string();
        assert!(molblock.starts_with("ethanol"));
        assert!(molblock.ends_with("M  END"));

        let opts = LoadOptions::new().with_structure_column("Canonical");
        let err = parse_sdf(&text, &opts, Path::new("x.sdf")).unwrap_err();
        assert!(matches!(err, DatasetError::MissingStructureColumn(name) if name == "Canonical"));
    }

    #[test]
    fn test_sdf_last_record_without_terminator() {
        let text = SDF.trim_end().trim_end_matches("$$$$");
        let ds = parse_sdf(text, &LoadOptions::new(), Path::new("x.sdf")).unwrap();
        assert_eq!(ds.len(), 2);
    }

    #[test]
    fn test_sdf_errors() {
        let err = parse_sdf("", &LoadOptions::new(), Path::new("e.sdf")).unwrap_err();
        assert!(matches!(err, DatasetError::Empty(_)));
        let err = parse_sdf("junk\n$$$$\n", &LoadOptions::new(), Path::new("e.sdf")).unwrap_err();
        assert!(matches!(err, DatasetError::Sdf { record: 1, .. }));
    }

    #[test]
    fn test_data_item_name() {
        assert_eq!(data_item_name(">  <MW>  (1)"), Some("MW"));
        assert_eq!(data_item_name("> <Heavy Atoms>"), Some("Heavy Atoms"));
        assert_eq!(data_item_name("> nothing"), None);
    }

    #[test]
    fn test_read_delimited() {
        let csv = b"Name,SMILES,MW\nethanol,CCO,46.07\nbenzene,c1ccccc1,\n".to_vec();
        let ds = read_delimited(csv, b',', &LoadOptions::new(), Path::new("m.csv")).unwrap();
        assert_eq!(ds.len(), 2);
        assert!(ds.schema().column("MW").unwrap().is_numeric());
        assert_eq!(ds.value(1, "MW"), Some(&Value::Null));
        assert_eq!(ds.value(0, "SMILES"), Some(&Value::Text("CCO".to_string())));
    }

    #[test]
    fn test_read_delimited_missing_structure() {
        let csv = b"Name,MW\nethanol,46.07\n".to_vec();
        let err = read_delimited(csv, b',', &LoadOptions::new(), Path::new("m.csv")).unwrap_err();
        assert!(matches!(err, DatasetError::MissingStructureColumn(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load(Path::new("data.parquet"), &LoadOptions::new()).unwrap_err();
        assert!(matches!(err, DatasetError::UnsupportedFormat(_)));
    }
}
