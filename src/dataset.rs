//! In-memory molecule table: a fixed schema plus an ordered list of records.
//!
//! A [`Dataset`] is immutable once built. Filtering produces index lists or a
//! new `Dataset` sharing the same [`Schema`]; the source is never touched.

use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::DatasetError;

/// Column name used for the structure encoding unless configured otherwise.
pub const DEFAULT_STRUCTURE_COLUMN: &str = "SMILES";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Numeric,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn numeric(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Numeric)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == ColumnType::Numeric
    }
}

/// Ordered, named, typed columns. One of them is the structure column.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    structure: usize,
}

impl Schema {
    pub fn new(columns: Vec<Column>, structure_column: &str) -> Result<Self, DatasetError> {
        let mut index = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            if index.insert(column.name.clone(), i).is_some() {
                return Err(DatasetError::Schema(format!(
                    "duplicate column name `{}`",
                    column.name
                )));
            }
        }
        let structure = *index
            .get(structure_column)
            .ok_or_else(|| DatasetError::MissingStructureColumn(structure_column.to_string()))?;
        Ok(Self {
            columns,
            index,
            structure,
        })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index_of(name).map(|i| &self.columns[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn numeric_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_numeric())
    }

    pub fn structure_index(&self) -> usize {
        self.structure
    }

    pub fn structure_column(&self) -> &Column {
        &self.columns[self.structure]
    }
}

/// A single cell. Absent values are `Null`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Number(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric coercion: numbers as-is, text when it parses as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Null => None,
            Value::Number(n) => Some(Cow::Owned(format_number(*n))),
            Value::Text(s) => Some(Cow::Borrowed(s.as_str())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Value::Number(n) => serializer.serialize_str(&format_number(*n)),
            Value::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// Integral values print without a fractional part ("300", not "300.0").
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

static NULL: Value = Value::Null;

/// One row, values aligned with the schema's column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Value at a column position; out-of-range positions read as null.
    pub fn get(&self, column: usize) -> &Value {
        self.values.get(column).unwrap_or(&NULL)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    schema: Arc<Schema>,
    records: Vec<Record>,
}

impl Dataset {
    pub fn new(schema: Schema, records: Vec<Record>) -> Result<Self, DatasetError> {
        Self::with_shared_schema(Arc::new(schema), records)
    }

    pub fn with_shared_schema(
        schema: Arc<Schema>,
        records: Vec<Record>,
    ) -> Result<Self, DatasetError> {
        if let Some((i, record)) = records
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != schema.len())
        {
            return Err(DatasetError::Schema(format!(
                "record {} has {} values, expected {}",
                i + 1,
                record.len(),
                schema.len()
            )));
        }
        Ok(Self { schema, records })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn shared_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record(&self, row: usize) -> Option<&Record> {
        self.records.get(row)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Value by row position and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.schema.index_of(column)?;
        self.records.get(row).map(|r| r.get(col))
    }

    pub fn structure_value(&self, row: usize) -> Option<&Value> {
        self.records
            .get(row)
            .map(|r| r.get(self.schema.structure_index()))
    }

    /// New dataset holding the given rows in the given order, sharing this schema.
    pub fn select(&self, rows: &[usize]) -> Dataset {
        let records = rows
            .iter()
            .filter_map(|&i| self.records.get(i).cloned())
            .collect();
        Dataset {
            schema: Arc::clone(&self.schema),
            records,
        }
    }

    /// Smallest and largest non-null numeric value of a column.
    pub fn column_bounds(&self, column: &str) -> Option<(f64, f64)> {
        let col = self.schema.index_of(column)?;
        self.records
            .iter()
            .filter_map(|r| r.get(col).as_number())
            .filter(|n| !n.is_nan())
            .fold(None, |acc, n| match acc {
                None => Some((n, n)),
                Some((lo, hi)) => Some((lo.min(n), hi.max(n))),
            })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Small fixture shared by unit tests across the crate.
    pub(crate) fn molecules() -> Dataset {
        let schema = Schema::new(
            vec![
                Column::text("Name"),
                Column::text("SMILES"),
                Column::numeric("MW"),
                Column::numeric("LogP"),
            ],
            "SMILES",
        )
        .unwrap();
        let rows = vec![
            ("ethanol", "CCO", Some(46.07), Some(-0.31)),
            ("benzene", "c1ccccc1", Some(78.11), Some(2.13)),
            ("aspirin", "CC(=O)Oc1ccccc1C(=O)O", Some(180.16), Some(1.19)),
            ("unknown", "C1CC", None, Some(7.5)),
            ("atorvastatin", "CC(C)c1c(C(=O)Nc2ccccc2)c(-c2ccccc2)c(-c2ccc(F)cc2)n1CCC(O)CC(O)CC(=O)O", Some(558.64), Some(4.46)),
            ("cholesterol", "CC(C)CCCC(C)C1CCC2C1(CCC3C2CC=C4C3(CCC(C4)O)C)C", Some(386.65), Some(7.11)),
        ];
        let records = rows
            .into_iter()
            .map(|(name, smiles, mw, logp)| {
                Record::new(vec![
                    Value::Text(name.to_string()),
                    Value::Text(smiles.to_string()),
                    mw.map(Value::Number).unwrap_or(Value::Null),
                    logp.map(Value::Number).unwrap_or(Value::Null),
                ])
            })
            .collect();
        Dataset::new(schema, records).unwrap()
    }

    #[test]
    fn test_schema_requires_structure_column() {
        let err = Schema::new(vec![Column::numeric("MW")], "SMILES").unwrap_err();
        assert!(matches!(err, DatasetError::MissingStructureColumn(ref c) if c == "SMILES"));
    }

    #[test]
    fn test_schema_rejects_duplicates() {
        let err = Schema::new(
            vec![Column::text("SMILES"), Column::text("SMILES")],
            "SMILES",
        )
        .unwrap_err();
        assert!(matches!(err, DatasetError::Schema(_)));
    }

    #[test]
    fn test_record_width_checked() {
        let schema = Schema::new(vec![Column::text("SMILES"), Column::numeric("MW")], "SMILES")
            .unwrap();
        let err = Dataset::new(schema, vec![Record::new(vec![Value::Null])]).unwrap_err();
        assert!(err.to_string().contains("expected 2"));
    }

    #[test]
    fn test_value_coercion() {
        assert_eq!(Value::Number(3.0).as_number(), Some(3.0));
        assert_eq!(Value::Text(" 2.5 ".to_string()).as_number(), Some(2.5));
        assert_eq!(Value::Text("CCO".to_string()).as_number(), None);
        assert_eq!(Value::Null.as_number(), None);
        assert_eq!(Value::Number(300.0).to_string(), "300");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
    }

    #[test]
    fn test_dataset_lookup_and_select() {
        let ds = molecules();
        assert_eq!(ds.len(), 6);
        assert_eq!(
            ds.value(1, "Name"),
            Some(&Value::Text("benzene".to_string()))
        );
        assert_eq!(ds.value(3, "MW"), Some(&Value::Null));
        assert_eq!(ds.value(0, "Nope"), None);

        let picked = ds.select(&[2, 0]);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked.value(0, "Name"), ds.value(2, "Name"));
        assert_eq!(picked.schema(), ds.schema());
    }

    #[test]
    fn test_column_bounds_skips_nulls() {
        let ds = molecules();
        assert_eq!(ds.column_bounds("MW"), Some((46.07, 558.64)));
        assert_eq!(ds.column_bounds("Missing"), None);
    }
}
