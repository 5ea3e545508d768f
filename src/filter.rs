//! Expression evaluation and the auxiliary search/range filters.
//!
//! All filters are stable: output rows keep the source order and are never
//! duplicated. The expression, the substring search and every range are combined
//! with an implicit AND.

use std::borrow::Cow;
use tracing::{debug, warn};

use crate::dataset::{format_number, Dataset, Record, Schema, Value};
use crate::error::RejectionReason;
use crate::query::{self, CmpOp, FilterExpression, Operand};

/// Case-insensitive substring filter on one text column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchFilter {
    pub column: Option<String>,
    pub needle: String,
}

impl SearchFilter {
    pub fn new(column: Option<String>, needle: impl Into<String>) -> Self {
        Self {
            column,
            needle: needle.into(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.needle.trim().is_empty()
    }
}

/// Inclusive `[min, max]` bounds on one numeric column.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFilter {
    pub column: String,
    pub min: f64,
    pub max: f64,
}

impl RangeFilter {
    pub fn new(column: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            column: column.into(),
            min,
            max,
        }
    }

    pub fn contains(&self, n: f64) -> bool {
        n >= self.min && n <= self.max
    }

    /// Parses `COLUMN:MIN:MAX`. The column name may itself contain `:`.
    pub fn parse_spec(spec: &str) -> Result<Self, String> {
        let mut parts = spec.rsplitn(3, ':');
        let max = parts.next();
        let min = parts.next();
        let column = parts.next();
        match (column, min, max) {
            (Some(column), Some(min), Some(max)) if !column.is_empty() => {
                let min = min
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| format!("Invalid minimum `{}` in range `{}`", min, spec))?;
                let max = max
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| format!("Invalid maximum `{}` in range `{}`", max, spec))?;
                Ok(Self::new(column, min, max))
            }
            _ => Err(format!("Range must look like COLUMN:MIN:MAX, got `{}`", spec)),
        }
    }
}

/// Everything that narrows the dataset for one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterState {
    pub expression: Option<FilterExpression>,
    pub search: SearchFilter,
    pub ranges: Vec<RangeFilter>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_expression(mut self, expression: Option<FilterExpression>) -> Self {
        self.expression = expression;
        self
    }

    /// Validates `text` and installs it; blank text removes the expression.
    /// On rejection the current expression is left in place.
    pub fn set_expression_text(
        &mut self,
        text: &str,
        schema: &Schema,
    ) -> Result<(), RejectionReason> {
        match query::compile_filter(text, schema) {
            Ok(expression) => {
                self.expression = expression;
                Ok(())
            }
            Err(reason) => {
                warn!(filter = text, %reason, "filter rejected");
                Err(reason)
            }
        }
    }

    pub fn with_search(mut self, column: Option<String>, needle: impl Into<String>) -> Self {
        self.search = SearchFilter::new(column, needle);
        self
    }

    pub fn with_range(mut self, range: RangeFilter) -> Self {
        self.set_range(range);
        self
    }

    /// Adds a range, replacing any existing range on the same column.
    pub fn set_range(&mut self, range: RangeFilter) {
        match self.ranges.iter_mut().find(|r| r.column == range.column) {
            Some(existing) => *existing = range,
            None => self.ranges.push(range),
        }
    }

    pub fn remove_range(&mut self, column: &str) -> bool {
        let before = self.ranges.len();
        self.ranges.retain(|r| r.column != column);
        self.ranges.len() != before
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.expression.is_none() && !self.search.is_active() && self.ranges.is_empty()
    }

    /// Checks the auxiliary filters against a schema: the search column must exist
    /// and every range must name a numeric column.
    pub fn check(&self, schema: &Schema) -> Result<(), RejectionReason> {
        if let Some(name) = &self.search.column {
            if !schema.contains(name) {
                return Err(RejectionReason::UnknownColumn { name: name.clone() });
            }
        }
        for range in &self.ranges {
            match schema.column(&range.column) {
                None => {
                    return Err(RejectionReason::UnknownColumn {
                        name: range.column.clone(),
                    })
                }
                Some(col) if !col.is_numeric() => {
                    return Err(RejectionReason::Syntax(format!(
                        "Range filter needs a numeric column; `{}` is text",
                        col.name
                    )))
                }
                Some(_) => {}
            }
            if range.min > range.max {
                return Err(RejectionReason::Syntax(format!(
                    "Range on `{}` has minimum {} above maximum {}",
                    range.column, range.min, range.max
                )));
            }
        }
        Ok(())
    }
}

enum Scalar<'a> {
    Null,
    Number(f64),
    Text(Cow<'a, str>),
}

fn operand_value<'a>(operand: &'a Operand, record: &'a Record) -> Scalar<'a> {
    match operand {
        Operand::Column(c) => match record.get(c.index()) {
            Value::Null => Scalar::Null,
            Value::Number(n) => Scalar::Number(*n),
            Value::Text(s) => Scalar::Text(Cow::Borrowed(s.as_str())),
        },
        Operand::Number(n) => Scalar::Number(*n),
        Operand::Text(s) => Scalar::Text(Cow::Borrowed(s.as_str())),
        Operand::Bool(b) => Scalar::Number(if *b { 1.0 } else { 0.0 }),
    }
}

impl Scalar<'_> {
    fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Null => None,
            Scalar::Number(n) => Some(*n),
            Scalar::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    fn as_text(&self) -> Cow<'_, str> {
        match self {
            Scalar::Null => Cow::Borrowed(""),
            Scalar::Number(n) => Cow::Owned(format_number(*n)),
            Scalar::Text(s) => Cow::Borrowed(s.as_ref()),
        }
    }
}

/// Boolean literals read as 1/0 unless the other side is non-numeric text.
fn coerce_bool<'a>(operand: &Operand, value: Scalar<'a>, other: &Scalar<'_>) -> Scalar<'a> {
    match (operand, other) {
        (Operand::Bool(b), Scalar::Text(s)) if s.trim().parse::<f64>().is_err() => {
            Scalar::Text(Cow::Owned(b.to_string()))
        }
        _ => value,
    }
}

fn compare(left: &Operand, op: CmpOp, right: &Operand, record: &Record) -> bool {
    let l = operand_value(left, record);
    let r = operand_value(right, record);
    if matches!(l, Scalar::Null) || matches!(r, Scalar::Null) {
        return false;
    }
    let l = coerce_bool(left, l, &r);
    let r = coerce_bool(right, r, &l);
    let ordering = match (l.as_number(), r.as_number()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => Some(l.as_text().cmp(&r.as_text())),
    };
    op.test(ordering)
}

/// Evaluates a validated expression against one record.
pub fn matches(expr: &FilterExpression, record: &Record) -> bool {
    match expr {
        FilterExpression::Comparison { left, op, right } => compare(left, *op, right, record),
        FilterExpression::Constant(b) => *b,
        FilterExpression::And(l, r) => matches(l, record) && matches(r, record),
        FilterExpression::Or(l, r) => matches(l, record) || matches(r, record),
        FilterExpression::Not(e) => !matches(e, record),
    }
}

/// Indices of the rows that pass every active filter, in source order.
///
/// An expression validated against another schema is re-resolved by column name
/// first; columns this dataset lacks read as null.
pub fn filter_indices(dataset: &Dataset, state: &FilterState) -> Vec<usize> {
    let schema = dataset.schema();
    let rebound;
    let expression = match &state.expression {
        Some(expr) if !expr.is_bound_to(schema) => {
            rebound = expr.rebind(schema);
            Some(&rebound)
        }
        other => other.as_ref(),
    };

    let search_col = if state.search.is_active() {
        let name = state
            .search
            .column
            .as_deref()
            .unwrap_or(schema.structure_column().name.as_str());
        Some((schema.index_of(name), state.search.needle.trim().to_lowercase()))
    } else {
        None
    };
    let ranges: Vec<(Option<usize>, &RangeFilter)> = state
        .ranges
        .iter()
        .map(|r| (schema.index_of(&r.column), r))
        .collect();

    let indices: Vec<usize> = dataset
        .records()
        .iter()
        .enumerate()
        .filter(|(_, record)| {
            if let Some((col, needle)) = &search_col {
                let hit = col
                    .and_then(|c| record.get(c).as_text())
                    .is_some_and(|text| text.to_lowercase().contains(needle.as_str()));
                if !hit {
                    return false;
                }
            }
            for (col, range) in &ranges {
                let inside = col
                    .and_then(|c| record.get(c).as_number())
                    .is_some_and(|n| range.contains(n));
                if !inside {
                    return false;
                }
            }
            expression.map_or(true, |expr| matches(expr, record))
        })
        .map(|(i, _)| i)
        .collect();

    debug!(
        kept = indices.len(),
        total = dataset.len(),
        "filter pass complete"
    );
    indices
}

/// New order-preserving view with only the matching rows. The source is untouched.
pub fn evaluate(expr: &FilterExpression, dataset: &Dataset) -> Dataset {
    let state = FilterState::new().with_expression(Some(expr.clone()));
    apply(dataset, &state)
}

/// Like [`evaluate`] for a full [`FilterState`].
pub fn apply(dataset: &Dataset, state: &FilterState) -> Dataset {
    if state.is_empty() {
        return dataset.clone();
    }
    dataset.select(&filter_indices(dataset, state))
}
