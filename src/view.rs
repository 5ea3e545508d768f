//! View assembly: filter, paginate, render, in that order, once per turn.
//!
//! [`render`] is a pure function of the dataset, the filters and the page state
//! (plus the injected cache and renderer). [`Session`] keeps that state between
//! turns for one user.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use tracing::{debug, info};

use crate::dataset::{ColumnType, Dataset, Schema, Value};
use crate::error::RejectionReason;
use crate::filter::{filter_indices, FilterState, RangeFilter};
use crate::paginator::{paginate, PageCommand, PageWindow, PaginationState};
use crate::render::{Artifact, RenderKey, Renderer, ARTIFACT_WIDTH};
use crate::render_cache::RenderCache;

pub const INDEX_COLUMN: &str = "Idx";
pub const ARTIFACT_COLUMN: &str = "Structure";
pub const INDEX_COLUMN_WIDTH: u32 = 60;
pub const ARTIFACT_COLUMN_WIDTH: u32 = ARTIFACT_WIDTH + 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HintKind {
    Index,
    Artifact,
    Numeric,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    Center,
    Right,
}

/// Presentation hint for one output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnHint {
    pub name: String,
    pub kind: HintKind,
    /// Fixed width in pixels; `None` lets the grid size the column.
    pub width: Option<u32>,
    pub align: Align,
}

/// Index and artifact columns first, then the dataset's columns in schema order.
pub fn layout_hints(schema: &Schema) -> Vec<ColumnHint> {
    let mut hints = vec![
        ColumnHint {
            name: INDEX_COLUMN.to_string(),
            kind: HintKind::Index,
            width: Some(INDEX_COLUMN_WIDTH),
            align: Align::Right,
        },
        ColumnHint {
            name: ARTIFACT_COLUMN.to_string(),
            kind: HintKind::Artifact,
            width: Some(ARTIFACT_COLUMN_WIDTH),
            align: Align::Center,
        },
    ];
    hints.extend(schema.columns().iter().map(|col| match col.kind {
        ColumnType::Numeric => ColumnHint {
            name: col.name.clone(),
            kind: HintKind::Numeric,
            width: None,
            align: Align::Right,
        },
        ColumnType::Text => ColumnHint {
            name: col.name.clone(),
            kind: HintKind::Text,
            width: None,
            align: Align::Left,
        },
    }));
    hints
}

/// One assembled row: continuous 1-based index, artifact, and the source values.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRow {
    pub display_index: usize,
    /// Row position in the unfiltered dataset.
    pub source_index: usize,
    pub artifact: Artifact,
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl DisplayRow {
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.schema.index_of(column).and_then(|i| self.values.get(i))
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema.names().zip(self.values.iter())
    }
}

const RESERVED_JSON_KEYS: [&str; 2] = ["displayIndex", "artifact"];

/// Column key in a row's JSON object: `_` is appended until it no longer clashes
/// with a reserved key or another column.
fn json_key(schema: &Schema, name: &str) -> String {
    let mut key = name.to_string();
    while (key != name && schema.index_of(&key).is_some())
        || RESERVED_JSON_KEYS.contains(&key.as_str())
    {
        key.push('_');
    }
    key
}

impl Serialize for DisplayRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + 2))?;
        map.serialize_entry(RESERVED_JSON_KEYS[0], &self.display_index)?;
        map.serialize_entry(RESERVED_JSON_KEYS[1], &self.artifact)?;
        for (name, value) in self.columns() {
            map.serialize_entry(&json_key(&self.schema, name), value)?;
        }
        map.end()
    }
}

/// Everything the grid needs for one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPage {
    pub rows: Vec<DisplayRow>,
    pub columns: Vec<ColumnHint>,
    pub window: PageWindow,
    pub total_records: usize,
}

impl DisplayPage {
    /// Rows left after filtering.
    pub fn filtered_rows(&self) -> usize {
        self.window.total_rows
    }

    pub fn is_filtered(&self) -> bool {
        self.window.total_rows != self.total_records
    }

    /// The page state this pass settled on, for the caller to keep.
    pub fn page_state(&self) -> PaginationState {
        PaginationState {
            page_size: self.window.page_size,
            current_page: self.window.page,
        }
    }

    pub fn status(&self) -> String {
        if self.window.is_empty() {
            return format!("No rows to show ({} total)", self.total_records);
        }
        let range = self.window.range();
        format!(
            "Showing rows {}\u{2013}{} of {} ({} total)",
            range.start + 1,
            range.end,
            self.window.total_rows,
            self.total_records
        )
    }

    pub fn filter_status(&self) -> Option<String> {
        self.is_filtered().then(|| {
            format!(
                "Filtered: {} / {} rows",
                self.window.total_rows, self.total_records
            )
        })
    }
}

/// One full pass: filter, then paginate, then fill artifacts through the cache.
///
/// Auxiliary filters naming missing or non-numeric columns are rejected before any
/// row is touched.
pub fn render(
    dataset: &Dataset,
    filters: &FilterState,
    page: &PaginationState,
    cache: &RenderCache,
    renderer: &dyn Renderer,
) -> Result<DisplayPage, RejectionReason> {
    filters.check(dataset.schema())?;
    let indices = filter_indices(dataset, filters);
    Ok(assemble(dataset, &indices, page, cache, renderer))
}

/// Paginates already-filtered row positions and fills the page's artifacts.
fn assemble(
    dataset: &Dataset,
    indices: &[usize],
    page: &PaginationState,
    cache: &RenderCache,
    renderer: &dyn Renderer,
) -> DisplayPage {
    let (_, window) = paginate(
        indices.len(),
        page.page_size,
        page.current_page,
        PageCommand::Stay,
    );

    let schema = dataset.shared_schema();
    let structure = schema.structure_index();
    let rows = indices[window.range()]
        .iter()
        .zip(window.offset + 1..)
        .filter_map(|(&source_index, display_index)| {
            let record = dataset.record(source_index)?;
            let artifact = RenderKey::from_value(record.get(structure))
                .map(|key| cache.get_or_render(&key, renderer))
                .unwrap_or_default();
            Some(DisplayRow {
                display_index,
                source_index,
                artifact,
                schema: Arc::clone(&schema),
                values: record.values().to_vec(),
            })
        })
        .collect();

    DisplayPage {
        rows,
        columns: layout_hints(&schema),
        window,
        total_records: dataset.len(),
    }
}

/// Per-user state carried between turns. The cache and renderer are shared.
pub struct Session {
    dataset: Dataset,
    filters: FilterState,
    filter_text: String,
    page: PaginationState,
    /// Filtered row count from the last pass; `None` once filters or data change.
    filtered_len: Option<usize>,
    /// Filters changed since the last pass, so a page past the end goes back to 1.
    reset_if_shrunk: bool,
    cache: Arc<RenderCache>,
    renderer: Arc<dyn Renderer>,
}

impl Session {
    pub fn new(
        dataset: Dataset,
        cache: Arc<RenderCache>,
        renderer: Arc<dyn Renderer>,
        page_size: usize,
    ) -> Self {
        info!(
            rows = dataset.len(),
            columns = dataset.schema().len(),
            "session started"
        );
        Self {
            dataset,
            filters: FilterState::new(),
            filter_text: String::new(),
            page: PaginationState::new(page_size),
            filtered_len: None,
            reset_if_shrunk: false,
            cache,
            renderer,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    /// Text of the expression currently applied.
    pub fn filter_text(&self) -> &str {
        &self.filter_text
    }

    pub fn page_state(&self) -> PaginationState {
        self.page
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    /// Swaps in a newly loaded dataset. Filters and page reset; the cache is kept.
    pub fn replace_dataset(&mut self, dataset: Dataset) {
        info!(rows = dataset.len(), "dataset replaced");
        self.dataset = dataset;
        self.filters.clear();
        self.filter_text.clear();
        self.page.current_page = 1;
        self.filtered_len = None;
        self.reset_if_shrunk = false;
    }

    /// Installs a new filter expression. A rejected expression leaves the previous
    /// one applied.
    pub fn set_filter_text(&mut self, text: &str) -> Result<(), RejectionReason> {
        self.filters
            .set_expression_text(text, self.dataset.schema())?;
        self.filter_text = text.trim().to_string();
        self.filters_changed();
        Ok(())
    }

    pub fn set_search(&mut self, needle: &str) -> Result<(), RejectionReason> {
        let mut next = self.filters.clone();
        next.search.needle = needle.trim().to_string();
        next.check(self.dataset.schema())?;
        self.filters = next;
        self.filters_changed();
        Ok(())
    }

    /// Sets which column the substring search looks at; `None` means the structure
    /// column.
    pub fn set_search_column(&mut self, column: Option<String>) -> Result<(), RejectionReason> {
        let mut next = self.filters.clone();
        next.search.column = column;
        next.check(self.dataset.schema())?;
        self.filters = next;
        self.filters_changed();
        Ok(())
    }

    pub fn set_range(&mut self, range: RangeFilter) -> Result<(), RejectionReason> {
        let mut next = self.filters.clone();
        next.set_range(range);
        next.check(self.dataset.schema())?;
        self.filters = next;
        self.filters_changed();
        Ok(())
    }

    pub fn remove_range(&mut self, column: &str) -> bool {
        let removed = self.filters.remove_range(column);
        if removed {
            self.filters_changed();
        }
        removed
    }

    pub fn clear_filters(&mut self) {
        let column = self.filters.search.column.take();
        self.filters.clear();
        self.filters.search.column = column;
        self.filter_text.clear();
        self.filters_changed();
    }

    fn filters_changed(&mut self) {
        self.filtered_len = None;
        self.reset_if_shrunk = true;
    }

    fn filtered_count(&mut self) -> usize {
        let (dataset, filters) = (&self.dataset, &self.filters);
        *self
            .filtered_len
            .get_or_insert_with(|| filter_indices(dataset, filters).len())
    }

    pub fn navigate(&mut self, command: PageCommand) -> PageWindow {
        let filtered = self.filtered_count();
        if self.reset_if_shrunk {
            self.reset_page_if_shrunk(filtered);
        }
        let window = self.page.apply(filtered, command);
        debug!(?command, page = window.page, of = window.total_pages, "navigate");
        window
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.page.set_page_size(page_size);
    }

    /// Back to page 1 when the view shrank below the current page.
    fn reset_page_if_shrunk(&mut self, filtered: usize) {
        let total = crate::paginator::total_pages(filtered, self.page.page_size);
        if self.page.current_page > total {
            self.page.current_page = 1;
        }
        self.reset_if_shrunk = false;
    }

    /// Runs one pass with the current state and keeps the settled page. Filtering
    /// runs once per pass.
    pub fn view(&mut self) -> Result<DisplayPage, RejectionReason> {
        self.filters.check(self.dataset.schema())?;
        let indices = filter_indices(&self.dataset, &self.filters);
        self.filtered_len = Some(indices.len());
        if self.reset_if_shrunk {
            self.reset_page_if_shrunk(indices.len());
        }
        let page = assemble(
            &self.dataset,
            &indices,
            &self.page,
            &self.cache,
            self.renderer.as_ref(),
        );
        self.page = page.page_state();
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::molecules;
    use crate::render::StructureRenderer;

    fn session(page_size: usize) -> Session {
        Session::new(
            molecules(),
            Arc::new(RenderCache::with_capacity(16)),
            Arc::new(StructureRenderer::new()),
            page_size,
        )
    }

    #[test]
    fn test_layout_hints() {
        let hints = layout_hints(molecules().schema());
        assert_eq!(hints[0].name, INDEX_COLUMN);
        assert_eq!(hints[0].width, Some(INDEX_COLUMN_WIDTH));
        assert_eq!(hints[1].kind, HintKind::Artifact);
        let mw = hints.iter().find(|h| h.name == "MW").unwrap();
        assert_eq!(mw.align, Align::Right);
        let name = hints.iter().find(|h| h.name == "Name").unwrap();
        assert_eq!(name.align, Align::Left);
    }

    #[test]
    fn test_render_first_page() {
        let mut s = session(4);
        let page = s.view().unwrap();
        assert_eq!(page.rows.len(), 4);
        assert_eq!(page.rows[0].display_index, 1);
        assert!(!page.rows[0].artifact.is_empty());
        assert_eq!(page.status(), "Showing rows 1\u{2013}4 of 6 (6 total)");
        assert_eq!(page.filter_status(), None);
    }

    #[test]
    fn test_display_index_continues_across_pages() {
        let mut s = session(4);
        s.navigate(PageCommand::Next);
        let page = s.view().unwrap();
        let indices: Vec<usize> = page.rows.iter().map(|r| r.display_index).collect();
        assert_eq!(indices, vec![5, 6]);
    }

    #[test]
    fn test_unrenderable_row_gets_empty_artifact() {
        let mut s = session(10);
        let page = s.view().unwrap();
        let unknown = page
            .rows
            .iter()
            .find(|r| r.get("Name") == Some(&Value::Text("unknown".to_string())))
            .unwrap();
        assert!(unknown.artifact.is_empty());
        assert_eq!(page.rows.len(), 6);
    }

    #[test]
    fn test_invalid_filter_keeps_previous_view() {
        let mut s = session(10);
        s.set_filter_text("MW > 300").unwrap();
        let before = s.view().unwrap().filtered_rows();
        let err = s.set_filter_text("MW > 300 & __import__('os')").unwrap_err();
        assert!(err.is_safety_violation());
        assert_eq!(s.filter_text(), "MW > 300");
        assert_eq!(s.view().unwrap().filtered_rows(), before);
    }

    #[test]
    fn test_filter_shrinking_view_resets_page() {
        let mut s = session(2);
        s.navigate(PageCommand::Last);
        assert_eq!(s.page_state().current_page, 3);
        s.set_filter_text("MW > 300").unwrap();
        let page = s.view().unwrap();
        assert_eq!(page.window.page, 1);
        assert_eq!(s.page_state().current_page, 1);
        assert_eq!(
            page.filter_status(),
            Some("Filtered: 2 / 6 rows".to_string())
        );
    }

    #[test]
    fn test_navigate_after_shrinking_filter_starts_from_page_one() {
        let mut s = session(2);
        s.navigate(PageCommand::Last);
        s.set_filter_text("MW > 300").unwrap();
        assert_eq!(s.filtered_len, None);
        let window = s.navigate(PageCommand::Next);
        assert_eq!(window.page, 1);
        assert_eq!(window.total_pages, 1);
        assert_eq!(s.filtered_len, Some(2));
    }

    #[test]
    fn test_filtered_count_kept_from_last_pass() {
        let mut s = session(2);
        s.set_filter_text("MW > 300").unwrap();
        s.view().unwrap();
        assert_eq!(s.filtered_len, Some(2));
        assert!(!s.reset_if_shrunk);
        let window = s.navigate(PageCommand::Last);
        assert_eq!(window.total_rows, 2);
        s.clear_filters();
        assert_eq!(s.filtered_len, None);
        assert_eq!(s.view().unwrap().filtered_rows(), 6);
    }

    #[test]
    fn test_range_on_text_column_is_rejected() {
        let mut s = session(10);
        assert!(s.set_range(RangeFilter::new("Name", 0.0, 1.0)).is_err());
        assert!(s.filters().ranges.is_empty());
    }

    #[test]
    fn test_cache_reused_between_passes() {
        let mut s = session(10);
        s.view().unwrap();
        let first = s.cache().stats();
        s.view().unwrap();
        let second = s.cache().stats();
        assert_eq!(second.misses, first.misses);
        assert_eq!(second.hits, first.hits + first.misses);
    }

    #[test]
    fn test_display_row_serializes_flat() {
        let mut s = session(1);
        let page = s.view().unwrap();
        let json = serde_json::to_value(&page.rows[0]).unwrap();
        assert_eq!(json["displayIndex"], 1);
        assert_eq!(json["Name"], "ethanol");
        assert_eq!(json["MW"], 46.07);
        assert!(json["artifact"].as_str().unwrap().starts_with("<svg"));
    }

    #[test]
    fn test_display_row_json_keys_do_not_collide() {
        use crate::dataset::{Column, Record};
        let schema = Schema::new(
            vec![
                Column::text("SMILES"),
                Column::text("artifact"),
                Column::text("artifact_"),
                Column::numeric("displayIndex"),
            ],
            "SMILES",
        )
        .unwrap();
        let record = Record::new(vec![
            Value::Text("CCO".to_string()),
            Value::Text("tag".to_string()),
            Value::Text("other".to_string()),
            Value::Number(7.0),
        ]);
        let dataset = Dataset::new(schema, vec![record]).unwrap();
        let mut s = Session::new(
            dataset,
            Arc::new(RenderCache::with_capacity(4)),
            Arc::new(StructureRenderer::new()),
            10,
        );
        let page = s.view().unwrap();
        let json = serde_json::to_value(&page.rows[0]).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 6);
        assert_eq!(json["displayIndex"], 1);
        assert!(json["artifact"].as_str().unwrap().starts_with("<svg"));
        assert_eq!(json["artifact__"], "tag");
        assert_eq!(json["artifact_"], "other");
        assert_eq!(json["displayIndex_"], 7.0);
    }

    #[test]
    fn test_empty_result_page() {
        let mut s = session(10);
        s.set_filter_text("MW > 10000").unwrap();
        let page = s.view().unwrap();
        assert!(page.rows.is_empty());
        assert_eq!(page.window.total_pages, 1);
        assert_eq!(page.status(), "No rows to show (6 total)");
    }
}
