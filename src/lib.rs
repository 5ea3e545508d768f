use color_eyre::eyre::eyre;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use std::path::{Path, PathBuf};
use std::sync::{mpsc::Sender, Arc};
use std::time::Instant;
use tracing::{info, warn};

use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Clear, Padding, Paragraph, TableState, Wrap};
use ratatui::{buffer::Buffer, layout::Rect, widgets::StatefulWidget, widgets::Widget};

pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod error_display;
pub mod export;
pub mod filter;
pub mod logging;
pub mod paginator;
pub mod query;
pub mod render;
pub mod render_cache;
pub mod source;
pub mod view;
pub mod widgets;

pub use cache::CacheManager;
pub use config::{AppConfig, ConfigManager};
pub use dataset::{Dataset, Schema, Value};
pub use error::{DatasetError, RejectionReason, RenderError};
pub use filter::{FilterState, RangeFilter};
pub use paginator::{PageCommand, PaginationState};
pub use render::{Artifact, RenderKey, Renderer, StructureRenderer};
pub use render_cache::{CacheStats, RenderCache};
pub use sdfview_cli::{Args, FileFormat};
pub use source::LoadOptions;
pub use view::{render, DisplayPage, Session};

use cache::{FILTER_HISTORY, SEARCH_HISTORY};
use error_display::{user_message_from_dataset, user_message_from_rejection};
use widgets::controls::Controls;
use widgets::datatable::{detail_lines, DataTable};
use widgets::debug::DebugState;
use widgets::line_input::{LineInput, LineInputEvent};
use widgets::stats::StatsPanel;

/// Application name used for cache and config directories
pub const APP_NAME: &str = "sdfview";

/// Filters and page requested on the command line, applied once after loading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartupView {
    pub filter: Option<String>,
    pub search: Option<String>,
    pub search_column: Option<String>,
    pub ranges: Vec<RangeFilter>,
    pub page: Option<usize>,
}

impl StartupView {
    pub fn from_args(args: &Args, config: &AppConfig) -> Result<Self> {
        let ranges = args
            .range
            .iter()
            .map(|spec| RangeFilter::parse_spec(spec).map_err(|e| eyre!(e)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            filter: args.filter.clone(),
            search: args.search.clone(),
            search_column: config.dataset.search_column.clone(),
            ranges,
            page: args.page,
        })
    }

    /// Installs everything on `session`. The first invalid piece stops the rest.
    pub fn apply(&self, session: &mut Session, max_range_columns: usize) -> Result<()> {
        let reject = |r: RejectionReason| eyre!(user_message_from_rejection(&r));
        if self.search_column.is_some() {
            session
                .set_search_column(self.search_column.clone())
                .map_err(reject)?;
        }
        if let Some(filter) = &self.filter {
            session.set_filter_text(filter).map_err(reject)?;
        }
        if let Some(search) = &self.search {
            session.set_search(search).map_err(reject)?;
        }
        for range in &self.ranges {
            set_range_limited(session, range.clone(), max_range_columns)?;
        }
        if let Some(page) = self.page {
            session.navigate(PageCommand::JumpTo(page));
        }
        Ok(())
    }
}

/// Adds or replaces a range unless that would exceed `max_ranges` distinct columns.
pub fn set_range_limited(session: &mut Session, range: RangeFilter, max_ranges: usize) -> Result<()> {
    let ranges = &session.filters().ranges;
    if ranges.len() >= max_ranges && !ranges.iter().any(|r| r.column == range.column) {
        return Err(eyre!("At most {} range filters can be active", max_ranges));
    }
    session
        .set_range(range)
        .map_err(|r| eyre!(user_message_from_rejection(&r)))
}

/// Parses `COLUMN MIN MAX` (column names may contain spaces) or `COLUMN:MIN:MAX`.
/// A lone column name means "remove the range on that column".
#[derive(Debug, Clone, PartialEq)]
pub enum RangeInput {
    Set(RangeFilter),
    Remove(String),
}

pub fn parse_range_input(text: &str) -> std::result::Result<RangeInput, String> {
    let text = text.trim();
    let parts: Vec<&str> = text.split_whitespace().collect();
    if parts.len() >= 3 {
        let min = parts[parts.len() - 2];
        let max = parts[parts.len() - 1];
        if let (Ok(min), Ok(max)) = (min.parse::<f64>(), max.parse::<f64>()) {
            let column = parts[..parts.len() - 2].join(" ");
            return Ok(RangeInput::Set(RangeFilter::new(column, min, max)));
        }
    }
    if text.matches(':').count() >= 2 {
        return RangeFilter::parse_spec(text).map(RangeInput::Set);
    }
    if text.is_empty() {
        return Err("Enter COLUMN MIN MAX, or COLUMN alone to remove its range".to_string());
    }
    Ok(RangeInput::Remove(text.to_string()))
}

pub enum AppEvent {
    Key(KeyEvent),
    Open(PathBuf, LoadOptions),
    /// Performs the load after the UI has drawn its loading message.
    DoLoad(PathBuf, LoadOptions),
    Exit,
    Crash(String),
    Resize(u16, u16),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    #[default]
    Normal,
    Filter,
    Search,
    Range,
    JumpTo,
}

impl InputMode {
    fn title(self) -> &'static str {
        match self {
            InputMode::Normal => "",
            InputMode::Filter => " Filter (e.g. MW > 300 & LogP < 5) ",
            InputMode::Search => " Search ",
            InputMode::Range => " Range: COLUMN MIN MAX (COLUMN alone removes) ",
            InputMode::JumpTo => " Go to page ",
        }
    }
}

pub struct App {
    events: Sender<AppEvent>,
    config: AppConfig,
    history: Option<CacheManager>,
    render_cache: Arc<RenderCache>,
    renderer: Arc<dyn Renderer>,
    session: Option<Session>,
    startup: StartupView,
    path: Option<PathBuf>,
    page: Option<DisplayPage>,
    table_state: TableState,
    pub input_mode: InputMode,
    filter_input: LineInput,
    search_input: LineInput,
    range_input: LineInput,
    jump_input: LineInput,
    input_error: Option<String>,
    message: Option<String>,
    error: Option<String>,
    loading: bool,
    show_stats: bool,
    show_detail: bool,
    debug: DebugState,
}

impl App {
    pub fn new(events: Sender<AppEvent>, config: AppConfig) -> App {
        let history = if config.filter.enable_history {
            CacheManager::new(APP_NAME)
                .map_err(|e| warn!(error = %e, "history disabled: no cache directory"))
                .ok()
        } else {
            None
        };
        let limit = config.filter.history_limit;
        App {
            events,
            render_cache: Arc::new(RenderCache::with_capacity(config.performance.cache_capacity)),
            renderer: Arc::new(StructureRenderer::new()),
            history,
            session: None,
            startup: StartupView::default(),
            path: None,
            page: None,
            table_state: TableState::default(),
            input_mode: InputMode::Normal,
            filter_input: LineInput::new().with_history(FILTER_HISTORY, limit),
            search_input: LineInput::new().with_history(SEARCH_HISTORY, limit),
            range_input: LineInput::new(),
            jump_input: LineInput::new(),
            input_error: None,
            message: None,
            error: None,
            loading: false,
            show_stats: false,
            show_detail: false,
            debug: DebugState {
                enabled: config.debug.enabled,
                ..DebugState::default()
            },
            config,
        }
    }

    /// Replaces the default structure renderer.
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Filters and page to apply after the first load.
    pub fn with_startup_view(mut self, startup: StartupView) -> Self {
        self.startup = startup;
        self
    }

    /// Uses `cache` for input history instead of the user cache directory.
    pub fn with_history_dir(mut self, cache: CacheManager) -> Self {
        self.history = Some(cache);
        self
    }

    pub fn enable_debug(&mut self) {
        self.debug.enabled = true;
    }

    pub fn send_event(&mut self, event: AppEvent) -> Result<()> {
        self.events.send(event)?;
        Ok(())
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn page(&self) -> Option<&DisplayPage> {
        self.page.as_ref()
    }

    pub fn input_error(&self) -> Option<&str> {
        self.input_error.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn render_cache(&self) -> &RenderCache {
        &self.render_cache
    }

    /// One synchronous pass over the current session state.
    fn refresh(&mut self, action: &str) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let started = Instant::now();
        match session.view() {
            Ok(page) => {
                if page.rows.is_empty() {
                    self.table_state.select(None);
                } else if self.table_state.selected().is_none() {
                    self.table_state.select(Some(0));
                }
                self.page = Some(page);
            }
            Err(reason) => self.message = Some(user_message_from_rejection(&reason)),
        }
        self.debug
            .on_pass(action, started.elapsed().as_micros());
    }

    fn load(&mut self, path: &Path, options: &LoadOptions) {
        self.loading = false;
        match source::load(path, options) {
            Ok(dataset) => {
                match self.session.as_mut() {
                    Some(session) => session.replace_dataset(dataset),
                    None => {
                        self.session = Some(Session::new(
                            dataset,
                            Arc::clone(&self.render_cache),
                            Arc::clone(&self.renderer),
                            self.config.display.page_size,
                        ))
                    }
                }
                self.path = Some(path.to_path_buf());
                self.error = None;
                let startup = std::mem::take(&mut self.startup);
                if let Some(session) = self.session.as_mut() {
                    if let Err(e) = startup.apply(session, self.config.filter.max_range_columns) {
                        self.message = Some(e.to_string());
                    }
                }
                self.refresh("load");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "load failed");
                self.error = Some(user_message_from_dataset(&e));
            }
        }
    }

    fn navigate(&mut self, command: PageCommand) {
        if let Some(session) = self.session.as_mut() {
            session.navigate(command);
            self.table_state.select(Some(0));
            self.refresh("navigate");
        }
    }

    fn cycle_page_size(&mut self, forward: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let current = session.page_state().page_size;
        let next = if forward {
            self.config.next_page_size(current)
        } else {
            self.config.prev_page_size(current)
        };
        session.set_page_size(next);
        self.refresh("page_size");
    }

    fn export_page(&mut self) {
        let Some(page) = self.page.as_ref() else {
            return;
        };
        let stem = self
            .path
            .as_deref()
            .and_then(|p| p.file_stem())
            .and_then(|s| s.to_str())
            .map(|s| s.trim_end_matches(".sdf").trim_end_matches(".csv").to_string())
            .unwrap_or_else(|| APP_NAME.to_string());
        let out = PathBuf::from(format!("{}-page{}.html", stem, page.window.page));
        self.message = Some(match export::write_html(page, &stem, &out) {
            Ok(()) => format!("Exported page {} to {}", page.window.page, out.display()),
            Err(e) => format!("Export failed: {}", e),
        });
    }

    fn input_mut(&mut self, mode: InputMode) -> Option<&mut LineInput> {
        match mode {
            InputMode::Normal => None,
            InputMode::Filter => Some(&mut self.filter_input),
            InputMode::Search => Some(&mut self.search_input),
            InputMode::Range => Some(&mut self.range_input),
            InputMode::JumpTo => Some(&mut self.jump_input),
        }
    }

    fn begin_input(&mut self, mode: InputMode) {
        if self.session.is_none() {
            return;
        }
        let initial = match (mode, self.session.as_ref()) {
            (InputMode::Filter, Some(s)) => s.filter_text().to_string(),
            (InputMode::Search, Some(s)) => s.filters().search.needle.clone(),
            _ => String::new(),
        };
        if let Some(input) = self.input_mut(mode) {
            input.set_value(&initial);
        }
        self.input_mode = mode;
        self.input_error = None;
        self.message = None;
    }

    /// Applies a submitted input. Returns false when the input was rejected and the
    /// editor should stay open.
    fn submit(&mut self, mode: InputMode, value: String) -> bool {
        let max_ranges = self.config.filter.max_range_columns;
        let Some(session) = self.session.as_mut() else {
            return true;
        };
        let outcome: std::result::Result<&str, String> = match mode {
            InputMode::Normal => Ok("none"),
            InputMode::Filter => session
                .set_filter_text(&value)
                .map(|_| "filter")
                .map_err(|r| user_message_from_rejection(&r)),
            InputMode::Search => session
                .set_search(&value)
                .map(|_| "search")
                .map_err(|r| user_message_from_rejection(&r)),
            InputMode::Range => match parse_range_input(&value) {
                Ok(RangeInput::Set(range)) => set_range_limited(session, range, max_ranges)
                    .map(|_| "range")
                    .map_err(|e| e.to_string()),
                Ok(RangeInput::Remove(column)) => {
                    if session.remove_range(&column) {
                        Ok("remove_range")
                    } else {
                        Err(format!("No range filter on `{}`", column))
                    }
                }
                Err(e) => Err(e),
            },
            InputMode::JumpTo => match value.trim().parse::<usize>() {
                Ok(n) => {
                    session.navigate(PageCommand::JumpTo(n));
                    Ok("jump")
                }
                Err(_) => Err(format!("Not a page number: `{}`", value.trim())),
            },
        };
        match outcome {
            Ok(action) => {
                self.input_error = None;
                self.refresh(action);
                true
            }
            Err(msg) => {
                self.input_error = Some(msg);
                false
            }
        }
    }

    fn key(&mut self, event: &KeyEvent) -> Option<AppEvent> {
        if event.kind != KeyEventKind::Press {
            return None;
        }
        self.debug.on_key(event);

        if self.input_mode != InputMode::Normal {
            let mode = self.input_mode;
            let history = self.history.clone();
            let input = self.input_mut(mode)?;
            match input.handle_key(event, history.as_ref()) {
                LineInputEvent::Submit => {
                    let value = input.value();
                    if self.submit(mode, value) {
                        self.input_mode = InputMode::Normal;
                    }
                }
                LineInputEvent::Cancel => {
                    self.input_mode = InputMode::Normal;
                    self.input_error = None;
                }
                LineInputEvent::None | LineInputEvent::HistoryChanged => {}
            }
            return None;
        }

        if self.error.is_some() || self.session.is_none() {
            return matches!(event.code, KeyCode::Char('q') | KeyCode::Esc).then_some(AppEvent::Exit);
        }

        match event.code {
            KeyCode::Char('q') | KeyCode::Esc => return Some(AppEvent::Exit),
            KeyCode::Char('/') => self.begin_input(InputMode::Filter),
            KeyCode::Char('s') => self.begin_input(InputMode::Search),
            KeyCode::Char('r') => self.begin_input(InputMode::Range),
            KeyCode::Char(':') => self.begin_input(InputMode::JumpTo),
            KeyCode::Char('x') => {
                if let Some(session) = self.session.as_mut() {
                    session.clear_filters();
                }
                self.message = None;
                self.refresh("clear_filters");
            }
            KeyCode::Char('n') | KeyCode::Right | KeyCode::PageDown => {
                self.navigate(PageCommand::Next)
            }
            KeyCode::Char('p') | KeyCode::Left | KeyCode::PageUp => {
                self.navigate(PageCommand::Prev)
            }
            KeyCode::Char('g') | KeyCode::Home => self.navigate(PageCommand::First),
            KeyCode::Char('G') | KeyCode::End => self.navigate(PageCommand::Last),
            KeyCode::Char('+') => self.cycle_page_size(true),
            KeyCode::Char('-') => self.cycle_page_size(false),
            KeyCode::Char('i') => self.show_stats = !self.show_stats,
            KeyCode::Char('c') => {
                self.render_cache.clear();
                info!("render cache cleared");
                self.message = Some("Render cache cleared".to_string());
                self.refresh("clear_cache");
            }
            KeyCode::Char('e') => self.export_page(),
            KeyCode::Down => self.table_state.select_next(),
            KeyCode::Up => self.table_state.select_previous(),
            KeyCode::Enter => self.show_detail = !self.show_detail,
            _ => {}
        }
        None
    }

    pub fn event(&mut self, event: &AppEvent) -> Option<AppEvent> {
        self.debug.num_events += 1;
        match event {
            AppEvent::Key(key) => self.key(key),
            AppEvent::Open(path, options) => {
                self.loading = true;
                self.path = Some(path.clone());
                Some(AppEvent::DoLoad(path.clone(), options.clone()))
            }
            AppEvent::DoLoad(path, options) => {
                self.load(path, options);
                None
            }
            AppEvent::Resize(..) | AppEvent::Exit | AppEvent::Crash(_) => None,
        }
    }

    fn selected_row(&self) -> Option<&view::DisplayRow> {
        let page = self.page.as_ref()?;
        page.rows.get(self.table_state.selected()?)
    }

    fn render_centered(text: String, area: Rect, buf: &mut Buffer) {
        Paragraph::new(text)
            .centered()
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::NONE)
                    .padding(Padding::top(area.height / 2)),
            )
            .render(area, buf);
    }
}

impl Widget for &mut App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        self.debug.num_frames += 1;

        let mut constraints = vec![Constraint::Fill(1)];
        let editing = self.input_mode != InputMode::Normal;
        if editing {
            constraints.push(Constraint::Length(3));
        } else if self.message.is_some() {
            constraints.push(Constraint::Length(1));
        }
        constraints.push(Constraint::Length(1));
        if self.debug.enabled {
            constraints.push(Constraint::Length(1));
        }
        let layout = Layout::new(Direction::Vertical, constraints).split(area);
        let main_area = layout[0];

        if let Some(error) = &self.error {
            App::render_centered(format!("Error: {}", error), main_area, buf);
        } else if self.loading {
            let name = self
                .path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            App::render_centered(format!("Loading {}\u{2026}", name), main_area, buf);
        } else {
            let mut side = Vec::new();
            if self.show_stats {
                side.push(Constraint::Length(30));
            }
            if self.show_detail {
                side.push(Constraint::Length(44));
            }
            let mut columns = vec![Constraint::Fill(1)];
            columns.extend(side.iter().copied());
            let panes = Layout::new(Direction::Horizontal, columns).split(main_area);

            if let Some(page) = &self.page {
                StatefulWidget::render(
                    DataTable::new(page).with_alternate_row_bg(Some(Color::Rgb(30, 30, 36))),
                    panes[0],
                    buf,
                    &mut self.table_state,
                );
            }
            let mut next = 1;
            if self.show_stats {
                let stats = self.render_cache.stats();
                StatsPanel::new(&stats).render(panes[next], buf);
                next += 1;
            }
            if self.show_detail {
                let lines = self.selected_row().map(detail_lines).unwrap_or_default();
                Clear.render(panes[next], buf);
                Paragraph::new(lines)
                    .wrap(Wrap { trim: false })
                    .block(Block::default().title(" Row ").borders(Borders::ALL))
                    .render(panes[next], buf);
            }
        }

        let mut next = 1;
        if editing {
            let mode = self.input_mode;
            let mut block = Block::default().title(mode.title()).borders(Borders::ALL);
            if let Some(err) = &self.input_error {
                block = block.title_bottom(Line::styled(
                    format!(" {} ", err),
                    Style::default().fg(Color::Red),
                ));
            }
            let inner = block.inner(layout[next]);
            block.render(layout[next], buf);
            if let Some(input) = self.input_mut(mode) {
                (&*input).render(inner, buf);
            }
            next += 1;
        } else if let Some(message) = &self.message {
            Paragraph::new(message.as_str())
                .style(Style::default().fg(Color::Yellow))
                .render(layout[next], buf);
            next += 1;
        }

        let mut controls = Controls::new()
            .with_dimmed(editing)
            .with_filter_active(
                self.session
                    .as_ref()
                    .is_some_and(|s| !s.filters().is_empty()),
            );
        if let Some(page) = &self.page {
            controls = controls.with_status(page.status(), page.filter_status());
        }
        (&controls).render(layout[next], buf);
        next += 1;

        if self.debug.enabled && layout.len() > next {
            (&self.debug).render(layout[next], buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_input() {
        assert_eq!(
            parse_range_input("MW 100 500"),
            Ok(RangeInput::Set(RangeFilter::new("MW", 100.0, 500.0)))
        );
        assert_eq!(
            parse_range_input("Heavy Atoms 5 30"),
            Ok(RangeInput::Set(RangeFilter::new("Heavy Atoms", 5.0, 30.0)))
        );
        assert_eq!(
            parse_range_input("LogP:-1:5"),
            Ok(RangeInput::Set(RangeFilter::new("LogP", -1.0, 5.0)))
        );
        assert_eq!(
            parse_range_input(" MW "),
            Ok(RangeInput::Remove("MW".to_string()))
        );
        assert!(parse_range_input("   ").is_err());
    }

    #[test]
    fn test_input_mode_titles() {
        assert!(InputMode::Filter.title().contains("Filter"));
        assert_eq!(InputMode::Normal.title(), "");
    }
}
