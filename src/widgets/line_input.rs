use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    widgets::Widget,
};
use tracing::warn;
use tui_textarea::{CursorMove, Input, Key, TextArea};

use crate::cache::{add_to_history, CacheManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineInputEvent {
    None,
    Submit,
    Cancel,
    HistoryChanged,
}

/// Single-line input on top of tui-textarea, with optional persisted history.
pub struct LineInput {
    textarea: TextArea<'static>,
    history_file: Option<&'static str>,
    history: Vec<String>,
    history_index: Option<usize>,
    history_temp: Option<String>,
    history_limit: usize,
    history_loaded: bool,
}

impl Default for LineInput {
    fn default() -> Self {
        Self::new()
    }
}

impl LineInput {
    pub fn new() -> Self {
        let mut textarea = TextArea::default();
        textarea.set_cursor_line_style(Style::default());
        textarea.set_cursor_style(Style::default().add_modifier(Modifier::REVERSED));
        Self {
            textarea,
            history_file: None,
            history: Vec::new(),
            history_index: None,
            history_temp: None,
            history_limit: 1000,
            history_loaded: false,
        }
    }

    /// Keeps submitted values in `filename` inside the cache directory.
    pub fn with_history(mut self, filename: &'static str, limit: usize) -> Self {
        self.history_file = Some(filename);
        self.history_limit = limit;
        self
    }

    pub fn value(&self) -> String {
        self.textarea.lines().first().cloned().unwrap_or_default()
    }

    pub fn set_value(&mut self, value: &str) {
        let single_line = value.replace(['\n', '\r'], " ");
        let cursor = single_line.chars().count();
        self.textarea = TextArea::new(vec![single_line]);
        self.textarea.set_cursor_line_style(Style::default());
        self.textarea
            .set_cursor_style(Style::default().add_modifier(Modifier::REVERSED));
        self.textarea
            .move_cursor(CursorMove::Jump(0, cursor.min(u16::MAX as usize) as u16));
    }

    pub fn clear(&mut self) {
        self.set_value("");
        self.history_index = None;
        self.history_temp = None;
    }

    pub fn is_empty(&self) -> bool {
        self.value().is_empty()
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    fn load_history(&mut self, cache: &CacheManager) {
        if self.history_loaded {
            return;
        }
        if let Some(file) = self.history_file {
            match cache.load_history(file) {
                Ok(history) => self.history = history,
                Err(e) => warn!(file, error = %e, "could not load input history"),
            }
        }
        self.history_loaded = true;
    }

    fn save_to_history(&mut self, cache: Option<&CacheManager>) {
        let Some(file) = self.history_file else {
            return;
        };
        let value = self.value();
        if value.trim().is_empty() {
            return;
        }
        if let Some(cache) = cache {
            self.load_history(cache);
        }
        add_to_history(&mut self.history, value);
        if let Some(cache) = cache {
            if let Err(e) = cache.save_history(file, &self.history, self.history_limit) {
                warn!(file, error = %e, "could not save input history");
            }
        }
    }

    fn navigate_history_up(&mut self, cache: Option<&CacheManager>) {
        if let Some(cache) = cache {
            self.load_history(cache);
        }
        if self.history.is_empty() {
            return;
        }
        if self.history_index.is_none() {
            self.history_temp = Some(self.value());
        }
        let index = match self.history_index {
            Some(i) => i.saturating_sub(1),
            None => self.history.len() - 1,
        };
        self.history_index = Some(index);
        if let Some(entry) = self.history.get(index).cloned() {
            self.set_value(&entry);
        }
    }

    fn navigate_history_down(&mut self) {
        let Some(index) = self.history_index else {
            return;
        };
        if index + 1 >= self.history.len() {
            let temp = self.history_temp.take().unwrap_or_default();
            self.set_value(&temp);
            self.history_index = None;
        } else {
            self.history_index = Some(index + 1);
            if let Some(entry) = self.history.get(index + 1).cloned() {
                self.set_value(&entry);
            }
        }
    }

    pub fn handle_key(&mut self, event: &KeyEvent, cache: Option<&CacheManager>) -> LineInputEvent {
        match event.code {
            KeyCode::Enter => {
                self.save_to_history(cache);
                LineInputEvent::Submit
            }
            KeyCode::Esc => LineInputEvent::Cancel,
            KeyCode::Up if self.history_file.is_some() => {
                self.navigate_history_up(cache);
                LineInputEvent::HistoryChanged
            }
            KeyCode::Down if self.history_file.is_some() => {
                self.navigate_history_down();
                LineInputEvent::HistoryChanged
            }
            _ => {
                let input = key_event_to_input(event);
                if matches!(input.key, Key::Char('\n') | Key::Char('\r') | Key::Enter) {
                    return LineInputEvent::None;
                }
                self.textarea.input(input);
                self.history_index = None;
                self.history_temp = None;
                LineInputEvent::None
            }
        }
    }
}

/// crossterm and tui-textarea may be built against different crossterm versions, so
/// events are converted by hand.
fn key_event_to_input(event: &KeyEvent) -> Input {
    let key = match event.code {
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Enter => Key::Enter,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        KeyCode::Delete => Key::Delete,
        KeyCode::Tab | KeyCode::BackTab => Key::Tab,
        KeyCode::Esc => Key::Esc,
        _ => Key::Null,
    };
    Input {
        key,
        ctrl: event.modifiers.contains(KeyModifiers::CONTROL),
        alt: event.modifiers.contains(KeyModifiers::ALT),
        shift: event.modifiers.contains(KeyModifiers::SHIFT),
    }
}

impl Widget for &LineInput {
    fn render(self, area: Rect, buf: &mut Buffer) {
        self.textarea.render(area, buf);
    }
}
