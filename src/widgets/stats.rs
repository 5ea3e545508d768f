//! Render cache diagnostics panel.

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Padding, Paragraph, Widget},
};

use crate::render_cache::CacheStats;

pub struct StatsPanel<'a> {
    stats: &'a CacheStats,
}

impl<'a> StatsPanel<'a> {
    pub fn new(stats: &'a CacheStats) -> Self {
        Self { stats }
    }

    pub fn lines(&self) -> Vec<Line<'static>> {
        let s = self.stats;
        let label = Style::default().add_modifier(Modifier::BOLD);
        vec![
            Line::from(vec![
                Span::styled("Entries   ", label),
                Span::raw(format!("{} / {}", s.size, s.capacity)),
            ]),
            Line::from(vec![
                Span::styled("Hits      ", label),
                Span::raw(s.hits.to_string()),
            ]),
            Line::from(vec![
                Span::styled("Misses    ", label),
                Span::raw(s.misses.to_string()),
            ]),
            Line::from(vec![
                Span::styled("Hit rate  ", label),
                Span::raw(format!("{:.1}%", s.hit_rate * 100.0)),
            ]),
        ]
    }
}

impl Widget for StatsPanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .title(" Render cache ")
            .borders(Borders::ALL)
            .padding(Padding::horizontal(1));
        let inner = block.inner(area);
        block.render(area, buf);

        let layout = Layout::new(
            Direction::Vertical,
            [Constraint::Length(4), Constraint::Length(1), Constraint::Fill(1)],
        )
        .split(inner);
        Paragraph::new(self.lines()).render(layout[0], buf);

        let ratio = if self.stats.capacity == 0 {
            0.0
        } else {
            (self.stats.size as f64 / self.stats.capacity as f64).clamp(0.0, 1.0)
        };
        Gauge::default()
            .gauge_style(Style::default().fg(Color::Cyan))
            .ratio(ratio)
            .label("fill")
            .render(layout[1], buf);
    }
}
