use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Paragraph, Widget},
};

const CONTROLS: [(&str, &str); 8] = [
    ("/", "Filter"),
    ("s", "Search"),
    ("r", "Range"),
    ("x", "Clear"),
    (":", "Page"),
    ("i", "Stats"),
    ("e", "Export"),
    ("q", "Quit"),
];

/// Bottom bar: key hints on the left, page status on the right.
#[derive(Debug, Default)]
pub struct Controls {
    pub status: Option<String>,
    pub filter_status: Option<String>,
    pub dimmed: bool,
    pub filter_active: bool,
}

impl Controls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: String, filter_status: Option<String>) -> Self {
        self.status = Some(status);
        self.filter_status = filter_status;
        self
    }

    pub fn with_dimmed(mut self, dimmed: bool) -> Self {
        self.dimmed = dimmed;
        self
    }

    pub fn with_filter_active(mut self, filter_active: bool) -> Self {
        self.filter_active = filter_active;
        self
    }

    fn status_text(&self) -> String {
        match (&self.status, &self.filter_status) {
            (Some(s), Some(f)) => format!("{f}  {s} "),
            (Some(s), None) => format!("{s} "),
            (None, _) => String::new(),
        }
    }
}

impl Widget for &Controls {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let status = self.status_text();
        let mut constraints = CONTROLS.iter().fold(vec![], |mut acc, (key, action)| {
            acc.push(Constraint::Length(key.chars().count() as u16 + 2));
            acc.push(Constraint::Length(action.chars().count() as u16 + 1));
            acc
        });
        constraints.push(Constraint::Fill(1));

        let layout = Layout::new(Direction::Horizontal, constraints).split(area);
        let color = Color::DarkGray;
        let base_style = if self.dimmed {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };

        for (i, (key, action)) in CONTROLS.iter().enumerate() {
            let j = i * 2;
            Paragraph::new(*key)
                .style(base_style.add_modifier(Modifier::BOLD))
                .centered()
                .render(layout[j], buf);
            let action_style = if *action == "Filter" && self.filter_active {
                base_style.bg(color).fg(Color::Cyan)
            } else {
                base_style.bg(color)
            };
            Paragraph::new(*action)
                .style(action_style)
                .render(layout[j + 1], buf);
        }

        Paragraph::new(status)
            .style(base_style.bg(color).fg(if self.dimmed {
                Color::DarkGray
            } else {
                Color::White
            }))
            .right_aligned()
            .render(layout[CONTROLS.len() * 2], buf);
    }
}
