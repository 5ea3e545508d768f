use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Padding, Paragraph, Row, StatefulWidget, Table, TableState, Widget},
};

use crate::view::{Align, ColumnHint, DisplayPage, DisplayRow, HintKind};

/// Terminal width given to the structure column. The SVG itself cannot be drawn in
/// a terminal, so the cell shows a short summary of the artifact.
const ARTIFACT_CELLS: u16 = 10;

/// Grid over one assembled page.
pub struct DataTable<'a> {
    page: &'a DisplayPage,
    cell_padding: u16,
    header_fg: Color,
    header_bg: Color,
    alternate_row_bg: Option<Color>,
}

impl<'a> DataTable<'a> {
    pub fn new(page: &'a DisplayPage) -> Self {
        Self {
            page,
            cell_padding: 2,
            header_fg: Color::White,
            header_bg: Color::DarkGray,
            alternate_row_bg: None,
        }
    }

    pub fn with_cell_padding(mut self, padding: u16) -> Self {
        self.cell_padding = padding;
        self
    }

    pub fn with_alternate_row_bg(mut self, color: Option<Color>) -> Self {
        self.alternate_row_bg = color;
        self
    }
}

/// What the structure column shows for a row.
pub fn artifact_summary(row: &DisplayRow) -> String {
    if row.artifact.is_empty() {
        "\u{2717}".to_string()
    } else {
        format!("\u{25c6} svg {:.1}k", row.artifact.len() as f64 / 1024.0)
    }
}

fn cell_text(hint: &ColumnHint, row: &DisplayRow, value_index: &mut usize) -> String {
    match hint.kind {
        HintKind::Index => row.display_index.to_string(),
        HintKind::Artifact => artifact_summary(row),
        HintKind::Numeric | HintKind::Text => {
            let text = row
                .values()
                .get(*value_index)
                .map(|v| v.to_string().replace(['\n', '\r'], " "))
                .unwrap_or_default();
            *value_index += 1;
            text
        }
    }
}

fn aligned(text: String, align: Align) -> Line<'static> {
    let line = Line::from(text);
    match align {
        Align::Left => line,
        Align::Center => line.centered(),
        Align::Right => line.right_aligned(),
    }
}

/// Content widths per column, header included, until the area is used up.
/// A text column that overflows is cut to the remaining width; anything after it is
/// dropped.
fn column_widths(cells: &[Vec<String>], hints: &[ColumnHint], area_width: u16, padding: u16) -> Vec<u16> {
    let mut widths = Vec::with_capacity(hints.len());
    let mut used: u16 = 0;
    for (c, hint) in hints.iter().enumerate() {
        let content = cells
            .iter()
            .map(|row| row[c].chars().count())
            .chain(std::iter::once(hint.name.chars().count()))
            .max()
            .unwrap_or(0)
            .min(u16::MAX as usize) as u16;
        let want = match hint.kind {
            HintKind::Artifact => ARTIFACT_CELLS.max(content),
            _ => content,
        };
        let overflows = used.saturating_add(want) > area_width;
        if overflows && hint.kind == HintKind::Text {
            let remaining = area_width.saturating_sub(used);
            if remaining > 0 {
                widths.push(remaining);
            }
            break;
        } else if overflows {
            break;
        }
        widths.push(want);
        used = used.saturating_add(want + padding);
    }
    widths
}

impl StatefulWidget for DataTable<'_> {
    type State = TableState;

    fn render(self, area: Rect, buf: &mut Buffer, state: &mut Self::State) {
        if self.page.rows.is_empty() {
            Paragraph::new(self.page.status())
                .centered()
                .block(
                    Block::default()
                        .borders(Borders::NONE)
                        .padding(Padding::top(area.height / 2)),
                )
                .render(area, buf);
            return;
        }

        let hints = &self.page.columns;
        let cells: Vec<Vec<String>> = self
            .page
            .rows
            .iter()
            .map(|row| {
                let mut value_index = 0;
                hints
                    .iter()
                    .map(|hint| cell_text(hint, row, &mut value_index))
                    .collect()
            })
            .collect();
        let widths = column_widths(&cells, hints, area.width, self.cell_padding);
        let visible = widths.len();

        let rows: Vec<Row> = cells
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let style = if i % 2 == 1 {
                    self.alternate_row_bg
                        .map(|c| Style::default().bg(c))
                        .unwrap_or_default()
                } else {
                    Style::default()
                };
                let cells: Vec<Cell> = row
                    .into_iter()
                    .zip(hints.iter())
                    .take(visible)
                    .map(|(text, hint)| Cell::from(aligned(text, hint.align)))
                    .collect();
                Row::new(cells).style(style)
            })
            .collect();

        let header_style = Style::default().bg(self.header_bg).fg(self.header_fg);
        let headers: Vec<Cell> = hints
            .iter()
            .take(visible)
            .map(|h| Cell::from(aligned(h.name.clone(), h.align)))
            .collect();

        if let Some(selected) = state.selected() {
            if selected >= self.page.rows.len() {
                state.select(Some(self.page.rows.len() - 1));
            }
        }

        StatefulWidget::render(
            Table::new(rows, widths.into_iter().map(Constraint::Length))
                .column_spacing(self.cell_padding)
                .header(Row::new(headers).style(header_style))
                .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED)),
            area,
            buf,
            state,
        );
    }
}

/// Full record for the selected row, one `name: value` line per column.
pub fn detail_lines(row: &DisplayRow) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(vec![
        Span::styled("#", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(row.display_index.to_string()),
        Span::raw(format!("  (source row {})", row.source_index + 1)),
    ])];
    for (name, value) in row.columns() {
        lines.push(Line::from(vec![
            Span::styled(format!("{name}: "), Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(value.to_string().replace(['\n', '\r'], " ")),
        ]));
    }
    lines
}
