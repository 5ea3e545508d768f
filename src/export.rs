//! Page output for the grid boundary: JSON and a standalone HTML table.

use color_eyre::Result;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::render_cache::CacheStats;
use crate::view::{Align, DisplayPage, HintKind};

pub fn page_to_json(page: &DisplayPage) -> Result<String> {
    Ok(serde_json::to_string_pretty(page)?)
}

pub fn stats_to_json(stats: &CacheStats) -> Result<String> {
    Ok(serde_json::to_string_pretty(stats)?)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn align_css(align: Align) -> &'static str {
    match align {
        Align::Left => "left",
        Align::Center => "center",
        Align::Right => "right",
    }
}

fn cell_style(width: Option<u32>, align: Align) -> String {
    match width {
        Some(w) => format!(
            "width:{w}px;min-width:{w}px;max-width:{w}px;text-align:{}",
            align_css(align)
        ),
        None => format!("text-align:{}", align_css(align)),
    }
}

/// Renders the page as a self-contained HTML document. Artifacts are inlined as
/// SVG inside a `<div>`; every other cell is escaped text.
pub fn page_to_html(page: &DisplayPage, title: &str) -> String {
    let mut html = String::new();
    let _ = writeln!(html, "<!DOCTYPE html>");
    let _ = writeln!(
        html,
        "<html><head><meta charset=\"utf-8\"><title>{}</title>",
        escape_html(title)
    );
    html.push_str(
        "<style>table{border-collapse:collapse;font-family:sans-serif;font-size:13px}\
         th,td{border:1px solid #ccc;padding:2px 6px;vertical-align:middle}\
         th{background:#f3f3f3}</style></head><body>\n",
    );
    let _ = writeln!(html, "<p>{}</p>", escape_html(&page.status()));
    if let Some(filtered) = page.filter_status() {
        let _ = writeln!(html, "<p>{}</p>", escape_html(&filtered));
    }

    html.push_str("<table>\n<thead><tr>");
    for hint in &page.columns {
        let _ = write!(
            html,
            "<th style=\"{}\">{}</th>",
            cell_style(hint.width, hint.align),
            escape_html(&hint.name)
        );
    }
    html.push_str("</tr></thead>\n<tbody>\n");

    for row in &page.rows {
        html.push_str("<tr>");
        let mut values = row.values().iter();
        for hint in &page.columns {
            let style = cell_style(hint.width, hint.align);
            let content = match hint.kind {
                HintKind::Index => row.display_index.to_string(),
                HintKind::Artifact if row.artifact.is_empty() => String::new(),
                HintKind::Artifact => format!("<div>{}</div>", row.artifact.as_str()),
                HintKind::Numeric | HintKind::Text => values
                    .next()
                    .map(|v| escape_html(&v.to_string()))
                    .unwrap_or_default(),
            };
            let _ = write!(html, "<td style=\"{style}\">{content}</td>");
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>\n</body></html>\n");
    html
}

pub fn write_html(page: &DisplayPage, title: &str, path: &Path) -> Result<()> {
    fs::write(path, page_to_html(page, title))?;
    info!(path = %path.display(), rows = page.rows.len(), "exported page to HTML");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::molecules;
    use crate::filter::FilterState;
    use crate::paginator::PaginationState;
    use crate::render::{Artifact, RenderKey};
    use crate::render_cache::RenderCache;
    use crate::view::render;

    fn page() -> DisplayPage {
        let ds = molecules();
        let cache = RenderCache::with_capacity(8);
        let renderer = |key: &RenderKey| -> std::result::Result<Artifact, crate::error::RenderError> {
            Ok(Artifact::new(format!("<svg>{}</svg>", key.as_str().len())))
        };
        render(
            &ds,
            &FilterState::new(),
            &PaginationState::new(2),
            &cache,
            &renderer,
        )
        .unwrap()
    }

    #[test]
    fn test_html_layout() {
        let html = page_to_html(&page(), "mols <1>");
        assert!(html.contains("<title>mols &lt;1&gt;</title>"));
        assert!(html.contains("<div><svg>3</svg></div>"));
        assert!(html.contains("width:60px;min-width:60px;max-width:60px;text-align:right"));
        assert!(html.contains("text-align:right\">46.07</td>"));
        assert!(html.contains("text-align:left\">ethanol</td>"));
        assert_eq!(html.matches("<tr>").count(), 3);
        assert!(html.contains("Showing rows 1\u{2013}2 of 6 (6 total)"));
    }

    #[test]
    fn test_json_rows_carry_display_index() {
        let json = page_to_json(&page()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let rows = value["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["displayIndex"], 1);
        assert_eq!(rows[1]["Name"], "benzene");
        assert_eq!(value["window"]["totalPages"], 3);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
    }
}
