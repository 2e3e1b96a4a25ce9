use crate::action::ControlState;
use crate::app::AppState;
use crate::arena::LoadState;
use crate::config::{INDENT_WIDTH, NARROW_WIDTH_THRESHOLD};
use crate::model::format_age;
use crate::tree::RootStatus;
use crate::tui::spinner;
use crate::view::Row;
use chrono::{DateTime, Utc};
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub fn render(f: &mut Frame, area: Rect, state: &AppState) {
    let placeholder = match state.tree.status() {
        RootStatus::Ready(_) => None,
        RootStatus::Unmounted => Some(Line::styled(
            "No thread open",
            Style::default().fg(Color::DarkGray),
        )),
        RootStatus::Loading(id) => Some(Line::styled(
            format!("{} Loading {id}…", spinner::frame(state.spinner_frame)),
            Style::default().fg(Color::Yellow),
        )),
        RootStatus::Failed(_, error) => Some(Line::from(vec![
            Span::styled(format!("✗ {error}"), Style::default().fg(Color::Red)),
            Span::styled("  (R to retry)", Style::default().fg(Color::DarkGray)),
        ])),
        RootStatus::Removed(id) => Some(Line::styled(
            format!("{id} was deleted"),
            Style::default().fg(Color::DarkGray),
        )),
    };
    if let Some(line) = placeholder {
        let para = Paragraph::new(line)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::NONE));
        f.render_widget(para, area);
        return;
    }

    let narrow = area.width < NARROW_WIDTH_THRESHOLD;
    let max_width = area.width as usize;
    let visible_height = area.height as usize;
    let scroll_offset = if state.cursor >= visible_height {
        state.cursor - visible_height + 1
    } else {
        0
    };
    let now = Utc::now();

    let lines: Vec<Line> = state
        .tree
        .rows()
        .iter()
        .enumerate()
        .skip(scroll_offset)
        .take(visible_height)
        .map(|(i, row)| render_row(row, i == state.cursor, state.spinner_frame, narrow, max_width, now))
        .collect();

    let tree = Paragraph::new(lines).block(Block::default().borders(Borders::NONE));
    f.render_widget(tree, area);
}

fn truncate(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut width = 0;
    for c in s.chars() {
        let cw = UnicodeWidthChar::width(c).unwrap_or(0);
        if width + cw + 1 > max_width {
            result.push('…');
            break;
        }
        result.push(c);
        width += cw;
    }
    result
}

fn marker(row: &Row, spinner_frame: usize) -> (String, Color) {
    let entry = row.entry;
    match &entry.load {
        LoadState::Loading => (spinner::frame(spinner_frame).to_string(), Color::Yellow),
        LoadState::Errored(_) => ("✗".to_string(), Color::Red),
        LoadState::NotStarted if entry.node.child_count > 0 => ("▶".to_string(), Color::Blue),
        LoadState::Loaded if !entry.children.is_empty() => ("▼".to_string(), Color::DarkGray),
        _ => ("·".to_string(), Color::DarkGray),
    }
}

/// Trailing status: load errors, unloaded replies, open dialogs.
fn status_span(row: &Row) -> Option<Span<'static>> {
    let entry = row.entry;
    if let Some(error) = entry.load.error() {
        return Some(Span::styled(
            format!(" {error} (R retry)"),
            Style::default().fg(Color::Red),
        ));
    }
    if let Some(kind) = entry.actions.active() {
        let label = if entry.actions.is_submitting() {
            format!(" [{kind}…]")
        } else {
            format!(" [{kind}]")
        };
        return Some(Span::styled(label, Style::default().fg(Color::Magenta)));
    }
    if entry.reply.is_in_flight() {
        return Some(Span::styled(" replying…", Style::default().fg(Color::Yellow)));
    }
    if let Some(error) = entry.reply.error() {
        return Some(Span::styled(format!(" {error}"), Style::default().fg(Color::Red)));
    }
    if matches!(entry.load, LoadState::NotStarted) && row.hidden_replies() > 0 {
        let n = row.hidden_replies();
        let noun = if n == 1 { "reply" } else { "replies" };
        return Some(Span::styled(
            format!(" {n} more {noun} (x)"),
            Style::default().fg(Color::Blue),
        ));
    }
    None
}

fn render_row(
    row: &Row,
    is_selected: bool,
    spinner_frame: usize,
    narrow: bool,
    max_width: usize,
    now: DateTime<Utc>,
) -> Line<'static> {
    let entry = row.entry;
    let node = &entry.node;
    let indent = " ".repeat(row.depth * INDENT_WIDTH);
    let (marker, marker_color) = marker(row, spinner_frame);

    let points_style = match &entry.boost {
        ControlState::InFlight => Style::default().fg(Color::Yellow),
        ControlState::Failed { .. } => Style::default().fg(Color::Red),
        ControlState::Ready => Style::default().fg(Color::Green),
    };
    let points = format!("▲{} ", node.points);

    let meta = if narrow {
        String::new()
    } else {
        let edited = if node.was_edited() { " (edited)" } else { "" };
        format!(
            " {} {}{edited}",
            node.submitter.username,
            format_age(node.created_at, now)
        )
    };
    let status = status_span(row);

    let used = UnicodeWidthStr::width(indent.as_str())
        + UnicodeWidthStr::width(marker.as_str())
        + 1
        + points.len()
        + UnicodeWidthStr::width(meta.as_str())
        + status.as_ref().map_or(0, Span::width);
    let headline = truncate(node.headline(), max_width.saturating_sub(used).max(1));

    let select_style = if is_selected {
        Style::default().add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    };

    let mut spans = vec![
        Span::raw(indent),
        Span::styled(format!("{marker} "), Style::default().fg(marker_color)),
        Span::styled(points, points_style),
        Span::styled(headline, select_style),
        Span::styled(meta, Style::default().fg(Color::DarkGray)),
    ];
    spans.extend(status);
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_width() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer headline", 8), "a longe…");
        assert_eq!(UnicodeWidthStr::width(truncate("日本語のタイトル", 7).as_str()), 7);
    }
}
