use crate::app::AppState;
use crate::model::format_age;
use crate::tree::RootStatus;
use crate::tui::spinner;
use chrono::Utc;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

/// Version and source on the first line; the root's breadcrumb and
/// timestamps on the second.
pub fn render(f: &mut Frame, area: Rect, state: &AppState) {
    let mut spans = vec![
        Span::styled(
            format!(" {} ", state.config.version_string),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("│ "),
        Span::styled(
            state.config.source.as_str(),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
    ];

    if let Some(id) = state.tree.status().id() {
        spans.push(Span::styled(
            format!(" [{id}]"),
            Style::default().fg(Color::Yellow),
        ));
    }

    if state.is_loading() {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            spinner::frame(state.spinner_frame).to_string(),
            Style::default().fg(Color::Yellow),
        ));
    }

    if state.error_message().is_some() {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            "!",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }

    let mut lines = vec![Line::from(spans)];
    if let (RootStatus::Ready(_), Some(root)) = (state.tree.status(), state.tree.arena().root_entry()) {
        let node = &root.node;
        let mut crumbs: Vec<String> = node.breadcrumb().iter().map(ToString::to_string).collect();
        crumbs.push(node.headline().to_string());
        let mut stamp = format!(
            "  {} · {}",
            node.submitter.username,
            format_age(node.created_at, Utc::now())
        );
        if node.was_edited() {
            stamp.push_str(&format!(
                " · edited {}",
                format_age(node.updated_at, Utc::now())
            ));
        }
        lines.push(Line::from(vec![
            Span::styled(
                format!(" {}", crumbs.join(" › ")),
                Style::default().fg(Color::White),
            ),
            Span::styled(stamp, Style::default().fg(Color::DarkGray)),
        ]));
    }

    let header = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray)),
    );

    f.render_widget(header, area);
}
