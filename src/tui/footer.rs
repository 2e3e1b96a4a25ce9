use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use crate::app::AppState;
use crate::config::NARROW_WIDTH_THRESHOLD;

pub fn render(f: &mut Frame, area: Rect, state: &AppState) {
    let narrow = area.width < NARROW_WIDTH_THRESHOLD;

    let hints: &[(&str, &str)] = if state.has_composer() {
        &[("Tab", "field"), ("Enter", "send"), ("Esc", "cancel")]
    } else if state.has_confirm() {
        &[("y", "confirm"), ("n", "cancel")]
    } else if narrow {
        &[
            ("j/k", "nav"),
            ("b", "boost"),
            ("r", "reply"),
            ("e", "edit"),
            ("d", "del"),
            ("q", "quit"),
        ]
    } else {
        &[
            ("↑↓/jk", "navigate"),
            ("b", "boost"),
            ("r", "reply"),
            ("e", "edit"),
            ("d", "delete"),
            ("Enter", "focus"),
            ("u", "up"),
            ("x", "more"),
            ("R", "retry"),
            ("q", "quit"),
        ]
    };

    let line = if let Some(notif) = state.notifications.last() {
        Line::from(vec![
            Span::styled("★ ", Style::default().fg(Color::Yellow)),
            Span::styled(&notif.message, Style::default().fg(Color::Yellow)),
        ])
    } else {
        let mut spans: Vec<Span> = Vec::new();
        for (i, (key, desc)) in hints.iter().enumerate() {
            if i > 0 {
                spans.push(Span::raw(" "));
            }
            spans.push(Span::styled(*key, Style::default().fg(Color::Cyan)));
            spans.push(Span::styled(
                format!(" {desc}"),
                Style::default().fg(Color::DarkGray),
            ));
        }
        Line::from(spans)
    };

    let footer = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::TOP)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(footer, area);
}
