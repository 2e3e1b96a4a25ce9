use crate::app::{Composer, ComposerMode, Field};
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

fn field_line<'a>(label: &'a str, value: &'a str, active: bool) -> Line<'a> {
    let label_style = if active {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let mut spans = vec![
        Span::styled(format!("{label:>6}: "), label_style),
        Span::styled(value, Style::default().fg(Color::White)),
    ];
    if active {
        spans.push(Span::styled("▏", Style::default().fg(Color::Cyan)));
    }
    Line::from(spans)
}

pub fn render(f: &mut Frame, composer: &Composer, error: Option<&str>) {
    let area = f.area();

    let width = 64u16.min(area.width);
    let height = 9u16.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let overlay_area = Rect::new(x, y, width, height);

    f.render_widget(Clear, overlay_area);

    let title = match composer.mode {
        ComposerMode::Reply => format!(" Reply to {} ", composer.target),
        ComposerMode::Edit => format!(" Edit {} ", composer.target),
    };
    let hints = Line::from(vec![
        Span::styled("Tab", Style::default().fg(Color::Cyan)),
        Span::styled(" field  ", Style::default().fg(Color::DarkGray)),
        Span::styled("Enter", Style::default().fg(Color::Green)),
        Span::styled(" send  ", Style::default().fg(Color::DarkGray)),
        Span::styled("Esc", Style::default().fg(Color::Red)),
        Span::styled(" cancel ", Style::default().fg(Color::DarkGray)),
    ]);

    let block = Block::default()
        .title(title)
        .title_bottom(hints.centered())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .style(Style::default().bg(Color::Black));

    let mut lines = vec![
        Line::from(""),
        field_line("Title", &composer.title, composer.field == Field::Title),
        field_line("Body", &composer.body, composer.field == Field::Body),
        Line::from(""),
    ];
    if composer.submitted {
        lines.push(Line::styled("sending…", Style::default().fg(Color::Yellow)));
    } else if let Some(error) = error {
        lines.push(Line::styled(error, Style::default().fg(Color::Red)));
    }

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    f.render_widget(paragraph, overlay_area);
}
