use crate::app::ConfirmDelete;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::Frame;

pub fn render(f: &mut Frame, confirm: &ConfirmDelete, error: Option<&str>) {
    let area = f.area();

    let width = 44u16.min(area.width);
    let height = 7u16.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let overlay_area = Rect::new(x, y, width, height);

    f.render_widget(Clear, overlay_area);

    let hints = Line::from(vec![
        Span::styled(
            "y",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(" delete   ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            "n",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
        Span::styled(" keep ", Style::default().fg(Color::DarkGray)),
    ]);

    let block = Block::default()
        .title(format!(" Delete {} ", confirm.target))
        .title_bottom(hints.centered())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .style(Style::default().bg(Color::Black));

    let message = match confirm.replies {
        0 => "Delete this post?".to_string(),
        1 => "Delete this post and its reply?".to_string(),
        n => format!("Delete this post and {n} replies?"),
    };
    let status = if confirm.submitted {
        Line::styled("deleting…", Style::default().fg(Color::Yellow))
    } else if let Some(error) = error {
        Line::styled(error.to_string(), Style::default().fg(Color::Red))
    } else {
        Line::from("")
    };

    let paragraph = Paragraph::new(vec![
        Line::from(""),
        Line::styled(message, Style::default().fg(Color::White)),
        status,
    ])
    .block(block)
    .centered();
    f.render_widget(paragraph, overlay_area);
}
