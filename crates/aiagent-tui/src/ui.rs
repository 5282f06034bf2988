use aiagent_core::{Author, ChatEntry};
use chrono::Local;
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, InputMode};

/// Style `**bold**` and `` `code` `` spans; unmatched markers stay literal
fn styled_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut plain = String::new();
    let mut rest = text;

    loop {
        let marker = match (rest.find("**"), rest.find('`')) {
            (Some(bold), Some(code)) if code < bold => Some((code, "`")),
            (Some(bold), _) => Some((bold, "**")),
            (None, Some(code)) => Some((code, "`")),
            (None, None) => None,
        };
        let Some((start, marker)) = marker else { break };

        let body_start = start + marker.len();
        plain.push_str(&rest[..start]);

        match rest[body_start..].find(marker) {
            // No closing marker: keep it as text and scan on past it
            None => {
                plain.push_str(marker);
                rest = &rest[body_start..];
            }
            Some(0) => {
                plain.push_str(&rest[start..body_start + marker.len()]);
                rest = &rest[body_start + marker.len()..];
            }
            Some(body_len) => {
                if !plain.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut plain)));
                }
                let body = rest[body_start..body_start + body_len].to_string();
                spans.push(if marker == "**" {
                    Span::styled(body, Style::default().add_modifier(Modifier::BOLD))
                } else {
                    Span::styled(body, Style::default().fg(Color::Green))
                });
                rest = &rest[body_start + body_len + marker.len()..];
            }
        }
    }

    plain.push_str(rest);
    if !plain.is_empty() {
        spans.push(Span::raw(plain));
    }

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, chat_area, status_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_status(app, frame, status_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" AI Agent ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!(" {} ", app.controller.describe_client()),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn author_line(entry: &ChatEntry) -> Line<'static> {
    let (label, color) = match entry.author() {
        Author::User => ("You", Color::Cyan),
        Author::Assistant => ("AI", Color::Yellow),
    };
    let time = entry.created_at().with_timezone(&Local).format("%H:%M");

    Line::from(vec![
        Span::styled(format!("{}:", label), Style::default().fg(color).add_modifier(Modifier::BOLD)),
        Span::styled(format!(" {}", time), Style::default().fg(Color::DarkGray)),
    ])
}

/// Kept in step with `App::chat_line_count`
fn chat_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines: Vec<Line> = Vec::new();

    for entry in &app.conversation.entries {
        lines.push(author_line(entry));
        if let Some(image) = entry.image() {
            lines.push(Line::from(Span::styled(
                format!("[image {}x{} {}]", image.width(), image.height(), image.mime_type()),
                Style::default().fg(Color::Magenta).add_modifier(Modifier::ITALIC),
            )));
        }
        match entry.author() {
            Author::User => {
                for line in entry.content().lines() {
                    lines.push(Line::from(line.to_string()));
                }
            }
            Author::Assistant => {
                for line in entry.content().lines() {
                    lines.push(styled_line(line));
                }
            }
        }
        lines.push(Line::default());
    }

    if app.conversation.awaiting_response {
        lines.push(Line::from(Span::styled(
            "AI:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Inner size minus borders, for scroll calculations
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);
    if app.follow_tail {
        app.scroll_to_bottom();
    }

    let border_color = if app.input_mode == InputMode::Normal {
        Color::Cyan
    } else {
        Color::DarkGray
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Conversation ");

    let chat = Paragraph::new(Text::from(chat_lines(app)))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let Some(status) = &app.status else { return };
    let line = Paragraph::new(Span::styled(
        format!(" {}", status),
        Style::default().fg(Color::LightRed),
    ));
    frame.render_widget(line, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let title = if app.conversation.awaiting_response {
        " Message (waiting for reply) "
    } else {
        " Message  (/image <path> [prompt] to attach a photo) "
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Horizontal scroll keeps the cursor inside the box
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 {
        0
    } else if app.cursor >= inner_width {
        app.cursor - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app.input.chars().skip(scroll_offset).take(inner_width).collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(input, area);

    if editing {
        let cursor_x = (app.cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" CHAT ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" INSERT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints: &[(&str, &str)] = match app.input_mode {
        InputMode::Normal => &[
            (" i ", " type "),
            (" j/k ", " scroll "),
            (" G ", " latest "),
            (" c ", " copy reply "),
            (" s ", " speak reply "),
            (" q ", " quit "),
        ],
        InputMode::Editing => &[(" Enter ", " send "), (" Esc ", " stop typing ")],
    };

    let spans: Vec<Span> = [Span::styled(mode_text, mode_style), Span::styled(" ", label_style)]
        .into_iter()
        .chain(hints.iter().flat_map(|(key, label)| {
            [Span::styled(*key, key_style), Span::styled(*label, label_style)]
        }))
        .collect();

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}
