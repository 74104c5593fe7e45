use ratatui::{
    Frame,
    layout::{Constraint, Layout, Margin, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Clear, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Wrap,
    },
};

use crate::app::{App, InputMode};
use crate::controller::Phase;
use crate::feedback::FEEDBACK_OPTIONS;
use crate::transcript::Turn;

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str, base: Style) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("**") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("**") else {
            break;
        };
        if close == 0 {
            // "****" has nothing to embolden
            spans.push(Span::styled(rest[..open + 4].to_string(), base));
            rest = &after_open[2..];
            continue;
        }

        if open > 0 {
            spans.push(Span::styled(rest[..open].to_string(), base));
        }
        spans.push(Span::styled(
            after_open[..close].to_string(),
            base.add_modifier(Modifier::BOLD),
        ));
        rest = &after_open[close + 2..];
    }

    if !rest.is_empty() {
        spans.push(Span::styled(rest.to_string(), base));
    }

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    // Popups: the alert wins over the feedback dialog
    if let Some(alert) = app.snapshot.alert.clone() {
        render_alert(&alert, frame, area);
    } else if app.show_feedback {
        render_feedback_dialog(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" Storyteller ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(app.base_url.clone(), Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" EDIT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    let hints = if app.snapshot.alert.is_some() {
        "any key: dismiss"
    } else if app.show_feedback {
        "j/k: move  space: toggle  enter: submit  esc: cancel"
    } else {
        match app.input_mode {
            InputMode::Editing => "enter: send  esc: normal mode  ↑/↓: scroll  ctrl-c: quit",
            InputMode::Normal => "i: type  j/k: scroll  g/G: top/bottom  t: thoughts  f: feedback  q: quit",
        }
    };

    let footer = Line::from(vec![
        Span::styled(mode_text, mode_style),
        Span::raw(" "),
        Span::styled(hints, Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(footer), area);
}

fn chat_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let story_label = || {
        Line::from(Span::styled(
            "Story:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ))
    };

    for turn in app.snapshot.transcript.turns() {
        match turn {
            Turn::User(text) => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                lines.extend(text.lines().map(|l| Line::from(l.to_string())));
            }
            Turn::Reply { thoughts, output } => {
                let marker = if app.show_thoughts { "▾" } else { "▸" };
                lines.push(Line::from(Span::styled(
                    format!("{} Thought Process", marker),
                    Style::default().fg(Color::DarkGray),
                )));
                if app.show_thoughts {
                    let style = Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::ITALIC);
                    lines.extend(thoughts.lines().map(|l| parse_markdown_line(l, style)));
                }
                lines.push(story_label());
                lines.extend(
                    output
                        .lines()
                        .map(|l| parse_markdown_line(l, Style::default())),
                );
            }
            Turn::Notice(text) => {
                let style = Style::default().fg(Color::Red).add_modifier(Modifier::ITALIC);
                lines.extend(text.lines().map(|l| Line::from(Span::styled(l.to_string(), style))));
            }
        }
        lines.push(Line::default());
    }

    // Animated ellipsis: cycles through ".", "..", "..."
    let dots = ".".repeat((app.animation_frame as usize) + 1);
    let pending_style = Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC);
    match app.snapshot.phase {
        Some(Phase::Moderating) => {
            lines.push(Line::from(Span::styled(format!("Checking prompt{}", dots), pending_style)));
        }
        Some(Phase::Waiting(_)) => {
            lines.push(story_label());
            lines.push(Line::from(Span::styled(format!("Thinking{}", dots), pending_style)));
        }
        None => {}
    }

    lines
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if app.input_mode == InputMode::Normal {
            Color::Cyan
        } else {
            Color::DarkGray
        }))
        .title(" Conversation ");

    let lines = chat_lines(app);
    let text = if lines.is_empty() {
        Text::from(Span::styled(
            "Connecting to the storyteller...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::from(lines)
    };

    // Row count comes from the same word wrapper that draws the paragraph
    let chat = Paragraph::new(text).wrap(Wrap { trim: false });
    let inner_width = area.width.saturating_sub(2);
    let inner_height = area.height.saturating_sub(2);
    let total_rows = chat.line_count(inner_width).min(u16::MAX as usize) as u16;
    app.update_chat_metrics(total_rows, inner_height);

    let chat = chat.block(block).scroll((app.chat_scroll, 0));
    frame.render_widget(chat, area);

    if app.chat_total_lines > app.chat_height {
        let mut scrollbar_state = ScrollbarState::new(app.chat_total_lines.saturating_sub(app.chat_height) as usize)
            .position(app.chat_scroll as usize);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area.inner(Margin { vertical: 1, horizontal: 0 }),
            &mut scrollbar_state,
        );
    }
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let enabled = app.snapshot.input_enabled();
    let border_color = if !enabled {
        Color::DarkGray
    } else if app.input_mode == InputMode::Editing {
        Color::Yellow
    } else {
        Color::Gray
    };
    let title = if enabled {
        " Prompt "
    } else {
        " Prompt (waiting for the storyteller) "
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Horizontal scroll keeps the cursor inside the box
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width > 0 && app.cursor >= inner_width {
        app.cursor - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app.input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(if enabled { Color::Cyan } else { Color::DarkGray }))
        .block(block);
    frame.render_widget(input, area);

    if app.input_mode == InputMode::Editing && app.snapshot.alert.is_none() && !app.show_feedback {
        let cursor_x = (app.cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    Rect::new(
        area.x + (area.width.saturating_sub(width)) / 2,
        area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    )
}

fn render_feedback_dialog(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup_width = FEEDBACK_OPTIONS
        .iter()
        .map(|option| option.label.chars().count() as u16 + 10)
        .max()
        .unwrap_or(40)
        .max(44);
    let popup_area = centered(area, popup_width, FEEDBACK_OPTIONS.len() as u16 + 2);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Feedback Options (Space to toggle, Enter to submit) ");

    let items: Vec<ListItem> = FEEDBACK_OPTIONS
        .iter()
        .enumerate()
        .map(|(i, option)| {
            let checked = app.feedback_selection.is_checked(i);
            let style = if checked {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let mark = if checked { "[x]" } else { "[ ]" };
            ListItem::new(format!(" {} {} ", mark, option.label)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.feedback_state);
}

fn render_alert(message: &str, frame: &mut Frame, area: Rect) {
    let popup_width = (message.chars().count() as u16 + 6).max(30);
    let popup_area = centered(area, popup_width, 5);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Alert ");

    let text = Text::from(vec![
        Line::from(message.to_string()),
        Line::default(),
        Line::from(Span::styled(
            "Press any key to continue",
            Style::default().fg(Color::DarkGray),
        )),
    ]);

    let alert = Paragraph::new(text)
        .block(block)
        .centered()
        .wrap(Wrap { trim: true });
    frame.render_widget(alert, popup_area);
}
