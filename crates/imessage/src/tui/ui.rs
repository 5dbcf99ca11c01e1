use chrono::Local;
use imessage_core::Message;
use imessage_core::model::format::{short_time, truncate};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use super::app::{App, Focus};

const LIST_WIDTH: u16 = 35;
const INPUT_HEIGHT: u16 = 3;
const MAX_NAME: usize = 30;
const MAX_SENDER: usize = 20;

const CONVERSATION_HINTS: &str =
    "[CONV] ↑↓:Nav  Enter:Select  Tab:Switch  i:Input  r:Refresh  q:Quit";
const MESSAGE_HINTS: &str = "[MSG] ↑↓:Scroll  g/G:Top/Bottom  h/←:Back  i:Input  r:Refresh  q:Quit";
const INPUT_HINTS: &str = "[INPUT] Enter:Send  Esc:Cancel";

pub fn render(f: &mut Frame, app: &mut App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(f.size());
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(LIST_WIDTH), Constraint::Min(0)])
        .split(rows[0]);
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(INPUT_HEIGHT)])
        .split(columns[1]);

    render_conversations(f, app, columns[0]);
    render_messages(f, app, right[0]);
    render_input(f, app, right[1]);
    render_status(f, app, rows[1]);
}

fn border(title: String, focused: bool) -> Block<'static> {
    let style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(style)
}

fn render_conversations(f: &mut Frame, app: &App, area: Rect) {
    let now = Local::now();
    let items: Vec<ListItem> = app
        .conversations()
        .iter()
        .map(|conv| {
            let mut name_style = Style::default();
            let name = if conv.unread_count > 0 {
                name_style = name_style.add_modifier(Modifier::BOLD);
                truncate(&format!("({}) {}", conv.unread_count, conv.title()), MAX_NAME)
            } else {
                truncate(conv.title(), MAX_NAME)
            };
            let when = conv
                .last_message_date
                .map(|date| short_time(date, &now))
                .unwrap_or_default();
            let preview = truncate(&conv.last_message_text, MAX_NAME.saturating_sub(when.len() + 1));
            ListItem::new(vec![
                Line::from(Span::styled(name, name_style)),
                Line::from(Span::styled(
                    format!("{when} {preview}"),
                    Style::default().fg(Color::DarkGray),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(border(
            " Conversations ".to_string(),
            app.focus() == Focus::Conversations,
        ))
        .highlight_style(
            Style::default()
                .bg(Color::Cyan)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = ListState::default();
    if !app.conversations().is_empty() {
        state.select(Some(app.highlighted()));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn render_messages(f: &mut Frame, app: &mut App, area: Rect) {
    let title = app
        .selected_conversation()
        .map_or_else(|| " Messages ".to_string(), |conv| format!(" {} ", conv.title()));
    let block = border(title, app.focus() == Focus::Messages);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let notice = if app.conversations().is_empty() {
        Some(
            "No conversations found. Make sure Messages is configured and Full Disk Access is granted.",
        )
    } else if app.messages().is_empty() && app.is_loading() {
        Some("Loading messages...")
    } else if app.messages().is_empty() {
        Some("No messages")
    } else {
        None
    };
    if let Some(notice) = notice {
        let text = Paragraph::new(Span::styled(notice, Style::default().fg(Color::Yellow)));
        f.render_widget(text, inner);
        return;
    }

    let now = Local::now();
    let width = usize::from(inner.width);
    let lines: Vec<Line> = app
        .messages()
        .iter()
        .flat_map(|msg| message_lines(msg, &now, width))
        .collect();

    let height = usize::from(inner.height);
    let max_scroll = lines.len().saturating_sub(height);
    app.clamp_scroll(max_scroll);
    let offset = max_scroll - app.scroll();
    let visible: Vec<Line> = lines.into_iter().skip(offset).take(height).collect();
    f.render_widget(Paragraph::new(visible), inner);
}

fn message_lines(
    msg: &Message,
    now: &chrono::DateTime<Local>,
    width: usize,
) -> Vec<Line<'static>> {
    let when = msg
        .date
        .map_or_else(|| "--:--".to_string(), |date| short_time(date, now));
    let (who, color) = if msg.is_from_me {
        ("Me".to_string(), Color::Green)
    } else {
        (truncate(&msg.sender, MAX_SENDER), Color::Cyan)
    };
    let prefix = format!("[{when}] {who}:");
    let wrapped = wrap(&format!("{prefix} {}", msg.text), width);

    let prefix_chars = prefix.chars().count();
    let style = Style::default().fg(color);
    wrapped
        .into_iter()
        .enumerate()
        .map(|(index, line)| {
            if index > 0 {
                return Line::from(line);
            }
            let split = line
                .char_indices()
                .nth(prefix_chars)
                .map_or(line.len(), |(at, _)| at);
            let (head, tail) = line.split_at(split);
            Line::from(vec![
                Span::styled(head.to_string(), style),
                Span::raw(tail.to_string()),
            ])
        })
        .collect()
}

/// Greedy word wrap on character counts. Words longer than `width` are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for raw in text.split('\n') {
        let mut line = String::new();
        let mut len = 0;
        for word in raw.split(' ') {
            let word_len = word.chars().count();
            if len > 0 && len + 1 + word_len > width {
                lines.push(std::mem::take(&mut line));
                len = 0;
            }
            if len > 0 {
                line.push(' ');
                len += 1;
            }
            for c in word.chars() {
                if len == width {
                    lines.push(std::mem::take(&mut line));
                    len = 0;
                }
                line.push(c);
                len += 1;
            }
        }
        lines.push(line);
    }
    lines
}

fn render_input(f: &mut Frame, app: &App, area: Rect) {
    let focused = app.focus() == Focus::Input;
    let block = border(" Send ".to_string(), focused);
    let inner = block.inner(area);

    let width = usize::from(inner.width.saturating_sub(1));
    let shown: String = {
        let count = app.input().chars().count();
        app.input().chars().skip(count.saturating_sub(width)).collect()
    };
    let cursor = u16::try_from(shown.chars().count()).unwrap_or(inner.width);
    f.render_widget(Paragraph::new(shown).block(block), area);

    if focused {
        f.set_cursor(inner.x + cursor, inner.y);
    }
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let (text, background) = match app.status() {
        Some(status) if status.is_problem() => (status.to_string(), Color::Red),
        Some(status) => (status.to_string(), Color::Green),
        None => {
            let hints = match app.focus() {
                Focus::Conversations => CONVERSATION_HINTS,
                Focus::Messages => MESSAGE_HINTS,
                Focus::Input => INPUT_HINTS,
            };
            (hints.to_string(), Color::DarkGray)
        }
    };
    let bar = Paragraph::new(format!(" {text} "))
        .alignment(Alignment::Center)
        .style(Style::default().bg(background).fg(Color::White));
    f.render_widget(bar, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_breaks_on_words() {
        assert_eq!(wrap("the quick brown fox", 10), vec!["the quick", "brown fox"]);
        assert_eq!(wrap("short", 10), vec!["short"]);
    }

    #[test]
    fn test_wrap_splits_long_words_and_keeps_newlines() {
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap("one\ntwo", 10), vec!["one", "two"]);
        assert_eq!(wrap("", 10), vec![""]);
    }

    #[test]
    fn test_message_prefix_is_styled() {
        let msg = imessage_core::Message::new(imessage_core::MessageId(1), imessage_core::ChatId(1), "hello there")
            .with_sender("Ann");
        let lines = message_lines(&msg, &Local::now(), 80);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].spans[0].content, "[--:--] Ann:");
        assert_eq!(lines[0].spans[1].content, " hello there");
    }
}
