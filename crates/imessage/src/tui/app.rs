//! Terminal UI state. Only the render loop touches it.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use imessage_core::{ChatId, Conversation, Message, RenderUpdate, Status};

/// Pane that receives keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Conversations,
    Messages,
    Input,
}

/// Work the render loop hands to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Select(ChatId),
    Send(String),
    Refresh,
}

#[derive(Debug)]
pub struct App {
    conversations: Vec<Conversation>,
    highlighted: usize,
    selected: Option<ChatId>,
    messages: Vec<Message>,
    loading: bool,
    focus: Focus,
    input: String,
    status: Option<Status>,
    /// Lines scrolled up from the newest message.
    scroll: usize,
    should_quit: bool,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub const fn new() -> Self {
        Self {
            conversations: Vec::new(),
            highlighted: 0,
            selected: None,
            messages: Vec::new(),
            loading: false,
            focus: Focus::Conversations,
            input: String::new(),
            status: None,
            scroll: 0,
            should_quit: false,
        }
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub const fn highlighted(&self) -> usize {
        self.highlighted
    }

    pub const fn selected(&self) -> Option<ChatId> {
        self.selected
    }

    pub fn selected_conversation(&self) -> Option<&Conversation> {
        let selected = self.selected?;
        self.conversations.iter().find(|conv| conv.id == selected)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    pub const fn focus(&self) -> Focus {
        self.focus
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub const fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub const fn scroll(&self) -> usize {
        self.scroll
    }

    pub const fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Applies one queued update from the session.
    pub fn apply(&mut self, update: RenderUpdate) {
        match update {
            RenderUpdate::Conversations(conversations) => {
                self.conversations = conversations;
                self.highlighted = self
                    .highlighted
                    .min(self.conversations.len().saturating_sub(1));
            }
            RenderUpdate::MessagesLoading { chat_id } => {
                if self.selected.is_none() {
                    self.selected = Some(chat_id);
                }
                if self.selected == Some(chat_id) {
                    self.loading = true;
                }
            }
            RenderUpdate::Messages { chat_id, messages } => {
                if self.selected == Some(chat_id) {
                    self.messages = messages;
                    self.loading = false;
                }
            }
            RenderUpdate::RestoreInput(text) => self.restore_input(text),
            RenderUpdate::Status(status) => self.status = Some(status),
        }
    }

    /// Puts back text the session refused to send.
    pub fn reject_send(&mut self, text: String, status: Status) {
        self.restore_input(text);
        self.status = Some(status);
    }

    fn restore_input(&mut self, text: String) {
        if self.input.is_empty() {
            self.input = text;
        } else {
            self.input = format!("{text} {}", self.input);
        }
    }

    fn set_focus(&mut self, focus: Focus) {
        self.focus = focus;
        self.status = None;
    }

    /// Handles a key press, returning work for the session if any.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return None;
        }
        if self.focus == Focus::Input {
            return self.handle_input_key(key);
        }

        match key.code {
            KeyCode::Char('q' | 'Q') => self.should_quit = true,
            KeyCode::Char('i') => self.set_focus(Focus::Input),
            KeyCode::Char('r' | 'R') => return Some(Action::Refresh),
            KeyCode::Tab => {
                let next = if self.focus == Focus::Conversations {
                    Focus::Messages
                } else {
                    Focus::Conversations
                };
                self.set_focus(next);
            }
            KeyCode::Char('h') | KeyCode::Left if self.focus == Focus::Messages => {
                self.set_focus(Focus::Conversations);
            }
            KeyCode::Char('l') | KeyCode::Right | KeyCode::Enter
                if self.focus == Focus::Conversations =>
            {
                self.set_focus(Focus::Messages);
            }
            KeyCode::Char('j') | KeyCode::Down => return self.move_down(),
            KeyCode::Char('k') | KeyCode::Up => return self.move_up(),
            KeyCode::Char('g') if self.focus == Focus::Messages => self.scroll = usize::MAX,
            KeyCode::Char('G') if self.focus == Focus::Messages => self.scroll = 0,
            _ => {}
        }
        None
    }

    fn handle_input_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Enter => {
                let text = std::mem::take(&mut self.input).trim().to_string();
                self.set_focus(Focus::Messages);
                if !text.is_empty() {
                    return Some(Action::Send(text));
                }
            }
            KeyCode::Esc => self.set_focus(Focus::Messages),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => self.input.push(c),
            _ => {}
        }
        None
    }

    fn move_down(&mut self) -> Option<Action> {
        if self.focus == Focus::Messages {
            self.scroll = self.scroll.saturating_sub(1);
            return None;
        }
        if self.highlighted + 1 < self.conversations.len() {
            self.highlighted += 1;
        }
        self.select_highlighted()
    }

    fn move_up(&mut self) -> Option<Action> {
        if self.focus == Focus::Messages {
            self.scroll = self.scroll.saturating_add(1);
            return None;
        }
        self.highlighted = self.highlighted.saturating_sub(1);
        self.select_highlighted()
    }

    fn select_highlighted(&mut self) -> Option<Action> {
        let chat_id = self.conversations.get(self.highlighted)?.id;
        if self.selected == Some(chat_id) {
            return None;
        }
        self.selected = Some(chat_id);
        self.messages.clear();
        self.loading = true;
        self.scroll = 0;
        Some(Action::Select(chat_id))
    }

    /// Clamps the scroll offset once the visible height is known.
    pub fn clamp_scroll(&mut self, max: usize) {
        self.scroll = self.scroll.min(max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imessage_core::MessageId;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn conversations(count: i64) -> Vec<Conversation> {
        (1..=count)
            .map(|id| Conversation::new(ChatId(id), format!("+1555000{id}"), format!("Chat {id}")))
            .collect()
    }

    fn loaded_app() -> App {
        let mut app = App::new();
        app.apply(RenderUpdate::Conversations(conversations(3)));
        app.apply(RenderUpdate::MessagesLoading { chat_id: ChatId(1) });
        app.apply(RenderUpdate::Messages {
            chat_id: ChatId(1),
            messages: vec![Message::new(MessageId(1), ChatId(1), "hi")],
        });
        app
    }

    #[test]
    fn test_initial_load_adopts_first_selection() {
        let app = loaded_app();
        assert_eq!(app.selected(), Some(ChatId(1)));
        assert_eq!(app.messages().len(), 1);
        assert!(!app.is_loading());
    }

    #[test]
    fn test_moving_highlight_selects_conversation() {
        let mut app = loaded_app();
        assert_eq!(app.handle_key(key(KeyCode::Down)), Some(Action::Select(ChatId(2))));
        assert_eq!(app.selected(), Some(ChatId(2)));
        assert!(app.messages().is_empty());
        assert!(app.is_loading());

        assert_eq!(app.handle_key(key(KeyCode::Char('k'))), Some(Action::Select(ChatId(1))));
        assert_eq!(app.handle_key(key(KeyCode::Up)), None);
    }

    #[test]
    fn test_messages_for_other_conversation_are_ignored() {
        let mut app = loaded_app();
        app.handle_key(key(KeyCode::Down));
        app.apply(RenderUpdate::Messages {
            chat_id: ChatId(1),
            messages: vec![Message::new(MessageId(9), ChatId(1), "late")],
        });
        assert!(app.messages().is_empty());
        assert!(app.is_loading());
    }

    #[test]
    fn test_highlight_kept_when_valid_and_clamped_otherwise() {
        let mut app = loaded_app();
        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.highlighted(), 2);

        app.apply(RenderUpdate::Conversations(conversations(5)));
        assert_eq!(app.highlighted(), 2);

        app.apply(RenderUpdate::Conversations(conversations(2)));
        assert_eq!(app.highlighted(), 1);

        app.apply(RenderUpdate::Conversations(Vec::new()));
        assert_eq!(app.highlighted(), 0);
    }

    #[test]
    fn test_input_send_and_cancel() {
        let mut app = loaded_app();
        app.handle_key(key(KeyCode::Char('i')));
        assert_eq!(app.focus(), Focus::Input);
        for c in "see you".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        // Keys that are commands elsewhere are text here.
        app.handle_key(key(KeyCode::Char('q')));
        app.handle_key(key(KeyCode::Backspace));
        assert_eq!(app.input(), "see you");
        assert!(!app.should_quit());

        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            Some(Action::Send("see you".into()))
        );
        assert_eq!(app.input(), "");
        assert_eq!(app.focus(), Focus::Messages);

        app.handle_key(key(KeyCode::Char('i')));
        app.handle_key(key(KeyCode::Char(' ')));
        assert_eq!(app.handle_key(key(KeyCode::Enter)), None);
        app.handle_key(key(KeyCode::Char('i')));
        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.focus(), Focus::Messages);
    }

    #[test]
    fn test_rejected_send_restores_text() {
        let mut app = loaded_app();
        app.reject_send("hello".into(), Status::SendBusy);
        assert_eq!(app.input(), "hello");
        assert_eq!(app.status(), Some(&Status::SendBusy));

        app.apply(RenderUpdate::RestoreInput("first".into()));
        assert_eq!(app.input(), "first hello");
    }

    #[test]
    fn test_focus_keys() {
        let mut app = loaded_app();
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.focus(), Focus::Messages);
        app.handle_key(key(KeyCode::Char('h')));
        assert_eq!(app.focus(), Focus::Conversations);
        app.handle_key(key(KeyCode::Right));
        assert_eq!(app.focus(), Focus::Messages);
        app.handle_key(key(KeyCode::Left));
        assert_eq!(app.focus(), Focus::Conversations);
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.focus(), Focus::Messages);
    }

    #[test]
    fn test_message_scrolling() {
        let mut app = loaded_app();
        app.handle_key(key(KeyCode::Tab));
        app.handle_key(key(KeyCode::Char('k')));
        app.handle_key(key(KeyCode::Char('k')));
        assert_eq!(app.scroll(), 2);
        app.handle_key(key(KeyCode::Char('j')));
        assert_eq!(app.scroll(), 1);
        app.handle_key(key(KeyCode::Char('g')));
        app.clamp_scroll(10);
        assert_eq!(app.scroll(), 10);
        app.handle_key(key(KeyCode::Char('G')));
        assert_eq!(app.scroll(), 0);
    }

    #[test]
    fn test_refresh_and_quit() {
        let mut app = loaded_app();
        assert_eq!(app.handle_key(key(KeyCode::Char('r'))), Some(Action::Refresh));
        app.handle_key(key(KeyCode::Char('q')));
        assert!(app.should_quit());

        let mut app = loaded_app();
        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit());
    }

    #[test]
    fn test_status_cleared_on_focus_change() {
        let mut app = loaded_app();
        app.apply(RenderUpdate::Status(Status::Sent));
        assert_eq!(app.status(), Some(&Status::Sent));
        app.handle_key(key(KeyCode::Tab));
        assert!(app.status().is_none());
    }
}
