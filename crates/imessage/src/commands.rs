//! One-shot commands that print to stdout and exit.

use std::fmt::Display;
use std::io::{self, IsTerminal, Write};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, FixedOffset, Local};
use imessage_core::model::format::{long_time, truncate};
use imessage_core::{
    AppleScriptSender, ChatRef, Config, ContactResolver, Error, MessageSender, MessageStore,
    SingleInstanceLock,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[91m";
const GREEN: &str = "\x1b[92m";
const YELLOW: &str = "\x1b[93m";
const BLUE: &str = "\x1b[94m";
const CYAN: &str = "\x1b[96m";

/// Conversations searched when `read` is given a list number.
const READ_LOOKUP_LIMIT: u32 = 100;

/// Messages shown when `chat` opens or refreshes.
const CHAT_HISTORY: u32 = 10;

/// ANSI coloring, on or off.
#[derive(Debug, Clone, Copy)]
struct Palette {
    enabled: bool,
}

impl Palette {
    fn paint(self, text: impl Display, codes: &[&str]) -> String {
        if self.enabled {
            format!("{}{text}{RESET}", codes.concat())
        } else {
            text.to_string()
        }
    }

    fn mark(self, ok: bool) -> String {
        if ok {
            self.paint("ok", &[GREEN])
        } else {
            self.paint("!!", &[RED])
        }
    }
}

/// Writes command output, colored only when going to a terminal.
pub struct Printer<W> {
    out: W,
    palette: Palette,
    now: DateTime<FixedOffset>,
}

impl Printer<io::Stdout> {
    /// Printer for the process's stdout.
    pub fn stdout() -> Self {
        let out = io::stdout();
        let color = out.is_terminal();
        Self::new(out, color, Local::now().fixed_offset())
    }
}

impl<W: Write> Printer<W> {
    /// `now` anchors relative dates.
    pub const fn new(out: W, color: bool, now: DateTime<FixedOffset>) -> Self {
        Self {
            out,
            palette: Palette { enabled: color },
            now,
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

/// `list`: recent conversations with dates, service and unread total.
pub async fn list<S: MessageStore, W: Write>(
    store: &S,
    limit: u32,
    p: &mut Printer<W>,
) -> Result<()> {
    let conversations = store
        .conversations(limit)
        .await
        .context("Could not read conversations")?;
    if conversations.is_empty() {
        writeln!(p.out, "No conversations found.")?;
        return Ok(());
    }

    let header = format!(
        "{:<4} {:<30} {:<24} {:<10}",
        "#", "Contact", "Last Message", "Service"
    );
    writeln!(p.out, "\n{}", p.palette.paint(header, &[BOLD, CYAN]))?;
    writeln!(p.out, "{}", "-".repeat(70))?;

    for (index, conv) in conversations.iter().enumerate() {
        let name = if conv.unread_count > 0 {
            truncate(&format!("({}) {}", conv.unread_count, conv.title()), 28)
        } else {
            truncate(conv.title(), 28)
        };
        let date = long_time(conv.last_message_date, &p.now);
        let service = if conv.service.is_empty() {
            "iMessage"
        } else {
            conv.service.as_str()
        };
        let color = if conv.is_sms() { GREEN } else { BLUE };
        writeln!(
            p.out,
            "{:<4} {name:<30} {date:<24} {}",
            index + 1,
            p.palette.paint(service, &[color])
        )?;
    }

    let unread = store
        .unread_count()
        .await
        .context("Could not count unread messages")?;
    if unread > 0 {
        let line = p.palette.paint(format!("{unread} unread message(s)"), &[YELLOW, BOLD]);
        writeln!(p.out, "\n{line}")?;
    }
    let tip = p.palette.paint(
        "Tip: use 'imessage read <number>' to view a conversation",
        &[DIM],
    );
    writeln!(p.out, "\n{tip}")?;
    Ok(())
}

/// How `read` names a conversation.
struct Target {
    chat: ChatRef,
    title: String,
    reply_to: String,
}

/// Short all-digit arguments are list numbers; anything else is an identifier.
fn is_list_number(arg: &str) -> bool {
    !arg.is_empty() && arg.len() <= 4 && arg.bytes().all(|b| b.is_ascii_digit())
}

async fn resolve_target<S: MessageStore>(store: &S, arg: &str) -> Result<Target> {
    let conversations = store
        .conversations(READ_LOOKUP_LIMIT)
        .await
        .context("Could not read conversations")?;

    if is_list_number(arg) {
        let number: usize = arg.parse()?;
        let conv = number
            .checked_sub(1)
            .and_then(|index| conversations.get(index))
            .ok_or_else(|| {
                anyhow!(
                    "Invalid conversation number {number}. Use 1-{}",
                    conversations.len()
                )
            })?;
        return Ok(Target {
            chat: ChatRef::Id(conv.id),
            title: conv.title().to_string(),
            reply_to: conv.identifier.clone(),
        });
    }

    let title = conversations
        .iter()
        .find(|conv| conv.identifier == arg || conv.participants.iter().any(|p| p == arg))
        .map_or_else(|| arg.to_string(), |conv| conv.title().to_string());
    Ok(Target {
        chat: ChatRef::Identifier(arg.to_string()),
        title,
        reply_to: arg.to_string(),
    })
}

/// `read`: messages of one conversation, oldest first.
pub async fn read<S: MessageStore, W: Write>(
    store: &S,
    conversation: &str,
    limit: u32,
    p: &mut Printer<W>,
) -> Result<()> {
    let target = resolve_target(store, conversation).await?;
    let messages = store
        .messages(&target.chat, limit)
        .await
        .context("Could not read messages")?;
    if messages.is_empty() {
        writeln!(p.out, "No messages found for {}", target.title)?;
        return Ok(());
    }

    let heading = p.palette.paint(format!("Messages with {}", target.title), &[BOLD, CYAN]);
    writeln!(p.out, "\n{heading}")?;
    writeln!(p.out, "{}", "-".repeat(60))?;

    for msg in &messages {
        let date = long_time(msg.date, &p.now);
        if msg.is_from_me {
            writeln!(p.out, "\n{}", p.palette.paint(format!("{date:>58}"), &[DIM]))?;
            let who = p.palette.paint(format!("{:>10} ", "Me:"), &[GREEN, BOLD]);
            writeln!(p.out, "{who}{}", msg.text)?;
        } else {
            writeln!(p.out, "\n{}", p.palette.paint(&date, &[DIM]))?;
            let who = p.palette.paint(format!("{}: ", msg.sender), &[BLUE, BOLD]);
            writeln!(p.out, "{who}{}", msg.text)?;
        }
    }

    writeln!(p.out, "\n{}", "-".repeat(60))?;
    let hint = format!(
        "Reply: imessage send \"{}\" \"your message\"",
        target.reply_to
    );
    writeln!(p.out, "{}", p.palette.paint(hint, &[DIM]))?;
    Ok(())
}

async fn show_recent<S: MessageStore, W: Write>(
    store: &S,
    chat: &ChatRef,
    p: &mut Printer<W>,
) -> Result<()> {
    let messages = store
        .messages(chat, CHAT_HISTORY)
        .await
        .context("Could not read messages")?;
    for msg in &messages {
        let date = long_time(msg.date, &p.now);
        let who = if msg.is_from_me {
            p.palette.paint(format!("  [{date}] Me: "), &[GREEN])
        } else {
            p.palette.paint(format!("  [{date}] {}: ", msg.sender), &[BLUE])
        };
        writeln!(p.out, "{who}{}", msg.text)?;
    }
    writeln!(p.out)?;
    Ok(())
}

/// `chat`: recent messages, then every input line is sent until the user
/// quits or input ends.
pub async fn chat<S, M, R, W>(
    store: &S,
    sender: &M,
    contact: &str,
    input: &mut R,
    p: &mut Printer<W>,
) -> Result<()>
where
    S: MessageStore,
    M: MessageSender,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let target = resolve_target(store, contact).await?;
    let heading = p.palette.paint(format!("Chat with {}", target.title), &[BOLD, CYAN]);
    writeln!(p.out, "\n{heading}")?;
    let help = "Type a message and press Enter to send. 'quit' exits, 'refresh' reloads.";
    writeln!(p.out, "{}", p.palette.paint(help, &[DIM]))?;
    writeln!(p.out, "{}", "-".repeat(60))?;
    show_recent(store, &target.chat, p).await?;

    let mut line = String::new();
    loop {
        write!(p.out, "{}", p.palette.paint("You: ", &[GREEN, BOLD]))?;
        p.out.flush()?;

        line.clear();
        if input.read_line(&mut line).await? == 0 {
            writeln!(p.out, "\nGoodbye!")?;
            return Ok(());
        }
        let text = line.trim_end_matches(['\r', '\n']);
        match text.trim().to_lowercase().as_str() {
            "quit" | "exit" | "q" => {
                writeln!(p.out, "Goodbye!")?;
                return Ok(());
            }
            "refresh" | "r" => {
                writeln!(p.out, "{}", p.palette.paint("\n--- Refreshing ---\n", &[DIM]))?;
                show_recent(store, &target.chat, p).await?;
            }
            "" => {}
            _ => match sender.send(&target.reply_to, text).await {
                Ok(()) => writeln!(p.out, "{}", p.palette.paint("  Sent", &[DIM]))?,
                Err(err) => {
                    let failed = format!("  Failed to send: {err}");
                    writeln!(p.out, "{}", p.palette.paint(failed, &[RED]))?;
                }
            },
        }
    }
}

fn confirmed(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// `send`: confirms unless `yes`, then sends through `sender`.
pub async fn send<M, R, W>(
    sender: &M,
    recipient: &str,
    message: &str,
    yes: bool,
    input: &mut R,
    p: &mut Printer<W>,
) -> Result<()>
where
    M: MessageSender,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    if !yes {
        writeln!(p.out, "{}{recipient}", p.palette.paint("Sending to: ", &[BOLD]))?;
        writeln!(p.out, "{}{message}", p.palette.paint("Message: ", &[BOLD]))?;
        write!(p.out, "\n{}", p.palette.paint("Send this message? [y/N] ", &[YELLOW]))?;
        p.out.flush()?;

        let mut answer = String::new();
        input.read_line(&mut answer).await?;
        if !confirmed(&answer) {
            writeln!(p.out, "Message cancelled.")?;
            return Ok(());
        }
    }

    writeln!(p.out, "Sending message...")?;
    if let Err(err) = sender.send(recipient, message).await {
        writeln!(p.out, "\n{}", p.palette.paint("Make sure:", &[YELLOW]))?;
        writeln!(p.out, "  1. Messages is configured and signed in")?;
        writeln!(
            p.out,
            "  2. Your terminal has Automation permission for Messages"
        )?;
        writeln!(p.out, "  3. The recipient is a valid phone number or email")?;
        return Err(err).context("Message not sent");
    }
    writeln!(p.out, "{}", p.palette.paint("Message sent", &[GREEN, BOLD]))?;
    Ok(())
}

/// `status`: database access, contacts, Messages.app and live sessions.
pub async fn status<S: MessageStore, W: Write>(
    config: &Config,
    config_path: &Path,
    store: &S,
    contacts: &ContactResolver,
    sender: &AppleScriptSender,
    p: &mut Printer<W>,
) -> Result<()> {
    writeln!(p.out, "{}", p.palette.paint("imessage status", &[BOLD, CYAN]))?;
    writeln!(p.out, "{}", "-".repeat(60))?;

    let settings = if config_path.exists() {
        config_path.display().to_string()
    } else {
        format!("{} (defaults)", config_path.display())
    };
    writeln!(p.out, "[{}] Settings: {settings}", p.palette.mark(true))?;

    match store.unread_count().await {
        Ok(unread) => writeln!(
            p.out,
            "[{}] Database: {} ({unread} unread)",
            p.palette.mark(true),
            config.database_path.display()
        )?,
        Err(err) => {
            writeln!(p.out, "[{}] Database: {err}", p.palette.mark(false))?;
            let hint = "     Grant Full Disk Access to your terminal in System Settings";
            writeln!(p.out, "{}", p.palette.paint(hint, &[DIM]))?;
        }
    }

    let entries = contacts.book().await.len();
    writeln!(
        p.out,
        "[{}] Contacts: {entries} entries from {} address book(s)",
        p.palette.mark(entries > 0),
        contacts.sources().len()
    )?;

    let running = sender.is_messages_running().await;
    let state = if running { "running" } else { "not running" };
    writeln!(p.out, "[{}] Messages.app: {state}", p.palette.mark(running))?;

    let session = match SingleInstanceLock::acquire(config.lock_path.clone()) {
        Ok(_) => "none".to_string(),
        Err(Error::LockHeld {
            holder: Some(pid), ..
        }) => format!("terminal UI running (pid {pid})"),
        Err(Error::LockHeld { .. }) => "terminal UI running".to_string(),
        Err(err) => format!("unknown ({err})"),
    };
    writeln!(p.out, "[{}] Live session: {session}", p.palette.mark(true))?;
    Ok(())
}

/// `version`.
pub fn version<W: Write>(p: &mut Printer<W>) -> Result<()> {
    writeln!(
        p.out,
        "{} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )?;
    writeln!(p.out, "{}", env!("CARGO_PKG_DESCRIPTION"))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use imessage_core::{ChatId, Conversation, MemoryStore, Message, MessageId};
    use std::sync::Mutex;

    fn printer() -> Printer<Vec<u8>> {
        let now = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        Printer::new(Vec::new(), false, now.fixed_offset())
    }

    fn output(p: Printer<Vec<u8>>) -> String {
        String::from_utf8(p.into_inner()).unwrap()
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::with_conversations(vec![
            Conversation::new(ChatId(1), "+15550001", "Alice"),
            Conversation::new(ChatId(2), "+15550002", "Bob"),
        ]);
        let date = Utc.with_ymd_and_hms(2024, 3, 20, 11, 0, 0).unwrap();
        store.push_message(
            Message::new(MessageId(1), ChatId(1), "lunch?")
                .with_sender("Alice")
                .with_date(date),
        );
        store.push_message(
            Message::new(MessageId(2), ChatId(1), "sure")
                .from_me()
                .with_date(date),
        );
        store
    }

    #[derive(Default)]
    struct RecordingSender {
        fail: bool,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl MessageSender for RecordingSender {
        async fn send(&self, recipient: &str, text: &str) -> imessage_core::Result<()> {
            if self.fail {
                return Err(imessage_core::Error::SendFailed("buddy not found".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), text.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_list_shows_conversations_and_unread() {
        let mut p = printer();
        list(&store(), 10, &mut p).await.unwrap();
        let out = output(p);
        assert!(out.contains("(1) Alice"));
        assert!(out.contains("Bob"));
        assert!(out.contains("1 unread message(s)"));
        assert!(!out.contains('\x1b'));
    }

    #[tokio::test]
    async fn test_list_empty_store() {
        let mut p = printer();
        list(&MemoryStore::new(), 10, &mut p).await.unwrap();
        assert_eq!(output(p), "No conversations found.\n");
    }

    #[tokio::test]
    async fn test_read_by_number() {
        let mut p = printer();
        read(&store(), "1", 10, &mut p).await.unwrap();
        let out = output(p);
        assert!(out.contains("Messages with Alice"));
        assert!(out.contains("Alice: lunch?"));
        assert!(out.contains("Me: sure"));
        assert!(out.contains("imessage send \"+15550001\""));
    }

    #[tokio::test]
    async fn test_read_by_identifier() {
        let mut p = printer();
        read(&store(), "+15550001", 10, &mut p).await.unwrap();
        assert!(output(p).contains("Messages with Alice"));
    }

    #[tokio::test]
    async fn test_read_rejects_out_of_range_number() {
        let mut p = printer();
        let err = read(&store(), "9", 10, &mut p).await.unwrap_err();
        assert!(err.to_string().contains("Use 1-2"));
    }

    #[test]
    fn test_list_numbers_and_phone_numbers() {
        assert!(is_list_number("3"));
        assert!(is_list_number("120"));
        assert!(!is_list_number("5551234567"));
        assert!(!is_list_number("+15551234567"));
        assert!(!is_list_number(""));
    }

    #[tokio::test]
    async fn test_send_declined() {
        let sender = RecordingSender::default();
        let mut p = printer();
        let mut input = &b"n\n"[..];
        send(&sender, "+15550001", "hi", false, &mut input, &mut p)
            .await
            .unwrap();
        assert!(output(p).contains("Message cancelled."));
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_confirmed() {
        let sender = RecordingSender::default();
        let mut p = printer();
        let mut input = &b"YES\n"[..];
        send(&sender, "+15550001", "hi", false, &mut input, &mut p)
            .await
            .unwrap();
        assert!(output(p).contains("Message sent"));
        assert_eq!(
            *sender.sent.lock().unwrap(),
            vec![("+15550001".to_string(), "hi".to_string())]
        );
    }

    #[tokio::test]
    async fn test_send_failure_is_an_error() {
        let sender = AppleScriptSender::new();
        let mut p = printer();
        let mut input = &b""[..];
        let err = send(&sender, "", "hi", true, &mut input, &mut p)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Message not sent"));
        assert!(output(p).contains("Make sure:"));
    }

    #[tokio::test]
    async fn test_chat_sends_lines_until_quit() {
        let store = store();
        let sender = RecordingSender::default();
        let mut p = printer();
        let mut input = &b"running late\n\nr\nsee you soon\nQuit\nnot sent\n"[..];
        chat(&store, &sender, "1", &mut input, &mut p).await.unwrap();

        let out = output(p);
        assert!(out.contains("Chat with Alice"));
        assert!(out.contains("Alice: lunch?"));
        assert!(out.contains("--- Refreshing ---"));
        assert_eq!(out.matches("  Sent").count(), 2);
        assert!(out.ends_with("Goodbye!\n"));
        assert_eq!(
            *sender.sent.lock().unwrap(),
            vec![
                ("+15550001".to_string(), "running late".to_string()),
                ("+15550001".to_string(), "see you soon".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_chat_keeps_going_after_failed_send_and_stops_at_eof() {
        let sender = RecordingSender {
            fail: true,
            ..RecordingSender::default()
        };
        let mut p = printer();
        let mut input = &b"hello\n"[..];
        chat(&store(), &sender, "+15550002", &mut input, &mut p)
            .await
            .unwrap();

        let out = output(p);
        assert!(out.contains("Chat with Bob"));
        assert!(out.contains("Failed to send: "));
        assert!(out.ends_with("Goodbye!\n"));
    }

    #[tokio::test]
    async fn test_chat_rejects_unknown_number() {
        let sender = RecordingSender::default();
        let mut p = printer();
        let mut input = &b""[..];
        let err = chat(&store(), &sender, "7", &mut input, &mut p)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid conversation number 7"));
    }

    #[test]
    fn test_colors_only_when_enabled() {
        let now = Utc::now().fixed_offset();
        let plain = Printer::new(Vec::new(), false, now);
        let colored = Printer::new(Vec::new(), true, now);
        assert_eq!(plain.palette.paint("x", &[RED]), "x");
        assert_eq!(colored.palette.paint("x", &[RED]), "\x1b[91mx\x1b[0m");
        assert_eq!(plain.palette.mark(false), "!!");
    }

    #[test]
    fn test_version() {
        let mut p = printer();
        version(&mut p).unwrap();
        assert!(output(p).starts_with("imessage "));
    }
}
