//! `SQLite` access to the Messages database (`~/Library/Messages/chat.db`).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row};
use tracing::{debug, trace};

use super::{MessageStore, StoreVersion, extract_text};
use crate::contacts::{AddressBook, ContactResolver};
use crate::model::{
    ATTACHMENT_PLACEHOLDER, ChatId, ChatRef, Conversation, Message, MessageId, time,
};
use crate::{Error, Result};

// Primary SQLite result codes.
const SQLITE_PERM: i32 = 3;
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_CANTOPEN: i32 = 14;
const SQLITE_AUTH: i32 = 23;
const SQLITE_NOTADB: i32 = 26;

const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

const MESSAGE_SELECT: &str = r"
    SELECT
        m.ROWID AS message_id,
        m.text,
        m.attributedBody,
        m.date,
        m.is_from_me,
        m.is_read,
        m.service,
        h.id AS sender_id,
        c.ROWID AS chat_id,
        c.chat_identifier,
        c.display_name
    FROM message m
    LEFT JOIN chat_message_join cmj ON m.ROWID = cmj.message_id
    LEFT JOIN chat c ON cmj.chat_id = c.ROWID
    LEFT JOIN handle h ON m.handle_id = h.ROWID
";

/// The Messages database, opened read-only for every operation.
#[derive(Debug, Clone)]
pub struct ChatDb {
    path: PathBuf,
    contacts: Arc<ContactResolver>,
}

impl ChatDb {
    /// Create a store over the database at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, contacts: Arc<ContactResolver>) -> Self {
        Self {
            path: path.into(),
            contacts,
        }
    }

    /// `~/Library/Messages/chat.db` for the current user.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Library")
            .join("Messages")
            .join("chat.db")
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Contact resolver used for sender and conversation names.
    #[must_use]
    pub fn contacts(&self) -> &ContactResolver {
        &self.contacts
    }

    async fn connect(&self) -> Result<SqliteConnection> {
        if !self.path.exists() {
            return Err(Error::StoreUnavailable(format!(
                "database not found at {} (is Messages configured and does this terminal have Full Disk Access?)",
                self.path.display()
            )));
        }
        SqliteConnectOptions::new()
            .filename(&self.path)
            .read_only(true)
            .busy_timeout(BUSY_TIMEOUT)
            .disable_statement_logging()
            .connect()
            .await
            .map_err(classify)
    }

    async fn fetch_messages(&self, rows: Vec<SqliteRow>) -> Result<Vec<Message>> {
        let book = self.contacts.book().await;
        rows.iter().map(|row| message_from_row(row, book)).collect()
    }
}

impl MessageStore for ChatDb {
    async fn conversations(&self, limit: u32) -> Result<Vec<Conversation>> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query(
            r"
            SELECT
                c.ROWID AS chat_id,
                c.chat_identifier,
                c.display_name,
                c.service_name,
                (SELECT MAX(m.date) FROM message m
                    JOIN chat_message_join cmj ON m.ROWID = cmj.message_id
                    WHERE cmj.chat_id = c.ROWID) AS last_message_date,
                (SELECT m.text FROM message m
                    JOIN chat_message_join cmj ON m.ROWID = cmj.message_id
                    WHERE cmj.chat_id = c.ROWID
                    ORDER BY m.date DESC LIMIT 1) AS last_message_text,
                (SELECT m.attributedBody FROM message m
                    JOIN chat_message_join cmj ON m.ROWID = cmj.message_id
                    WHERE cmj.chat_id = c.ROWID
                    ORDER BY m.date DESC LIMIT 1) AS last_message_body,
                (SELECT COUNT(*) FROM message m
                    JOIN chat_message_join cmj ON m.ROWID = cmj.message_id
                    WHERE cmj.chat_id = c.ROWID
                      AND m.is_read = 0 AND m.is_from_me = 0) AS unread_count,
                (SELECT GROUP_CONCAT(h.id) FROM chat_handle_join chj
                    JOIN handle h ON chj.handle_id = h.ROWID
                    WHERE chj.chat_id = c.ROWID) AS participants
            FROM chat c
            ORDER BY last_message_date DESC
            LIMIT ?
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&mut conn)
        .await
        .map_err(classify)?;
        release(conn).await;

        let book = self.contacts.book().await;
        let conversations = rows
            .iter()
            .map(|row| conversation_from_row(row, book))
            .collect::<Result<Vec<_>>>()?;
        debug!(count = conversations.len(), "Loaded conversations");
        Ok(conversations)
    }

    async fn messages(&self, chat: &ChatRef, limit: u32) -> Result<Vec<Message>> {
        let clause = match chat {
            ChatRef::Id(_) => "c.ROWID = ?",
            ChatRef::Identifier(_) => "c.chat_identifier = ?",
        };
        let sql = format!("{MESSAGE_SELECT} WHERE {clause} ORDER BY m.date DESC LIMIT ?");
        let query = sqlx::query(&sql);
        let query = match chat {
            ChatRef::Id(id) => query.bind(id.0),
            ChatRef::Identifier(identifier) => query.bind(identifier.clone()),
        };

        let mut conn = self.connect().await?;
        let rows = query
            .bind(i64::from(limit))
            .fetch_all(&mut conn)
            .await
            .map_err(classify)?;
        release(conn).await;

        let mut messages = self.fetch_messages(rows).await?;
        messages.reverse();
        Ok(messages)
    }

    async fn new_messages(&self, since: MessageId) -> Result<Vec<Message>> {
        let sql = format!("{MESSAGE_SELECT} WHERE m.ROWID > ? ORDER BY m.ROWID ASC");
        let mut conn = self.connect().await?;
        let rows = sqlx::query(&sql)
            .bind(since.0)
            .fetch_all(&mut conn)
            .await
            .map_err(classify)?;
        release(conn).await;

        self.fetch_messages(rows).await
    }

    async fn unread_count(&self) -> Result<u64> {
        let mut conn = self.connect().await?;
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM message WHERE is_read = 0 AND is_from_me = 0")
                .fetch_one(&mut conn)
                .await
                .map_err(classify)?;
        release(conn).await;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn max_message_id(&self) -> Result<MessageId> {
        let mut conn = self.connect().await?;
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(ROWID) FROM message")
            .fetch_one(&mut conn)
            .await
            .map_err(classify)?;
        release(conn).await;
        Ok(MessageId(max.unwrap_or(0)))
    }

    async fn version(&self) -> Result<StoreVersion> {
        let primary = tokio::fs::metadata(&self.path).await.map_err(|err| {
            Error::StoreUnavailable(format!("{}: {err}", self.path.display()))
        })?;
        let mut latest = primary.modified()?;
        for suffix in ["-wal", "-shm"] {
            let companion = companion_path(&self.path, suffix);
            if let Ok(meta) = tokio::fs::metadata(&companion).await
                && let Ok(modified) = meta.modified()
            {
                latest = latest.max(modified);
            }
        }
        Ok(StoreVersion::from_mtime(latest))
    }
}

/// `chat.db` → `chat.db-wal` and friends.
fn companion_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

async fn release(conn: SqliteConnection) {
    if let Err(err) = conn.close().await {
        trace!(error = %err, "Error closing store connection");
    }
}

/// Map driver errors onto store availability.
fn classify(err: sqlx::Error) -> Error {
    let mapped = match &err {
        sqlx::Error::Database(db) => {
            let code = db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            match code {
                Some(SQLITE_BUSY | SQLITE_LOCKED) => Some(Error::StoreBusy(db.message().to_string())),
                Some(SQLITE_PERM | SQLITE_CANTOPEN | SQLITE_AUTH | SQLITE_NOTADB) => {
                    Some(Error::StoreUnavailable(db.message().to_string()))
                }
                _ => None,
            }
        }
        sqlx::Error::Io(io) => Some(Error::StoreUnavailable(io.to_string())),
        _ => None,
    };
    mapped.unwrap_or_else(|| Error::Database(err))
}

fn message_from_row(row: &SqliteRow, book: &AddressBook) -> Result<Message> {
    let text: Option<String> = row.try_get("text")?;
    let body: Option<Vec<u8>> = row.try_get("attributedBody")?;
    let date: Option<i64> = row.try_get("date")?;
    let is_from_me: Option<i64> = row.try_get("is_from_me")?;
    let is_read: Option<i64> = row.try_get("is_read")?;
    let service: Option<String> = row.try_get("service")?;
    let sender_id: Option<String> = row.try_get("sender_id")?;
    let chat_id: Option<i64> = row.try_get("chat_id")?;
    let chat_identifier: Option<String> = row.try_get("chat_identifier")?;
    let chat_name: Option<String> = row.try_get("display_name")?;

    let is_from_me = is_from_me.unwrap_or(0) != 0;
    let chat_identifier = chat_identifier.unwrap_or_default();

    Ok(Message {
        id: MessageId(row.try_get("message_id")?),
        chat_id: ChatId(chat_id.unwrap_or(0)),
        chat_name: display_name(chat_name, &chat_identifier, book),
        chat_identifier,
        sender: sender_name(is_from_me, sender_id.as_deref(), book),
        date: date.and_then(time::from_apple_time),
        text: message_text(text, body.as_deref()),
        is_from_me,
        is_read: is_read.unwrap_or(0) != 0,
        service: service
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "iMessage".to_string()),
    })
}

fn conversation_from_row(row: &SqliteRow, book: &AddressBook) -> Result<Conversation> {
    let identifier: Option<String> = row.try_get("chat_identifier")?;
    let name: Option<String> = row.try_get("display_name")?;
    let service: Option<String> = row.try_get("service_name")?;
    let last_date: Option<i64> = row.try_get("last_message_date")?;
    let last_text: Option<String> = row.try_get("last_message_text")?;
    let last_body: Option<Vec<u8>> = row.try_get("last_message_body")?;
    let unread: i64 = row.try_get("unread_count")?;
    let participants: Option<String> = row.try_get("participants")?;

    let identifier = identifier.unwrap_or_default();
    let last_message_text = if last_date.is_some() {
        message_text(last_text, last_body.as_deref())
    } else {
        String::new()
    };

    Ok(Conversation {
        id: ChatId(row.try_get("chat_id")?),
        display_name: display_name(name, &identifier, book),
        identifier,
        service: service
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "iMessage".to_string()),
        last_message_date: last_date.and_then(time::from_apple_time),
        last_message_text,
        unread_count: u32::try_from(unread).unwrap_or(0),
        participants: participants
            .map(|list| {
                list.split(',')
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    })
}

/// Text column, then the archived body, then the attachment placeholder.
fn message_text(text: Option<String>, body: Option<&[u8]>) -> String {
    text.filter(|t| !t.trim().is_empty())
        .or_else(|| body.and_then(extract_text))
        .unwrap_or_else(|| ATTACHMENT_PLACEHOLDER.to_string())
}

fn sender_name(is_from_me: bool, handle: Option<&str>, book: &AddressBook) -> String {
    if is_from_me {
        return "Me".to_string();
    }
    match handle {
        Some(handle) if !handle.is_empty() => book.resolve(handle),
        _ => "Unknown".to_string(),
    }
}

fn display_name(name: Option<String>, identifier: &str, book: &AddressBook) -> String {
    match name {
        Some(name) if !name.is_empty() => name,
        _ => book.resolve(identifier),
    }
}
