//! A throwaway Messages database with the tables the store reads.

#![allow(dead_code, clippy::unwrap_used)]

use std::path::PathBuf;
use std::sync::Arc;

use imessage_core::{ChatDb, ContactResolver};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection};
use tempfile::TempDir;

const SCHEMA: &[&str] = &[
    "CREATE TABLE handle (ROWID INTEGER PRIMARY KEY AUTOINCREMENT, id TEXT NOT NULL, service TEXT)",
    "CREATE TABLE chat (ROWID INTEGER PRIMARY KEY AUTOINCREMENT, chat_identifier TEXT, display_name TEXT, service_name TEXT)",
    "CREATE TABLE message (ROWID INTEGER PRIMARY KEY AUTOINCREMENT, text TEXT, attributedBody BLOB, date INTEGER DEFAULT 0, is_from_me INTEGER DEFAULT 0, is_read INTEGER DEFAULT 0, service TEXT, handle_id INTEGER DEFAULT 0)",
    "CREATE TABLE chat_message_join (chat_id INTEGER, message_id INTEGER, PRIMARY KEY (chat_id, message_id))",
    "CREATE TABLE chat_handle_join (chat_id INTEGER, handle_id INTEGER)",
];

/// 2023-03-07 in nanoseconds since 2001-01-01.
pub const BASE_DATE: i64 = 700_000_000 * 1_000_000_000;

/// `minutes` after [`BASE_DATE`].
pub const fn at(minutes: i64) -> i64 {
    BASE_DATE + minutes * 60 * 1_000_000_000
}

/// A row for the `message` table.
pub struct Row<'a> {
    pub id: i64,
    pub chat: i64,
    pub handle: i64,
    pub text: Option<&'a str>,
    pub body: Option<Vec<u8>>,
    pub date: i64,
    pub from_me: bool,
    pub read: bool,
}

impl<'a> Row<'a> {
    /// An unread incoming text message.
    pub fn text(id: i64, chat: i64, handle: i64, text: &'a str, date: i64) -> Self {
        Self {
            id,
            chat,
            handle,
            text: Some(text),
            body: None,
            date,
            from_me: false,
            read: false,
        }
    }

    pub fn from_me(mut self) -> Self {
        self.from_me = true;
        self.read = true;
        self
    }

    pub fn read(mut self) -> Self {
        self.read = true;
        self
    }
}

pub struct Fixture {
    _dir: TempDir,
    pub path: PathBuf,
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let fixture = Self { _dir: dir, path };
        let mut conn = SqliteConnectOptions::new()
            .filename(&fixture.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .connect()
            .await
            .unwrap();
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut conn).await.unwrap();
        }
        conn.close().await.unwrap();
        fixture
    }

    async fn connect(&self) -> SqliteConnection {
        SqliteConnectOptions::new()
            .filename(&self.path)
            .journal_mode(SqliteJournalMode::Delete)
            .connect()
            .await
            .unwrap()
    }

    pub fn store(&self) -> ChatDb {
        ChatDb::new(self.path.clone(), Arc::new(ContactResolver::empty()))
    }

    pub async fn add_handle(&self, id: i64, handle: &str) {
        let mut conn = self.connect().await;
        sqlx::query("INSERT INTO handle (ROWID, id, service) VALUES (?, ?, 'iMessage')")
            .bind(id)
            .bind(handle)
            .execute(&mut conn)
            .await
            .unwrap();
        conn.close().await.unwrap();
    }

    /// Adds a chat and links each handle as a participant.
    pub async fn add_chat(&self, id: i64, identifier: &str, name: &str, service: &str, handles: &[i64]) {
        let mut conn = self.connect().await;
        sqlx::query(
            "INSERT INTO chat (ROWID, chat_identifier, display_name, service_name) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(identifier)
        .bind(name)
        .bind(service)
        .execute(&mut conn)
        .await
        .unwrap();
        for handle in handles {
            sqlx::query("INSERT INTO chat_handle_join (chat_id, handle_id) VALUES (?, ?)")
                .bind(id)
                .bind(*handle)
                .execute(&mut conn)
                .await
                .unwrap();
        }
        conn.close().await.unwrap();
    }

    pub async fn add_message(&self, row: Row<'_>) {
        let mut conn = self.connect().await;
        sqlx::query(
            "INSERT INTO message (ROWID, text, attributedBody, date, is_from_me, is_read, service, handle_id)
             VALUES (?, ?, ?, ?, ?, ?, 'iMessage', ?)",
        )
        .bind(row.id)
        .bind(row.text)
        .bind(row.body)
        .bind(row.date)
        .bind(i64::from(row.from_me))
        .bind(i64::from(row.read))
        .bind(row.handle)
        .execute(&mut conn)
        .await
        .unwrap();
        sqlx::query("INSERT INTO chat_message_join (chat_id, message_id) VALUES (?, ?)")
            .bind(row.chat)
            .bind(row.id)
            .execute(&mut conn)
            .await
            .unwrap();
        conn.close().await.unwrap();
    }

    /// Two one-to-one chats and a named group.
    pub async fn populated() -> Self {
        let fixture = Self::new().await;
        fixture.add_handle(1, "+15550001").await;
        fixture.add_handle(2, "+15550002").await;
        fixture.add_handle(3, "carol@example.com").await;

        fixture.add_chat(1, "+15550001", "", "iMessage", &[1]).await;
        fixture.add_chat(2, "+15550002", "", "SMS", &[2]).await;
        fixture
            .add_chat(3, "chat123456", "Weekend plans", "iMessage", &[1, 3])
            .await;

        fixture.add_message(Row::text(1, 1, 1, "hi there", at(0)).read()).await;
        fixture.add_message(Row::text(2, 1, 1, "hello back", at(1)).from_me()).await;
        fixture.add_message(Row::text(3, 2, 2, "running late", at(5))).await;
        fixture.add_message(Row::text(4, 3, 3, "who's bringing snacks", at(3))).await;
        fixture.add_message(Row::text(5, 3, 1, "I will", at(4))).await;
        fixture
    }
}

/// An archived `NSAttributedString` holding `text`.
pub fn archived(text: &str) -> Vec<u8> {
    let mut body = b"\x04\x0bstreamtyped\x81\xe8\x03\x84\x01@\x84\x84\x84\x12NSAttributedString\x00\x84\x84\x08NSObject\x00\x85\x92\x84\x84\x84\x08NSString\x01\x94\x84\x01+".to_vec();
    body.push(u8::try_from(text.len()).unwrap());
    body.extend_from_slice(text.as_bytes());
    body.extend_from_slice(b"\x86\x84\x02iI\x01\x05\x92\x84\x84\x84\x0cNSDictionary\x00");
    body
}
