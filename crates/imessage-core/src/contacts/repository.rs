//! Address book loading.
//!
//! Contacts live in one `AddressBook-v22.abcddb` per account source. They
//! are read once, on first use, and kept for the life of the resolver.

use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::model::AddressBook;
use crate::Result;

const ADDRESS_BOOK_FILE: &str = "AddressBook-v22.abcddb";

/// Resolves phone numbers and email addresses to contact names.
#[derive(Debug, Default)]
pub struct ContactResolver {
    sources: Vec<PathBuf>,
    book: OnceCell<AddressBook>,
}

impl ContactResolver {
    /// Create a resolver over the given address book database files.
    #[must_use]
    pub fn new(sources: Vec<PathBuf>) -> Self {
        Self {
            sources,
            book: OnceCell::new(),
        }
    }

    /// Create a resolver that knows no contacts.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a resolver over the current user's address book sources.
    #[must_use]
    pub fn discover() -> Self {
        let base = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Library")
            .join("Application Support")
            .join("AddressBook");
        Self::new(Self::find_sources(&base))
    }

    /// Find every `Sources/*/AddressBook-v22.abcddb` under `base`.
    #[must_use]
    pub fn find_sources(base: &Path) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(base.join("Sources")) else {
            return Vec::new();
        };
        let mut sources: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path().join(ADDRESS_BOOK_FILE))
            .filter(|path| path.is_file())
            .collect();
        sources.sort();
        sources
    }

    /// Address book database files this resolver reads.
    #[must_use]
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// The loaded address book, reading the sources on first call.
    pub async fn book(&self) -> &AddressBook {
        self.book.get_or_init(|| load_all(&self.sources)).await
    }

    /// Resolve a handle to a contact name, or return it unchanged.
    pub async fn resolve(&self, identifier: &str) -> String {
        self.book().await.resolve(identifier)
    }
}

async fn load_all(sources: &[PathBuf]) -> AddressBook {
    let mut book = AddressBook::new();
    for source in sources {
        if let Err(err) = load_source(source, &mut book).await {
            debug!(path = %source.display(), error = %err, "Skipping address book source");
        }
    }
    info!(
        entries = book.len(),
        sources = sources.len(),
        "Address book loaded"
    );
    book
}

async fn load_source(path: &Path, book: &mut AddressBook) -> Result<()> {
    let mut conn = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .connect()
        .await?;

    let phones = sqlx::query(
        r"
        SELECT r.ZFIRSTNAME AS first_name, r.ZLASTNAME AS last_name,
               r.ZORGANIZATION AS organization, p.ZFULLNUMBER AS value
        FROM ZABCDRECORD r
        JOIN ZABCDPHONENUMBER p ON r.Z_PK = p.ZOWNER
        WHERE p.ZFULLNUMBER IS NOT NULL
        ",
    )
    .fetch_all(&mut conn)
    .await?;

    for row in &phones {
        let value: String = row.try_get("value")?;
        book.add_phone(&value, &row_name(row)?);
    }

    let emails = sqlx::query(
        r"
        SELECT r.ZFIRSTNAME AS first_name, r.ZLASTNAME AS last_name,
               r.ZORGANIZATION AS organization, e.ZADDRESS AS value
        FROM ZABCDRECORD r
        JOIN ZABCDEMAILADDRESS e ON r.Z_PK = e.ZOWNER
        WHERE e.ZADDRESS IS NOT NULL
        ",
    )
    .fetch_all(&mut conn)
    .await?;

    for row in &emails {
        let value: String = row.try_get("value")?;
        book.add_email(&value, &row_name(row)?);
    }

    conn.close().await?;
    Ok(())
}

fn row_name(row: &SqliteRow) -> Result<String> {
    let first: Option<String> = row.try_get("first_name")?;
    let last: Option<String> = row.try_get("last_name")?;
    let organization: Option<String> = row.try_get("organization")?;
    Ok(contact_name(
        first.as_deref(),
        last.as_deref(),
        organization.as_deref(),
    ))
}

/// "First Last", falling back to the organization.
fn contact_name(first: Option<&str>, last: Option<&str>, organization: Option<&str>) -> String {
    let parts: Vec<&str> = [first, last]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        organization.map(str::trim).unwrap_or_default().to_string()
    } else {
        parts.join(" ")
    }
}
