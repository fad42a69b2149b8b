//! SQLite store of imported messages.
//!
//! The store holds one row per identity tuple. Inserts go through
//! `INSERT OR IGNORE`, so re-importing a message is a no-op rather than a
//! constraint error.

pub mod schema;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::model::message::{IdentityTuple, Message};
use crate::model::timestamp::Timestamp;

/// A row of the `emails` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    /// Date column as stored.
    pub date: String,
    /// Parsed date column; `None` when the stored text is not a date.
    pub timestamp: Option<Timestamp>,
    pub from_host: String,
    pub from_email: String,
    pub subject: String,
    pub receipt_id: Option<i64>,
}

impl StoredRow {
    /// Identity tuple of this row, if its date parses.
    pub fn identity(&self) -> Option<IdentityTuple> {
        self.timestamp.map(|timestamp| IdentityTuple {
            sender: self.from_email.clone(),
            timestamp,
            subject: self.subject.clone(),
        })
    }
}

/// A row to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRow<'a> {
    pub date: String,
    pub from_host: &'a str,
    pub from_email: &'a str,
    pub subject: &'a str,
}

impl<'a> From<&'a Message> for NewRow<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            date: message.timestamp().to_iso(),
            from_host: &message.domain,
            from_email: message.sender(),
            subject: message.subject(),
        }
    }
}

/// Handle to the SQLite store. The connection closes on drop.
pub struct Store {
    path: PathBuf,
    conn: Connection,
}

impl Store {
    /// Open an existing store read-write.
    ///
    /// Never creates the file. Fails with [`SyncError::StoreConnection`] if
    /// the file is missing, is not a database, or lacks the `emails` table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&path, flags).map_err(|source| {
            SyncError::StoreConnection {
                path: path.clone(),
                source,
            }
        })?;
        let store = Self { path, conn };
        store.check()?;
        info!(path = %store.path.display(), "Opened store");
        Ok(store)
    }

    /// Create (or open) a store file and make sure the `emails` table exists.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|source| SyncError::StoreConnection {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch(schema::CREATE_EMAILS)?;
        info!(path = %path.display(), "Initialized store");
        Ok(Self { path, conn })
    }

    /// A private in-memory store with the schema applied.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::CREATE_EMAILS)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verify the file is a database with an `emails` table.
    fn check(&self) -> Result<()> {
        let sql = format!("SELECT count(*) FROM {}", schema::TABLE);
        self.conn
            .query_row(&sql, [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(|source| SyncError::StoreConnection {
                path: self.path.clone(),
                source,
            })
    }

    /// Number of rows in the `emails` table.
    pub fn row_count(&self) -> Result<u64> {
        let sql = format!("SELECT count(*) FROM {}", schema::TABLE);
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// All rows, in insertion order.
    pub fn stored_rows(&self) -> Result<Vec<StoredRow>> {
        let sql = format!(
            "SELECT {}, {}, {}, {}, {} FROM {} ORDER BY rowid",
            schema::DATE,
            schema::FROM_HOST,
            schema::FROM_EMAIL,
            schema::SUBJECT,
            schema::RECEIPT_ID,
            schema::TABLE
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let date: String = row.get(0)?;
            Ok(StoredRow {
                timestamp: Timestamp::parse_iso(&date),
                date,
                from_host: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                from_email: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                subject: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                receipt_id: row.get(4)?,
            })
        })?;
        let rows = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(count = rows.len(), "Loaded stored rows");
        Ok(rows)
    }

    /// Identity tuples of every row whose date parses.
    ///
    /// Rows with an unparseable date are logged and left out.
    pub fn identities(&self) -> Result<BTreeSet<IdentityTuple>> {
        Ok(self
            .stored_rows()?
            .iter()
            .filter_map(identity_or_warn)
            .collect())
    }

    /// Identity tuples of rows that have no receipt linked yet.
    pub fn pending_identities(&self) -> Result<BTreeSet<IdentityTuple>> {
        Ok(self
            .stored_rows()?
            .iter()
            .filter(|row| row.receipt_id.is_none())
            .filter_map(identity_or_warn)
            .collect())
    }

    /// Insert every row that is not already present, in one transaction.
    ///
    /// Rows that collide with an existing (date, from_email, subject) are
    /// skipped silently. Returns the number of rows actually inserted.
    pub fn insert_if_absent<'a, I>(&mut self, rows: I) -> Result<usize>
    where
        I: IntoIterator<Item = NewRow<'a>>,
    {
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4)",
            schema::TABLE,
            schema::DATE,
            schema::FROM_HOST,
            schema::FROM_EMAIL,
            schema::SUBJECT
        );
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                let changed =
                    stmt.execute(params![row.date, row.from_host, row.from_email, row.subject])?;
                if changed == 0 {
                    debug!(date = %row.date, from = row.from_email, "Already stored");
                }
                inserted += changed;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Link a stored message to a receipt.
    ///
    /// Receipt extraction happens outside this tool; this exists so callers
    /// (and tests) can mark rows as processed. Returns whether a row matched.
    pub fn set_receipt(&self, identity: &IdentityTuple, receipt_id: i64) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET {} = ?1 WHERE {} = ?2 AND {} = ?3 AND {} = ?4",
            schema::TABLE,
            schema::RECEIPT_ID,
            schema::DATE,
            schema::FROM_EMAIL,
            schema::SUBJECT
        );
        let changed = self.conn.execute(
            &sql,
            params![
                receipt_id,
                identity.timestamp.to_iso(),
                identity.sender,
                identity.subject
            ],
        )?;
        Ok(changed > 0)
    }

    /// Close the connection, reporting any error SQLite raises on close.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| SyncError::Store(e))
    }
}

fn identity_or_warn(row: &StoredRow) -> Option<IdentityTuple> {
    let identity = row.identity();
    if identity.is_none() {
        warn!(
            date = %row.date,
            from = %row.from_email,
            "Stored row has an unparseable date, ignoring it"
        );
    }
    identity
}
