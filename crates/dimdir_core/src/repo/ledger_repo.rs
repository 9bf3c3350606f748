//! Zero-index mapping ledger: documents and their sentence occurrences.
//!
//! # Responsibility
//! - Own the `documents` and `occurrences` tables and the two inverse
//!   queries between content ids and addresses.
//! - Run ingest/re-ingest/delete as single transactions so a document is
//!   indexed completely or not at all.
//!
//! # Invariants
//! - Occurrence positions per document are dense `0..n-1` at creation.
//! - Every occurrence row references a live content unit.
//! - Re-ingestion regenerates occurrences; rows are never patched in place.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::address::Address;
use crate::model::content::{ContentId, NormalizationPolicy};
use crate::model::document::{Document, DocumentId};
use crate::repo::content_repo::{ContentRepoError, ContentRepository, SqliteContentRepository};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const DOCUMENT_SELECT_SQL: &str = "SELECT
    dbid_l,
    dbid_s,
    raw_text,
    unit_count,
    created_at
FROM documents";

const REQUIRED_TABLES: &[&str] = &["documents", "content_units", "occurrences"];

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors from ledger persistence and query operations.
#[derive(Debug)]
pub enum LedgerError {
    /// Address was never allocated or has been retired.
    UnknownAddress(Address),
    /// Document pair is not present in the ledger.
    UnknownDocument(DocumentId),
    /// Document pair already ingested; re-ingest must be explicit.
    DocumentExists(DocumentId),
    /// Content identity engine failure inside a ledger transaction.
    Content(ContentRepoError),
    Db(DbError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownAddress(address) => write!(f, "unknown address: {address}"),
            Self::UnknownDocument(id) => write!(f, "unknown document: {id}"),
            Self::DocumentExists(id) => write!(f, "document already ingested: {id}"),
            Self::Content(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "ledger requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "ledger requires table `{table}`"),
            Self::InvalidData(message) => write!(f, "invalid ledger data: {message}"),
        }
    }
}

impl Error for LedgerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Content(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ContentRepoError> for LedgerError {
    fn from(value: ContentRepoError) -> Self {
        Self::Content(value)
    }
}

impl From<DbError> for LedgerError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for the zero-index mapping store.
pub trait LedgerRepository {
    /// Indexes a new document: one occurrence per unit at positions `0..n-1`.
    /// Runs as one transaction; nothing is recorded on failure.
    fn ingest_document(
        &self,
        id: &DocumentId,
        raw_text: &str,
        units: &[String],
        policy: &NormalizationPolicy,
    ) -> LedgerResult<Vec<Address>>;
    /// Replaces a document's occurrences wholesale in one transaction.
    fn reingest_document(
        &self,
        id: &DocumentId,
        raw_text: &str,
        units: &[String],
        policy: &NormalizationPolicy,
    ) -> LedgerResult<Vec<Address>>;
    /// Removes a document, its occurrences, and orphaned content units.
    /// Returns the number of occurrences removed.
    fn delete_document(&self, id: &DocumentId) -> LedgerResult<u32>;
    /// Allocates the next position for one more sentence in an existing
    /// document. The Nth submitted sentence receives position N-1.
    fn append_sentence(
        &self,
        id: &DocumentId,
        raw_text: &str,
        policy: &NormalizationPolicy,
    ) -> LedgerResult<Address>;
    /// Loads one document by id.
    fn get_document(&self, id: &DocumentId) -> LedgerResult<Option<Document>>;
    /// Lists documents in creation order.
    fn list_documents(&self) -> LedgerResult<Vec<Document>>;
    /// Confirms an address is allocated, returning its coordinates.
    fn resolve(&self, address: &Address) -> LedgerResult<(DocumentId, u32)>;
    /// Content id recorded at one address.
    fn content_at(&self, address: &Address) -> LedgerResult<ContentId>;
    /// Every address where the content appears, across all documents.
    fn occurrences_of(&self, content_id: ContentId) -> LedgerResult<Vec<Address>>;
    /// Position-ordered `(address, content)` pairs of one document.
    fn document_sentences(&self, id: &DocumentId) -> LedgerResult<Vec<(Address, ContentId)>>;
}

/// SQLite-backed ledger repository.
#[derive(Debug)]
pub struct SqliteLedgerRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLedgerRepository<'conn> {
    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> LedgerResult<Self> {
        ensure_ledger_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl LedgerRepository for SqliteLedgerRepository<'_> {
    fn ingest_document(
        &self,
        id: &DocumentId,
        raw_text: &str,
        units: &[String],
        policy: &NormalizationPolicy,
    ) -> LedgerResult<Vec<Address>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        if document_exists(&tx, id)? {
            return Err(LedgerError::DocumentExists(id.clone()));
        }
        tx.execute(
            "INSERT INTO documents (dbid_l, dbid_s, raw_text, unit_count)
             VALUES (?1, ?2, ?3, ?4);",
            params![id.dbid_l, id.dbid_s, raw_text, units.len() as i64],
        )?;

        let addresses = insert_occurrences(&tx, id, units, 0, policy)?;
        tx.commit()?;
        Ok(addresses)
    }

    fn reingest_document(
        &self,
        id: &DocumentId,
        raw_text: &str,
        units: &[String],
        policy: &NormalizationPolicy,
    ) -> LedgerResult<Vec<Address>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        if !document_exists(&tx, id)? {
            return Err(LedgerError::UnknownDocument(id.clone()));
        }
        clear_document_occurrences(&tx, id)?;
        tx.execute(
            "UPDATE documents SET raw_text = ?3, unit_count = ?4
             WHERE dbid_l = ?1 AND dbid_s = ?2;",
            params![id.dbid_l, id.dbid_s, raw_text, units.len() as i64],
        )?;

        let addresses = insert_occurrences(&tx, id, units, 0, policy)?;
        tx.commit()?;
        Ok(addresses)
    }

    fn delete_document(&self, id: &DocumentId) -> LedgerResult<u32> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        if !document_exists(&tx, id)? {
            return Err(LedgerError::UnknownDocument(id.clone()));
        }
        let removed = clear_document_occurrences(&tx, id)?;
        tx.execute(
            "DELETE FROM documents WHERE dbid_l = ?1 AND dbid_s = ?2;",
            params![id.dbid_l, id.dbid_s],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    fn append_sentence(
        &self,
        id: &DocumentId,
        raw_text: &str,
        policy: &NormalizationPolicy,
    ) -> LedgerResult<Address> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let unit_count: Option<i64> = tx
            .query_row(
                "SELECT unit_count FROM documents WHERE dbid_l = ?1 AND dbid_s = ?2;",
                params![id.dbid_l, id.dbid_s],
                |row| row.get(0),
            )
            .optional()?;
        let Some(unit_count) = unit_count else {
            return Err(LedgerError::UnknownDocument(id.clone()));
        };

        let unit = [raw_text.to_string()];
        let mut addresses = insert_occurrences(&tx, id, &unit, unit_count as u32, policy)?;
        tx.execute(
            "UPDATE documents SET unit_count = unit_count + 1
             WHERE dbid_l = ?1 AND dbid_s = ?2;",
            params![id.dbid_l, id.dbid_s],
        )?;
        tx.commit()?;

        // insert_occurrences returned exactly one address for one unit.
        addresses
            .pop()
            .ok_or_else(|| LedgerError::InvalidData("append produced no address".to_string()))
    }

    fn get_document(&self, id: &DocumentId) -> LedgerResult<Option<Document>> {
        let mut stmt = self.conn.prepare(&format!(
            "{DOCUMENT_SELECT_SQL} WHERE dbid_l = ?1 AND dbid_s = ?2;"
        ))?;
        let mut rows = stmt.query(params![id.dbid_l, id.dbid_s])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_document_row(row)?));
        }
        Ok(None)
    }

    fn list_documents(&self) -> LedgerResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(&format!(
            "{DOCUMENT_SELECT_SQL} ORDER BY created_at ASC, dbid_l ASC, dbid_s ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            documents.push(parse_document_row(row)?);
        }
        Ok(documents)
    }

    fn resolve(&self, address: &Address) -> LedgerResult<(DocumentId, u32)> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM occurrences
                 WHERE dbid_l = ?1 AND dbid_s = ?2 AND position = ?3;",
                params![
                    address.document.dbid_l,
                    address.document.dbid_s,
                    i64::from(address.position)
                ],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(LedgerError::UnknownAddress(address.clone()));
        }
        Ok((address.document.clone(), address.position))
    }

    fn content_at(&self, address: &Address) -> LedgerResult<ContentId> {
        let content_id: Option<String> = self
            .conn
            .query_row(
                "SELECT content_id FROM occurrences
                 WHERE dbid_l = ?1 AND dbid_s = ?2 AND position = ?3;",
                params![
                    address.document.dbid_l,
                    address.document.dbid_s,
                    i64::from(address.position)
                ],
                |row| row.get(0),
            )
            .optional()?;
        let Some(content_id) = content_id else {
            return Err(LedgerError::UnknownAddress(address.clone()));
        };
        parse_content_id(&content_id)
    }

    fn occurrences_of(&self, content_id: ContentId) -> LedgerResult<Vec<Address>> {
        let mut stmt = self.conn.prepare(
            "SELECT dbid_l, dbid_s, position FROM occurrences
             WHERE content_id = ?1
             ORDER BY dbid_l ASC, dbid_s ASC, position ASC;",
        )?;
        let mut rows = stmt.query([content_id.to_string()])?;
        let mut addresses = Vec::new();
        while let Some(row) = rows.next()? {
            addresses.push(parse_occurrence_address(row)?);
        }
        Ok(addresses)
    }

    fn document_sentences(&self, id: &DocumentId) -> LedgerResult<Vec<(Address, ContentId)>> {
        if !document_exists(self.conn, id)? {
            return Err(LedgerError::UnknownDocument(id.clone()));
        }

        let mut stmt = self.conn.prepare(
            "SELECT dbid_l, dbid_s, position, content_id FROM occurrences
             WHERE dbid_l = ?1 AND dbid_s = ?2
             ORDER BY position ASC;",
        )?;
        let mut rows = stmt.query(params![id.dbid_l, id.dbid_s])?;
        let mut sentences = Vec::new();
        while let Some(row) = rows.next()? {
            let address = parse_occurrence_address(row)?;
            let content_id: String = row.get("content_id")?;
            sentences.push((address, parse_content_id(&content_id)?));
        }
        Ok(sentences)
    }
}

fn insert_occurrences(
    tx: &Transaction<'_>,
    id: &DocumentId,
    units: &[String],
    start_position: u32,
    policy: &NormalizationPolicy,
) -> LedgerResult<Vec<Address>> {
    let content_repo = SqliteContentRepository::new(tx);
    let mut addresses = Vec::with_capacity(units.len());

    for (offset, unit) in units.iter().enumerate() {
        let content_id = content_repo.intern(policy, unit)?;
        let position = start_position + offset as u32;
        tx.execute(
            "INSERT INTO occurrences (dbid_l, dbid_s, position, content_id)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                id.dbid_l,
                id.dbid_s,
                i64::from(position),
                content_id.to_string()
            ],
        )?;
        addresses.push(Address::new(id.clone(), position));
    }

    Ok(addresses)
}

/// Deletes a document's occurrences and releases their content references.
/// Returns the number of occurrences removed.
fn clear_document_occurrences(tx: &Transaction<'_>, id: &DocumentId) -> LedgerResult<u32> {
    let mut stmt = tx.prepare(
        "SELECT content_id, COUNT(*) FROM occurrences
         WHERE dbid_l = ?1 AND dbid_s = ?2
         GROUP BY content_id;",
    )?;
    let mut rows = stmt.query(params![id.dbid_l, id.dbid_s])?;
    let mut grouped: Vec<(ContentId, u32)> = Vec::new();
    while let Some(row) = rows.next()? {
        let content_id: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        grouped.push((parse_content_id(&content_id)?, count as u32));
    }
    drop(rows);
    drop(stmt);

    let removed = tx.execute(
        "DELETE FROM occurrences WHERE dbid_l = ?1 AND dbid_s = ?2;",
        params![id.dbid_l, id.dbid_s],
    )?;

    let content_repo = SqliteContentRepository::new(tx);
    for (content_id, count) in grouped {
        content_repo.release(content_id, count)?;
    }

    Ok(removed as u32)
}

fn document_exists(conn: &Connection, id: &DocumentId) -> LedgerResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM documents WHERE dbid_l = ?1 AND dbid_s = ?2;",
            params![id.dbid_l, id.dbid_s],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn parse_document_row(row: &Row<'_>) -> LedgerResult<Document> {
    let dbid_l: String = row.get("dbid_l")?;
    let dbid_s: String = row.get("dbid_s")?;
    let id = DocumentId::new(&dbid_l, &dbid_s).map_err(|err| {
        LedgerError::InvalidData(format!("invalid document id `{dbid_l}:{dbid_s}`: {err}"))
    })?;

    let unit_count: i64 = row.get("unit_count")?;
    Ok(Document {
        id,
        raw_text: row.get("raw_text")?,
        unit_count: unit_count as u32,
        created_at: row.get("created_at")?,
    })
}

fn parse_occurrence_address(row: &Row<'_>) -> LedgerResult<Address> {
    let dbid_l: String = row.get("dbid_l")?;
    let dbid_s: String = row.get("dbid_s")?;
    let position: i64 = row.get("position")?;
    let id = DocumentId::new(&dbid_l, &dbid_s).map_err(|err| {
        LedgerError::InvalidData(format!("invalid document id `{dbid_l}:{dbid_s}`: {err}"))
    })?;
    Ok(Address::new(id, position as u32))
}

fn parse_content_id(value: &str) -> LedgerResult<ContentId> {
    Uuid::parse_str(value).map_err(|_| {
        LedgerError::InvalidData(format!("invalid uuid value `{value}` in occurrences.content_id"))
    })
}

fn ensure_ledger_connection_ready(conn: &Connection) -> LedgerResult<()> {
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let expected_version = latest_version();
    if actual_version != expected_version {
        return Err(LedgerError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in REQUIRED_TABLES {
        let found: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1;",
                [table],
                |row| row.get(0),
            )
            .optional()?;
        if found.is_none() {
            return Err(LedgerError::MissingRequiredTable(table));
        }
    }

    Ok(())
}
