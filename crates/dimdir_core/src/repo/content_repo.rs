//! Content unit repository: collision-checked insert-if-absent with
//! reference counting.
//!
//! # Responsibility
//! - Own the deduplicated `content_units` table.
//! - Guarantee idempotent interning: equivalent text never creates a second
//!   unit, it bumps the existing reference count.
//!
//! # Invariants
//! - A stored unit's `normalized_text` always re-derives its `content_id`.
//! - A unit is deleted only when its reference count reaches zero.

use crate::db::DbError;
use crate::model::content::{content_id_for, ContentId, ContentUnit, NormalizationPolicy};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type ContentRepoResult<T> = Result<T, ContentRepoError>;

/// Errors from content unit persistence.
#[derive(Debug)]
pub enum ContentRepoError {
    /// A stored unit under this id carries different normalized text.
    ///
    /// Unreachable under a sound identity function; surfaced loudly instead
    /// of silently reusing the row.
    IdentityCollision {
        content_id: ContentId,
        existing: String,
        incoming: String,
    },
    /// Text normalized to the empty string and cannot be interned.
    EmptyText,
    NotFound(ContentId),
    Db(DbError),
    InvalidData(String),
}

impl Display for ContentRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IdentityCollision {
                content_id,
                existing,
                incoming,
            } => write!(
                f,
                "identity collision on {content_id}: stored `{existing}` vs incoming `{incoming}`"
            ),
            Self::EmptyText => write!(f, "text is empty after normalization"),
            Self::NotFound(id) => write!(f, "content unit not found: {id}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted content data: {message}"),
        }
    }
}

impl Error for ContentRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for ContentRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for ContentRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for the content identity engine.
pub trait ContentRepository {
    /// Interns raw text: reuses the unit for equivalent text or creates one,
    /// incrementing the reference count either way.
    fn intern(&self, policy: &NormalizationPolicy, raw_text: &str)
        -> ContentRepoResult<ContentId>;
    /// Loads one unit by id.
    fn get_unit(&self, id: ContentId) -> ContentRepoResult<Option<ContentUnit>>;
    /// Releases `count` references; deletes the unit at zero. Returns whether
    /// the unit was deleted.
    fn release(&self, id: ContentId, count: u32) -> ContentRepoResult<bool>;
    /// Number of distinct live units.
    fn unit_count(&self) -> ContentRepoResult<u64>;
}

/// SQLite-backed content repository.
pub struct SqliteContentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContentRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ContentRepository for SqliteContentRepository<'_> {
    fn intern(
        &self,
        policy: &NormalizationPolicy,
        raw_text: &str,
    ) -> ContentRepoResult<ContentId> {
        let normalized = policy.normalize(raw_text);
        if normalized.is_empty() {
            return Err(ContentRepoError::EmptyText);
        }
        let content_id = content_id_for(&normalized);

        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT normalized_text FROM content_units WHERE content_id = ?1;",
                [content_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(existing) if existing != normalized => Err(ContentRepoError::IdentityCollision {
                content_id,
                existing,
                incoming: normalized,
            }),
            Some(_) => {
                self.conn.execute(
                    "UPDATE content_units SET ref_count = ref_count + 1 WHERE content_id = ?1;",
                    [content_id.to_string()],
                )?;
                Ok(content_id)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO content_units (content_id, raw_text, normalized_text, ref_count)
                     VALUES (?1, ?2, ?3, 1);",
                    params![content_id.to_string(), raw_text.trim(), normalized],
                )?;
                Ok(content_id)
            }
        }
    }

    fn get_unit(&self, id: ContentId) -> ContentRepoResult<Option<ContentUnit>> {
        let mut stmt = self.conn.prepare(
            "SELECT content_id, raw_text, normalized_text, ref_count
             FROM content_units WHERE content_id = ?1;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_unit_row(row)?));
        }
        Ok(None)
    }

    fn release(&self, id: ContentId, count: u32) -> ContentRepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE content_units SET ref_count = ref_count - ?2 WHERE content_id = ?1;",
            params![id.to_string(), i64::from(count)],
        )?;
        if changed == 0 {
            return Err(ContentRepoError::NotFound(id));
        }

        let remaining: i64 = self.conn.query_row(
            "SELECT ref_count FROM content_units WHERE content_id = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )?;
        if remaining <= 0 {
            self.conn.execute(
                "DELETE FROM content_units WHERE content_id = ?1;",
                [id.to_string()],
            )?;
            return Ok(true);
        }
        Ok(false)
    }

    fn unit_count(&self) -> ContentRepoResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM content_units;", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn parse_unit_row(row: &Row<'_>) -> ContentRepoResult<ContentUnit> {
    let id_text: String = row.get("content_id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        ContentRepoError::InvalidData(format!(
            "invalid uuid value `{id_text}` in content_units.content_id"
        ))
    })?;

    Ok(ContentUnit {
        id,
        raw_text: row.get("raw_text")?,
        normalized_text: row.get("normalized_text")?,
        ref_count: row.get("ref_count")?,
    })
}
