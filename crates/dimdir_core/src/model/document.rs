//! Document identity model.
//!
//! # Responsibility
//! - Define the long/short (`dbidL`/`dbidS`) document identifier pair.
//! - Validate identifier syntax so textual addresses stay unambiguous.
//!
//! # Invariants
//! - Identifier segments contain only `[A-Za-z0-9._]`, keeping `:` and `-`
//!   free for the address grammar.
//! - A `DocumentId` is immutable once created.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from document identifier validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentIdError {
    /// Long identifier is empty or contains reserved characters.
    InvalidLongId(String),
    /// Short identifier is empty or contains reserved characters.
    InvalidShortId(String),
}

impl Display for DocumentIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLongId(value) => write!(
                f,
                "invalid long identifier `{value}`: expected non-empty [A-Za-z0-9._]"
            ),
            Self::InvalidShortId(value) => write!(
                f,
                "invalid short identifier `{value}`: expected non-empty [A-Za-z0-9._]"
            ),
        }
    }
}

impl Error for DocumentIdError {}

/// Long/short identifier pair naming one document.
///
/// `dbid_l` is the human-readable namespace, `dbid_s` the compact id unique
/// within that namespace. The pair is the document's identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId {
    pub dbid_l: String,
    pub dbid_s: String,
}

impl DocumentId {
    /// Creates a validated document identifier pair.
    pub fn new(dbid_l: impl Into<String>, dbid_s: impl Into<String>) -> Result<Self, DocumentIdError> {
        let dbid_l = dbid_l.into();
        let dbid_s = dbid_s.into();
        if !is_valid_segment(&dbid_l) {
            return Err(DocumentIdError::InvalidLongId(dbid_l));
        }
        if !is_valid_segment(&dbid_s) {
            return Err(DocumentIdError::InvalidShortId(dbid_s));
        }
        Ok(Self { dbid_l, dbid_s })
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.dbid_l, self.dbid_s)
    }
}

/// Returns whether one identifier segment is well-formed.
pub fn is_valid_segment(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
}

/// Document read model with ingestion bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier pair.
    pub id: DocumentId,
    /// Original text as submitted for ingestion.
    pub raw_text: String,
    /// Number of sentence units indexed for this document.
    pub unit_count: u32,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
}
