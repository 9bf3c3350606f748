//! Hierarchical occurrence addresses and their textual form.
//!
//! # Responsibility
//! - Define the `(document, position)` address pair.
//! - Parse and format the boundary string form `context:doc-position`.
//!
//! # Invariants
//! - `position` is zero-based; the grammar rejects signs and non-integers.
//! - `Address::parse(addr.to_string())` round-trips for every valid address.

use crate::model::document::{DocumentId, DocumentIdError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9._]+):([A-Za-z0-9._]+)-([0-9]+)$").expect("valid address regex")
});

/// Errors from parsing the textual address form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    /// Input does not match `context:doc-position`.
    Malformed(String),
    /// Position part is not representable as `u32`.
    PositionOutOfRange { address: String, position: String },
    /// Context or document segment failed identifier validation.
    InvalidDocumentId(DocumentIdError),
}

impl Display for AddressParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(value) => write!(
                f,
                "malformed address `{value}`: expected `context:doc-position`"
            ),
            Self::PositionOutOfRange { address, position } => write!(
                f,
                "malformed address `{address}`: position `{position}` out of range"
            ),
            Self::InvalidDocumentId(err) => write!(f, "malformed address: {err}"),
        }
    }
}

impl Error for AddressParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidDocumentId(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DocumentIdError> for AddressParseError {
    fn from(value: DocumentIdError) -> Self {
        Self::InvalidDocumentId(value)
    }
}

/// One occurrence coordinate: a document plus a zero-based position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address {
    pub document: DocumentId,
    pub position: u32,
}

impl Address {
    pub fn new(document: DocumentId, position: u32) -> Self {
        Self { document, position }
    }

    /// Parses the boundary string form, e.g. `doc:123-0`.
    pub fn parse(value: &str) -> Result<Self, AddressParseError> {
        let captures = ADDRESS_RE
            .captures(value)
            .ok_or_else(|| AddressParseError::Malformed(value.to_string()))?;

        let position_text = &captures[3];
        let position: u32 =
            position_text
                .parse()
                .map_err(|_| AddressParseError::PositionOutOfRange {
                    address: value.to_string(),
                    position: position_text.to_string(),
                })?;

        let document = DocumentId::new(&captures[1], &captures[2])?;
        Ok(Self { document, position })
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.document, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::{Address, AddressParseError};
    use crate::model::document::DocumentId;

    fn addr(l: &str, s: &str, position: u32) -> Address {
        Address::new(DocumentId::new(l, s).unwrap(), position)
    }

    #[test]
    fn formats_context_doc_position() {
        assert_eq!(addr("doc", "123", 0).to_string(), "doc:123-0");
    }

    #[test]
    fn parse_format_round_trip() {
        for address in [
            addr("doc", "123", 0),
            addr("DocumentData", "ab12cd34", 41),
            addr("notes.v2", "x_1", u32::MAX),
        ] {
            assert_eq!(Address::parse(&address.to_string()).unwrap(), address);
        }
    }

    #[test]
    fn rejects_negative_and_non_integer_positions() {
        assert!(matches!(
            Address::parse("doc:123--1"),
            Err(AddressParseError::Malformed(_))
        ));
        assert!(matches!(
            Address::parse("doc:123-one"),
            Err(AddressParseError::Malformed(_))
        ));
        assert!(matches!(
            Address::parse("doc:123-1.5"),
            Err(AddressParseError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_missing_parts() {
        for input in ["", "doc:123", "123-0", "doc-123-0", "doc:123-"] {
            assert!(matches!(
                Address::parse(input),
                Err(AddressParseError::Malformed(_))
            ));
        }
    }

    #[test]
    fn rejects_position_overflow() {
        let err = Address::parse("doc:123-4294967296").unwrap_err();
        assert!(matches!(err, AddressParseError::PositionOutOfRange { .. }));
    }
}
