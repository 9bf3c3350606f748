//! Long/short document identifier registry.
//!
//! # Responsibility
//! - Track which short ids (`dbidS`) are taken inside each long-id (`dbidL`)
//!   namespace and hand out fresh ones on demand.
//! - Parse and render the `.LStable` text form (`dbidL=dbidS` per line).
//!
//! # Invariants
//! - `dbidS` is unique within its `dbidL` namespace.
//! - Registry persistence is owned by an external collaborator; this module
//!   only holds the in-process view.

use crate::model::document::{is_valid_segment, DocumentId, DocumentIdError};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const SHORT_ID_LEN: usize = 8;

/// Registry-level errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Short id already registered inside the long-id namespace.
    DuplicateShortId { dbid_l: String, dbid_s: String },
    /// Identifier segment failed syntax validation.
    InvalidIdentifier(DocumentIdError),
    /// `.LStable` line does not have the `dbidL=dbidS` shape.
    MalformedEntry { line_no: usize, line: String },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateShortId { dbid_l, dbid_s } => {
                write!(f, "short id `{dbid_s}` already registered under `{dbid_l}`")
            }
            Self::InvalidIdentifier(err) => write!(f, "{err}"),
            Self::MalformedEntry { line_no, line } => {
                write!(f, "malformed registry entry on line {line_no}: `{line}`")
            }
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidIdentifier(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DocumentIdError> for RegistryError {
    fn from(value: DocumentIdError) -> Self {
        Self::InvalidIdentifier(value)
    }
}

/// Lookup/registration contract consumed by the document identity layer.
///
/// Passed by reference into services so callers can substitute their own
/// backing store; no ambient global state.
pub trait ShortIdRegistry {
    /// Returns the registered pair, if present.
    fn resolve(&self, dbid_l: &str, dbid_s: &str) -> Option<DocumentId>;
    /// Fails with `DuplicateShortId` when the pair is already taken.
    fn validate_unique(&self, dbid_l: &str, dbid_s: &str) -> Result<(), RegistryError>;
    /// Registers a pair, generating a fresh short id when none is given.
    fn register(&mut self, dbid_l: &str, dbid_s: Option<&str>) -> Result<DocumentId, RegistryError>;
    /// Removes a pair. Returns whether it was present.
    fn unregister(&mut self, dbid_l: &str, dbid_s: &str) -> bool;
}

/// In-memory registry implementation.
#[derive(Debug, Default, Clone)]
pub struct InMemoryShortIdRegistry {
    namespaces: BTreeMap<String, BTreeSet<String>>,
}

impl InMemoryShortIdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from `.LStable` text, one `dbidL=dbidS` per line.
    ///
    /// Blank lines are skipped; anything else that does not split on `=`
    /// into two valid segments is rejected.
    pub fn from_lstable(text: &str) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for (index, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }

            let (dbid_l, dbid_s) =
                line.split_once('=')
                    .ok_or_else(|| RegistryError::MalformedEntry {
                        line_no: index + 1,
                        line: line.to_string(),
                    })?;
            if !is_valid_segment(dbid_l) || !is_valid_segment(dbid_s) {
                return Err(RegistryError::MalformedEntry {
                    line_no: index + 1,
                    line: line.to_string(),
                });
            }

            registry.validate_unique(dbid_l, dbid_s)?;
            registry
                .namespaces
                .entry(dbid_l.to_string())
                .or_default()
                .insert(dbid_s.to_string());
        }
        Ok(registry)
    }

    /// Renders the registry back into `.LStable` text form.
    pub fn render_lstable(&self) -> String {
        let mut out = String::new();
        for (dbid_l, shorts) in &self.namespaces {
            for dbid_s in shorts {
                out.push_str(dbid_l);
                out.push('=');
                out.push_str(dbid_s);
                out.push('\n');
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.namespaces.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.values().all(BTreeSet::is_empty)
    }

    fn generate_short_id(&self, dbid_l: &str) -> String {
        loop {
            let candidate = Uuid::new_v4().simple().to_string()[..SHORT_ID_LEN].to_string();
            let taken = self
                .namespaces
                .get(dbid_l)
                .is_some_and(|shorts| shorts.contains(&candidate));
            if !taken {
                return candidate;
            }
        }
    }
}

impl ShortIdRegistry for InMemoryShortIdRegistry {
    fn resolve(&self, dbid_l: &str, dbid_s: &str) -> Option<DocumentId> {
        let shorts = self.namespaces.get(dbid_l)?;
        if !shorts.contains(dbid_s) {
            return None;
        }
        DocumentId::new(dbid_l, dbid_s).ok()
    }

    fn validate_unique(&self, dbid_l: &str, dbid_s: &str) -> Result<(), RegistryError> {
        let taken = self
            .namespaces
            .get(dbid_l)
            .is_some_and(|shorts| shorts.contains(dbid_s));
        if taken {
            return Err(RegistryError::DuplicateShortId {
                dbid_l: dbid_l.to_string(),
                dbid_s: dbid_s.to_string(),
            });
        }
        Ok(())
    }

    fn register(&mut self, dbid_l: &str, dbid_s: Option<&str>) -> Result<DocumentId, RegistryError> {
        let dbid_s = match dbid_s {
            Some(value) => {
                self.validate_unique(dbid_l, value)?;
                value.to_string()
            }
            None => self.generate_short_id(dbid_l),
        };

        let id = DocumentId::new(dbid_l, dbid_s)?;
        self.namespaces
            .entry(id.dbid_l.clone())
            .or_default()
            .insert(id.dbid_s.clone());
        Ok(id)
    }

    fn unregister(&mut self, dbid_l: &str, dbid_s: &str) -> bool {
        self.namespaces
            .get_mut(dbid_l)
            .is_some_and(|shorts| shorts.remove(dbid_s))
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryShortIdRegistry, RegistryError, ShortIdRegistry};

    #[test]
    fn registers_and_resolves_pairs() {
        let mut registry = InMemoryShortIdRegistry::new();
        let id = registry.register("DocumentData", Some("ab12cd34")).unwrap();
        assert_eq!(id.to_string(), "DocumentData:ab12cd34");
        assert_eq!(registry.resolve("DocumentData", "ab12cd34"), Some(id));
        assert_eq!(registry.resolve("DocumentData", "missing"), None);
    }

    #[test]
    fn rejects_duplicate_short_id_within_namespace() {
        let mut registry = InMemoryShortIdRegistry::new();
        registry.register("docs", Some("a1")).unwrap();
        let err = registry.register("docs", Some("a1")).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateShortId { .. }));
    }

    #[test]
    fn same_short_id_allowed_in_different_namespaces() {
        let mut registry = InMemoryShortIdRegistry::new();
        registry.register("docs", Some("a1")).unwrap();
        registry.register("notes", Some("a1")).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn generates_short_id_when_not_provided() {
        let mut registry = InMemoryShortIdRegistry::new();
        let id = registry.register("docs", None).unwrap();
        assert_eq!(id.dbid_s.len(), 8);
        assert!(registry.resolve("docs", &id.dbid_s).is_some());
    }

    #[test]
    fn unregister_removes_pair() {
        let mut registry = InMemoryShortIdRegistry::new();
        registry.register("docs", Some("a1")).unwrap();
        assert!(registry.unregister("docs", "a1"));
        assert!(!registry.unregister("docs", "a1"));
        assert!(registry.is_empty());
    }

    #[test]
    fn parses_lstable_text() {
        let registry =
            InMemoryShortIdRegistry::from_lstable("DocumentData=ab12cd34\n\nnotes=n1\n").unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.resolve("notes", "n1").is_some());
    }

    #[test]
    fn lstable_round_trip() {
        let text = "DocumentData=ab12cd34\nnotes=n1\n";
        let registry = InMemoryShortIdRegistry::from_lstable(text).unwrap();
        assert_eq!(registry.render_lstable(), text);
    }

    #[test]
    fn rejects_malformed_lstable_lines() {
        let err = InMemoryShortIdRegistry::from_lstable("DocumentData\n").unwrap_err();
        assert!(matches!(err, RegistryError::MalformedEntry { line_no: 1, .. }));

        let err = InMemoryShortIdRegistry::from_lstable("a=b\nbad:pair=x\n").unwrap_err();
        assert!(matches!(err, RegistryError::MalformedEntry { line_no: 2, .. }));
    }

    #[test]
    fn rejects_duplicate_lstable_entries() {
        let err = InMemoryShortIdRegistry::from_lstable("a=b\na=b\n").unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateShortId { .. }));
    }
}
