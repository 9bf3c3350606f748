//! Relation graph edge model.
//!
//! # Responsibility
//! - Define edge endpoints over content ids and occurrence addresses.
//! - Define the scalar metadata shape stored per edge.
//!
//! # Invariants
//! - An edge is keyed by the `(source, target, relation_type)` triple.
//! - Metadata values are scalars only (text, number, bool).

use crate::model::address::{Address, AddressParseError};
use crate::model::content::ContentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Kind tag used when persisting a node reference.
pub const NODE_KIND_CONTENT: &str = "content";
/// Kind tag used when persisting a node reference.
pub const NODE_KIND_OCCURRENCE: &str = "occurrence";

/// One edge endpoint.
///
/// Content-level references attach semantics to every occurrence of the
/// sentence; occurrence-level references pin one place in one document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    Content(ContentId),
    Occurrence(Address),
}

impl NodeRef {
    /// Storage kind discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Content(_) => NODE_KIND_CONTENT,
            Self::Occurrence(_) => NODE_KIND_OCCURRENCE,
        }
    }

    /// Storage key string for this endpoint.
    pub fn key(&self) -> String {
        match self {
            Self::Content(id) => id.to_string(),
            Self::Occurrence(address) => address.to_string(),
        }
    }

    /// Reconstructs a reference from its persisted `(kind, key)` pair.
    pub fn from_kind_key(kind: &str, key: &str) -> Result<Self, NodeRefDecodeError> {
        match kind {
            NODE_KIND_CONTENT => {
                let id = Uuid::parse_str(key)
                    .map_err(|_| NodeRefDecodeError::InvalidContentId(key.to_string()))?;
                Ok(Self::Content(id))
            }
            NODE_KIND_OCCURRENCE => Ok(Self::Occurrence(Address::parse(key)?)),
            other => Err(NodeRefDecodeError::UnknownKind(other.to_string())),
        }
    }
}

impl Display for NodeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.key())
    }
}

/// Errors from decoding persisted node references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRefDecodeError {
    UnknownKind(String),
    InvalidContentId(String),
    InvalidAddress(AddressParseError),
}

impl Display for NodeRefDecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownKind(kind) => write!(f, "unknown node kind `{kind}`"),
            Self::InvalidContentId(key) => write!(f, "invalid content id `{key}`"),
            Self::InvalidAddress(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for NodeRefDecodeError {}

impl From<AddressParseError> for NodeRefDecodeError {
    fn from(value: AddressParseError) -> Self {
        Self::InvalidAddress(value)
    }
}

/// Scalar metadata value attached to an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

/// Edge metadata: string keys to scalar values, stored as one JSON object.
pub type Metadata = BTreeMap<String, MetaValue>;

/// One directed, typed relation edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub source: NodeRef,
    pub target: NodeRef,
    pub relation_type: String,
    pub metadata: Metadata,
}

/// Traversal direction for relation queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Edges where the node is the source.
    Outgoing,
    /// Edges where the node is the target.
    Incoming,
    /// Edges touching the node on either side.
    Both,
}

#[cfg(test)]
mod tests {
    use super::{MetaValue, NodeRef, NodeRefDecodeError};
    use crate::model::address::Address;
    use crate::model::content::content_id_for;
    use crate::model::document::DocumentId;

    #[test]
    fn node_ref_kind_key_round_trip() {
        let content = NodeRef::Content(content_id_for("hello world"));
        let occurrence = NodeRef::Occurrence(Address::new(
            DocumentId::new("doc", "123").unwrap(),
            2,
        ));

        for node in [content, occurrence] {
            let decoded = NodeRef::from_kind_key(node.kind(), &node.key()).unwrap();
            assert_eq!(decoded, node);
        }
    }

    #[test]
    fn decode_rejects_unknown_kind_and_bad_keys() {
        assert!(matches!(
            NodeRef::from_kind_key("token", "x"),
            Err(NodeRefDecodeError::UnknownKind(_))
        ));
        assert!(matches!(
            NodeRef::from_kind_key("content", "not-a-uuid"),
            Err(NodeRefDecodeError::InvalidContentId(_))
        ));
        assert!(matches!(
            NodeRef::from_kind_key("occurrence", "doc:123"),
            Err(NodeRefDecodeError::InvalidAddress(_))
        ));
    }

    #[test]
    fn meta_value_serializes_as_bare_scalar() {
        assert_eq!(
            serde_json::to_string(&MetaValue::Text("x".to_string())).unwrap(),
            "\"x\""
        );
        assert_eq!(serde_json::to_string(&MetaValue::Number(1.5)).unwrap(), "1.5");
        assert_eq!(serde_json::to_string(&MetaValue::Bool(true)).unwrap(), "true");
    }
}
