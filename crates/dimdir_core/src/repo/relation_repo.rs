//! Relation graph repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist typed directed edges between content ids and addresses.
//! - Keep the graph keyed by `(source, target, relation_type)`: re-adding an
//!   existing triple merges metadata instead of duplicating the edge.
//!
//! # Invariants
//! - Both endpoints must resolve to a live content unit or occurrence.
//! - Query results are returned in edge insertion order.

use crate::db::DbError;
use crate::model::relation::{Direction, Metadata, NodeRef, RelationEdge};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RelationRepoResult<T> = Result<T, RelationRepoError>;

/// Errors from relation graph operations.
#[derive(Debug)]
pub enum RelationRepoError {
    /// Endpoint does not resolve to an existing content unit or occurrence.
    DanglingReference(NodeRef),
    /// Relation type is empty after trimming.
    InvalidRelationType(String),
    Db(DbError),
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    InvalidData(String),
}

impl Display for RelationRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DanglingReference(node) => write!(f, "dangling reference: {node}"),
            Self::InvalidRelationType(value) => {
                write!(f, "invalid relation type `{value}`: must be non-empty")
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "relation repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid relation data: {message}"),
        }
    }
}

impl Error for RelationRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RelationRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RelationRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for the relation graph.
pub trait RelationRepository {
    /// Adds one edge, or merges metadata into the existing edge with the same
    /// `(source, target, relation_type)` triple. Incoming keys win.
    fn add_relation(
        &self,
        source: &NodeRef,
        target: &NodeRef,
        relation_type: &str,
        metadata: Metadata,
    ) -> RelationRepoResult<RelationEdge>;
    /// Edges touching the node in the given direction, optionally filtered
    /// by relation type, in insertion order.
    fn query_relations(
        &self,
        node: &NodeRef,
        relation_type: Option<&str>,
        direction: Direction,
    ) -> RelationRepoResult<Vec<RelationEdge>>;
    /// Removes edges orphaned by an endpoint that no longer resolves.
    /// Returns the number of edges removed.
    fn prune_dangling(&self) -> RelationRepoResult<u32>;
}

/// SQLite-backed relation repository.
pub struct SqliteRelationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRelationRepository<'conn> {
    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RelationRepoResult<Self> {
        let found: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'relations';",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if found.is_none() {
            return Err(RelationRepoError::MissingRequiredTable("relations"));
        }
        Ok(Self { conn })
    }
}

impl RelationRepository for SqliteRelationRepository<'_> {
    fn add_relation(
        &self,
        source: &NodeRef,
        target: &NodeRef,
        relation_type: &str,
        metadata: Metadata,
    ) -> RelationRepoResult<RelationEdge> {
        let relation_type = relation_type.trim();
        if relation_type.is_empty() {
            return Err(RelationRepoError::InvalidRelationType(
                relation_type.to_string(),
            ));
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_node_resolves(&tx, source)?;
        ensure_node_resolves(&tx, target)?;

        let existing: Option<(i64, Option<String>)> = tx
            .query_row(
                "SELECT id, metadata FROM relations
                 WHERE source_kind = ?1 AND source_key = ?2
                   AND target_kind = ?3 AND target_key = ?4
                   AND relation_type = ?5;",
                params![
                    source.kind(),
                    source.key(),
                    target.kind(),
                    target.key(),
                    relation_type
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let merged = match existing {
            Some((edge_id, stored)) => {
                let mut merged = decode_metadata(stored.as_deref())?;
                merged.extend(metadata);
                tx.execute(
                    "UPDATE relations SET metadata = ?2 WHERE id = ?1;",
                    params![edge_id, encode_metadata(&merged)?],
                )?;
                merged
            }
            None => {
                tx.execute(
                    "INSERT INTO relations (
                        source_kind,
                        source_key,
                        target_kind,
                        target_key,
                        relation_type,
                        metadata
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                    params![
                        source.kind(),
                        source.key(),
                        target.kind(),
                        target.key(),
                        relation_type,
                        encode_metadata(&metadata)?
                    ],
                )?;
                metadata
            }
        };
        tx.commit()?;

        Ok(RelationEdge {
            source: source.clone(),
            target: target.clone(),
            relation_type: relation_type.to_string(),
            metadata: merged,
        })
    }

    fn query_relations(
        &self,
        node: &NodeRef,
        relation_type: Option<&str>,
        direction: Direction,
    ) -> RelationRepoResult<Vec<RelationEdge>> {
        let mut sql = String::from(
            "SELECT source_kind, source_key, target_kind, target_key, relation_type, metadata
             FROM relations WHERE ",
        );
        sql.push_str(match direction {
            Direction::Outgoing => "(source_kind = ?1 AND source_key = ?2)",
            Direction::Incoming => "(target_kind = ?1 AND target_key = ?2)",
            Direction::Both => {
                "((source_kind = ?1 AND source_key = ?2) OR (target_kind = ?1 AND target_key = ?2))"
            }
        });

        let mut bind_values: Vec<Value> = vec![
            Value::Text(node.kind().to_string()),
            Value::Text(node.key()),
        ];
        if let Some(relation_type) = relation_type {
            sql.push_str(" AND relation_type = ?3");
            bind_values.push(Value::Text(relation_type.to_string()));
        }
        sql.push_str(" ORDER BY id ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next()? {
            edges.push(parse_edge_row(row)?);
        }
        Ok(edges)
    }

    fn prune_dangling(&self) -> RelationRepoResult<u32> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let removed = tx.execute(
            "DELETE FROM relations WHERE id IN (
                SELECT r.id FROM relations r
                WHERE (r.source_kind = 'content'
                       AND NOT EXISTS (SELECT 1 FROM content_units c
                                       WHERE c.content_id = r.source_key))
                   OR (r.target_kind = 'content'
                       AND NOT EXISTS (SELECT 1 FROM content_units c
                                       WHERE c.content_id = r.target_key))
                   OR (r.source_kind = 'occurrence'
                       AND NOT EXISTS (SELECT 1 FROM occurrences o
                                       WHERE o.dbid_l || ':' || o.dbid_s || '-' || o.position
                                             = r.source_key))
                   OR (r.target_kind = 'occurrence'
                       AND NOT EXISTS (SELECT 1 FROM occurrences o
                                       WHERE o.dbid_l || ':' || o.dbid_s || '-' || o.position
                                             = r.target_key))
            );",
            [],
        )?;
        tx.commit()?;
        Ok(removed as u32)
    }
}

fn ensure_node_resolves(conn: &Connection, node: &NodeRef) -> RelationRepoResult<()> {
    let found: Option<i64> = match node {
        NodeRef::Content(id) => conn
            .query_row(
                "SELECT 1 FROM content_units WHERE content_id = ?1;",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?,
        NodeRef::Occurrence(address) => conn
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
            .optional()?,
    };

    if found.is_none() {
        return Err(RelationRepoError::DanglingReference(node.clone()));
    }
    Ok(())
}

fn encode_metadata(metadata: &Metadata) -> RelationRepoResult<Option<String>> {
    if metadata.is_empty() {
        return Ok(None);
    }
    let encoded = serde_json::to_string(metadata)
        .map_err(|err| RelationRepoError::InvalidData(format!("unencodable metadata: {err}")))?;
    Ok(Some(encoded))
}

fn decode_metadata(stored: Option<&str>) -> RelationRepoResult<Metadata> {
    match stored {
        None => Ok(Metadata::new()),
        Some(text) => serde_json::from_str(text).map_err(|err| {
            RelationRepoError::InvalidData(format!("invalid metadata json `{text}`: {err}"))
        }),
    }
}

fn parse_edge_row(row: &Row<'_>) -> RelationRepoResult<RelationEdge> {
    let source_kind: String = row.get("source_kind")?;
    let source_key: String = row.get("source_key")?;
    let target_kind: String = row.get("target_kind")?;
    let target_key: String = row.get("target_key")?;

    let source = NodeRef::from_kind_key(&source_kind, &source_key)
        .map_err(|err| RelationRepoError::InvalidData(format!("bad source endpoint: {err}")))?;
    let target = NodeRef::from_kind_key(&target_kind, &target_key)
        .map_err(|err| RelationRepoError::InvalidData(format!("bad target endpoint: {err}")))?;

    let stored: Option<String> = row.get("metadata")?;
    Ok(RelationEdge {
        source,
        target,
        relation_type: row.get("relation_type")?,
        metadata: decode_metadata(stored.as_deref())?,
    })
}
