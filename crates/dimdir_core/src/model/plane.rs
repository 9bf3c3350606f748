//! Declarative address-plane schemas.
//!
//! # Responsibility
//! - Parse and validate the three read-only schema documents: object-field
//!   schema, plane hierarchy schema, and field-to-column mapping.
//! - Translate external object fields onto plane column coordinates.
//!
//! # Invariants
//! - Schemas are immutable inputs; the core never writes them back.
//! - Level and column indexes are unique inside one plane.

use crate::model::document::DocumentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Plane identifier pair, same shape as document identifiers.
pub type PlaneId = DocumentId;

/// Errors from schema parsing, validation, or field translation.
#[derive(Debug)]
pub enum PlaneError {
    Parse(serde_json::Error),
    EmptyLevels,
    DuplicateLevelIndex(u32),
    DuplicateColumnIndex(u32),
    DuplicateColumnName(String),
    DuplicateFieldName(String),
    /// Mapping entry names a field absent from the object schema.
    UnknownField(String),
    /// Mapping entry names a column absent from the plane.
    UnknownColumn(String),
    /// One object field is mapped twice.
    DuplicateFieldMapping(String),
    /// Mapping declared for a different object type or plane.
    SchemaMismatch { expected: String, got: String },
}

impl Display for PlaneError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid schema document: {err}"),
            Self::EmptyLevels => write!(f, "plane must declare at least one level"),
            Self::DuplicateLevelIndex(index) => {
                write!(f, "duplicate level index {index} in plane")
            }
            Self::DuplicateColumnIndex(index) => {
                write!(f, "duplicate column index {index} in plane")
            }
            Self::DuplicateColumnName(name) => {
                write!(f, "duplicate column name `{name}` in plane")
            }
            Self::DuplicateFieldName(name) => {
                write!(f, "duplicate field name `{name}` in object schema")
            }
            Self::UnknownField(name) => write!(f, "mapping references unknown field `{name}`"),
            Self::UnknownColumn(name) => write!(f, "mapping references unknown column `{name}`"),
            Self::DuplicateFieldMapping(name) => {
                write!(f, "field `{name}` is mapped more than once")
            }
            Self::SchemaMismatch { expected, got } => {
                write!(f, "mapping targets `{got}`, expected `{expected}`")
            }
        }
    }
}

impl Error for PlaneError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PlaneError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Scalar kind of one external object field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Bool,
}

/// One field declaration in the object schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectField {
    pub name: String,
    pub kind: FieldKind,
}

/// External object shape whose fields can be mapped onto a plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub object_type: String,
    pub fields: Vec<ObjectField>,
}

impl ObjectSchema {
    /// Parses and validates an object schema document.
    pub fn from_json(text: &str) -> Result<Self, PlaneError> {
        let schema: Self = serde_json::from_str(text)?;
        schema.validate()?;
        Ok(schema)
    }

    fn validate(&self) -> Result<(), PlaneError> {
        let mut names = BTreeSet::new();
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(PlaneError::DuplicateFieldName(field.name.clone()));
            }
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&ObjectField> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// One hierarchy level of a plane, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelDef {
    pub name: String,
    pub index: u32,
}

/// One addressable column of a plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub index: u32,
}

/// Named hierarchical schema consumed read-only by the address resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPlane {
    pub plane_id: PlaneId,
    pub levels: Vec<LevelDef>,
    pub columns: Vec<ColumnDef>,
}

impl AddressPlane {
    /// Parses and validates a plane hierarchy document.
    pub fn from_json(text: &str) -> Result<Self, PlaneError> {
        let plane: Self = serde_json::from_str(text)?;
        plane.validate()?;
        Ok(plane)
    }

    fn validate(&self) -> Result<(), PlaneError> {
        if self.levels.is_empty() {
            return Err(PlaneError::EmptyLevels);
        }
        let mut level_indexes = BTreeSet::new();
        for level in &self.levels {
            if !level_indexes.insert(level.index) {
                return Err(PlaneError::DuplicateLevelIndex(level.index));
            }
        }
        let mut column_indexes = BTreeSet::new();
        let mut column_names = BTreeSet::new();
        for column in &self.columns {
            if !column_indexes.insert(column.index) {
                return Err(PlaneError::DuplicateColumnIndex(column.index));
            }
            if !column_names.insert(column.name.as_str()) {
                return Err(PlaneError::DuplicateColumnName(column.name.clone()));
            }
        }
        Ok(())
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_by_index(&self, index: u32) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.index == index)
    }
}

/// One field-to-column assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub field: String,
    pub column: String,
}

/// Field-to-column mapping binding one object schema to one plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub object_type: String,
    pub plane_id: PlaneId,
    pub entries: Vec<MappingEntry>,
}

impl FieldMapping {
    /// Parses a mapping document and validates it against its schema and plane.
    pub fn from_json(
        text: &str,
        schema: &ObjectSchema,
        plane: &AddressPlane,
    ) -> Result<Self, PlaneError> {
        let mapping: Self = serde_json::from_str(text)?;
        mapping.validate(schema, plane)?;
        Ok(mapping)
    }

    /// Validates that every entry refers to a declared field and column.
    pub fn validate(&self, schema: &ObjectSchema, plane: &AddressPlane) -> Result<(), PlaneError> {
        if self.object_type != schema.object_type {
            return Err(PlaneError::SchemaMismatch {
                expected: schema.object_type.clone(),
                got: self.object_type.clone(),
            });
        }
        if self.plane_id != plane.plane_id {
            return Err(PlaneError::SchemaMismatch {
                expected: plane.plane_id.to_string(),
                got: self.plane_id.to_string(),
            });
        }

        let mut mapped = BTreeSet::new();
        for entry in &self.entries {
            if schema.field(&entry.field).is_none() {
                return Err(PlaneError::UnknownField(entry.field.clone()));
            }
            if plane.column_by_name(&entry.column).is_none() {
                return Err(PlaneError::UnknownColumn(entry.column.clone()));
            }
            if !mapped.insert(entry.field.as_str()) {
                return Err(PlaneError::DuplicateFieldMapping(entry.field.clone()));
            }
        }
        Ok(())
    }

    /// Resolves the plane column index for one object field.
    pub fn column_index(&self, plane: &AddressPlane, field: &str) -> Option<u32> {
        let entry = self.entries.iter().find(|entry| entry.field == field)?;
        plane.column_by_name(&entry.column).map(|column| column.index)
    }
}
