//! Formula evaluation against the ledger and relation graph.
//!
//! # Responsibility
//! - Resolve cell references relative to the context cell.
//! - Dispatch builtin functions through the name-keyed registry.
//!
//! # Invariants
//! - Builtins are a closed enum; extensibility is by registering aliases,
//!   not by dynamic lookup of arbitrary code.
//! - A reference that resolves to the context cell itself is rejected as
//!   circular; data cells cannot host formulas, so deeper cycles cannot form.

use crate::formula::parser::{parse, Expr};
use crate::formula::{ContextCell, EvalError, EvalResult, Value};
use crate::model::address::Address;
use crate::model::content::{content_id_for, ContentId, NormalizationPolicy};
use crate::model::relation::{Direction, NodeRef, RelationEdge};
use crate::repo::content_repo::ContentRepository;
use crate::repo::ledger_repo::{LedgerError, LedgerRepository};
use crate::repo::relation_repo::RelationRepository;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Closed set of operations the evaluator can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinFunction {
    /// `rel(ref, type)`: texts related to the referenced cell.
    Rel,
    /// `rel.count(ref [, type])`: number of edges touching the cell.
    RelCount,
    /// `addr(ref | text)`: every occurrence address of the content.
    Addr,
    /// `id(ref | text)`: content id of the referenced sentence.
    Id,
}

impl BuiltinFunction {
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Self::Rel => "rel",
            Self::RelCount => "rel.count",
            Self::Addr => "addr",
            Self::Id => "id",
        }
    }
}

/// Errors from function registry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionRegistryError {
    InvalidName(String),
    DuplicateName(String),
}

impl Display for FunctionRegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "function name is invalid: `{name}`"),
            Self::DuplicateName(name) => write!(f, "function name already registered: `{name}`"),
        }
    }
}

impl Error for FunctionRegistryError {}

/// Name-to-builtin dispatch table.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    entries: BTreeMap<String, BuiltinFunction>,
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the default names plus the `rel.all` alias kept for
    /// callers that used the long form.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for builtin in [
            BuiltinFunction::Rel,
            BuiltinFunction::RelCount,
            BuiltinFunction::Addr,
            BuiltinFunction::Id,
        ] {
            registry
                .register(builtin.canonical_name(), builtin)
                .expect("builtin names are valid and distinct");
        }
        registry
            .register("rel.all", BuiltinFunction::Rel)
            .expect("alias name is valid and distinct");
        registry
    }

    /// Registers one name for a builtin operation.
    pub fn register(
        &mut self,
        name: &str,
        builtin: BuiltinFunction,
    ) -> Result<(), FunctionRegistryError> {
        let name = name.trim();
        if !is_valid_function_name(name) {
            return Err(FunctionRegistryError::InvalidName(name.to_string()));
        }
        if self.entries.contains_key(name) {
            return Err(FunctionRegistryError::DuplicateName(name.to_string()));
        }
        self.entries.insert(name.to_string(), builtin);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<BuiltinFunction> {
        self.entries.get(name).copied()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

fn is_valid_function_name(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_lowercase() {
        return false;
    }
    value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.')
}

/// Formula evaluator bound to one set of repositories.
pub struct Evaluator<'a, L, C, R>
where
    L: LedgerRepository,
    C: ContentRepository,
    R: RelationRepository,
{
    ledger: &'a L,
    content: &'a C,
    relations: &'a R,
    policy: NormalizationPolicy,
    functions: FunctionRegistry,
}

impl<'a, L, C, R> Evaluator<'a, L, C, R>
where
    L: LedgerRepository,
    C: ContentRepository,
    R: RelationRepository,
{
    pub fn new(
        ledger: &'a L,
        content: &'a C,
        relations: &'a R,
        policy: NormalizationPolicy,
    ) -> Self {
        Self {
            ledger,
            content,
            relations,
            policy,
            functions: FunctionRegistry::with_builtins(),
        }
    }

    /// Evaluator with a caller-provided dispatch table.
    pub fn with_registry(
        ledger: &'a L,
        content: &'a C,
        relations: &'a R,
        policy: NormalizationPolicy,
        functions: FunctionRegistry,
    ) -> Self {
        Self {
            ledger,
            content,
            relations,
            policy,
            functions,
        }
    }

    /// Evaluates one formula at the given context cell.
    ///
    /// A top-level reference result is dereferenced to the sentence text at
    /// that address, matching spreadsheet display semantics.
    pub fn evaluate(&self, formula: &str, context: &ContextCell) -> EvalResult<Value> {
        let expr = parse(formula)?;
        let value = self.eval_expr(&expr, context)?;
        match value {
            Value::Reference(address) => self.sentence_text(&address),
            other => Ok(other),
        }
    }

    fn eval_expr(&self, expr: &Expr, context: &ContextCell) -> EvalResult<Value> {
        match expr {
            Expr::Number(value) => Ok(Value::Number(*value)),
            Expr::Text(value) => Ok(Value::Text(value.clone())),
            Expr::Bool(value) => Ok(Value::Bool(*value)),
            Expr::Cell { col, row } => self.resolve_cell(context, *row, *col),
            Expr::RelativeCell { drow, dcol } => {
                let row = i64::from(context.row) + drow;
                let col = i64::from(context.col) + dcol;
                if row < 0 || col < 0 || row > i64::from(u32::MAX) || col > i64::from(u32::MAX) {
                    return Err(EvalError::ReferenceOutOfRange {
                        drow: *drow,
                        dcol: *dcol,
                    });
                }
                self.resolve_cell(context, row as u32, col as u32)
            }
            Expr::Call { name, args } => {
                let Some(builtin) = self.functions.lookup(name) else {
                    return Err(EvalError::UnknownFunction(name.clone()));
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expr(arg, context)?);
                }
                self.dispatch(name, builtin, values)
            }
        }
    }

    /// Resolves a cell coordinate into an occurrence reference.
    ///
    /// Rows map onto zero-based sentence positions in the context document.
    fn resolve_cell(&self, context: &ContextCell, row: u32, col: u32) -> EvalResult<Value> {
        if row == context.row && col == context.col {
            return Err(EvalError::CircularReference { row, col });
        }
        Ok(Value::Reference(Address::new(
            context.document.clone(),
            row,
        )))
    }

    fn dispatch(
        &self,
        name: &str,
        builtin: BuiltinFunction,
        args: Vec<Value>,
    ) -> EvalResult<Value> {
        match builtin {
            BuiltinFunction::Rel => {
                expect_arity(name, &args, 2, 2)?;
                let address = expect_reference(name, &args, 0)?;
                let relation_type = expect_text(name, &args, 1)?;
                let neighbors = self.related_texts(&address, Some(&relation_type))?;
                Ok(Value::List(neighbors.into_iter().map(Value::Text).collect()))
            }
            BuiltinFunction::RelCount => {
                expect_arity(name, &args, 1, 2)?;
                let address = expect_reference(name, &args, 0)?;
                let relation_type = if args.len() == 2 {
                    Some(expect_text(name, &args, 1)?)
                } else {
                    None
                };
                let edges = self.touching_edges(&address, relation_type.as_deref())?;
                Ok(Value::Number(edges.len() as f64))
            }
            BuiltinFunction::Addr => {
                expect_arity(name, &args, 1, 1)?;
                let content_id = self.content_id_of_arg(name, &args, 0)?;
                let addresses = self.ledger.occurrences_of(content_id)?;
                Ok(Value::List(
                    addresses
                        .into_iter()
                        .map(|address| Value::Text(address.to_string()))
                        .collect(),
                ))
            }
            BuiltinFunction::Id => {
                expect_arity(name, &args, 1, 1)?;
                let content_id = self.content_id_of_arg(name, &args, 0)?;
                Ok(Value::Text(content_id.to_string()))
            }
        }
    }

    /// Content id of a `reference` or `text` argument.
    fn content_id_of_arg(
        &self,
        function: &str,
        args: &[Value],
        index: usize,
    ) -> EvalResult<ContentId> {
        match &args[index] {
            Value::Reference(address) => Ok(self.ledger.content_at(address)?),
            Value::Text(text) => Ok(content_id_for(&self.policy.normalize(text))),
            other => Err(EvalError::TypeMismatch {
                function: function.to_string(),
                argument: index + 1,
                expected: "reference or text",
                got: other.kind(),
            }),
        }
    }

    /// Edges touching the occurrence at `address` and, when the address is
    /// allocated, edges touching its content id. Occurrence-level edges come
    /// first; each group keeps insertion order.
    fn touching_edges(
        &self,
        address: &Address,
        relation_type: Option<&str>,
    ) -> EvalResult<Vec<(NodeRef, RelationEdge)>> {
        let mut results = Vec::new();

        let occurrence_node = NodeRef::Occurrence(address.clone());
        for edge in self
            .relations
            .query_relations(&occurrence_node, relation_type, Direction::Both)?
        {
            results.push((occurrence_node.clone(), edge));
        }

        match self.ledger.content_at(address) {
            Ok(content_id) => {
                let content_node = NodeRef::Content(content_id);
                for edge in self
                    .relations
                    .query_relations(&content_node, relation_type, Direction::Both)?
                {
                    results.push((content_node.clone(), edge));
                }
            }
            // An unallocated cell simply has no content-level relations.
            Err(LedgerError::UnknownAddress(_)) => {}
            Err(err) => return Err(err.into()),
        }

        Ok(results)
    }

    /// Neighbor sentence texts for edges touching the referenced cell.
    fn related_texts(
        &self,
        address: &Address,
        relation_type: Option<&str>,
    ) -> EvalResult<Vec<String>> {
        let mut texts = Vec::new();
        for (node, edge) in self.touching_edges(address, relation_type)? {
            let neighbor = if edge.source == node {
                edge.target
            } else {
                edge.source
            };
            if let Some(text) = self.node_text(&neighbor)? {
                texts.push(text);
            }
        }
        Ok(texts)
    }

    fn node_text(&self, node: &NodeRef) -> EvalResult<Option<String>> {
        let content_id = match node {
            NodeRef::Content(id) => *id,
            NodeRef::Occurrence(address) => match self.ledger.content_at(address) {
                Ok(id) => id,
                Err(LedgerError::UnknownAddress(_)) => return Ok(None),
                Err(err) => return Err(err.into()),
            },
        };
        Ok(self.content.get_unit(content_id)?.map(|unit| unit.raw_text))
    }

    fn sentence_text(&self, address: &Address) -> EvalResult<Value> {
        let content_id = self.ledger.content_at(address)?;
        match self.content.get_unit(content_id)? {
            Some(unit) => Ok(Value::Text(unit.raw_text)),
            None => Ok(Value::Null),
        }
    }
}

fn expect_arity(function: &str, args: &[Value], min: usize, max: usize) -> EvalResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min}..{max}")
        };
        return Err(EvalError::ArityMismatch {
            function: function.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn expect_reference(function: &str, args: &[Value], index: usize) -> EvalResult<Address> {
    match &args[index] {
        Value::Reference(address) => Ok(address.clone()),
        other => Err(EvalError::TypeMismatch {
            function: function.to_string(),
            argument: index + 1,
            expected: "reference",
            got: other.kind(),
        }),
    }
}

fn expect_text(function: &str, args: &[Value], index: usize) -> EvalResult<String> {
    match &args[index] {
        Value::Text(text) => Ok(text.clone()),
        other => Err(EvalError::TypeMismatch {
            function: function.to_string(),
            argument: index + 1,
            expected: "text",
            got: other.kind(),
        }),
    }
}
