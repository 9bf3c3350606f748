use dimdir_core::db::open_db_in_memory;
use dimdir_core::formula::parser::ParseError;
use dimdir_core::{
    ContextCell, DirectoryService, DocumentId, EvalError, Evaluator, InMemoryShortIdRegistry,
    LedgerError, Metadata, NodeRef, NormalizationPolicy, RelationRepository,
    SqliteContentRepository, SqliteLedgerRepository, SqliteRelationRepository,
    TerminatorSplitter, Value,
};
use rusqlite::Connection;

fn ingest_fixture(conn: &Connection) -> DocumentId {
    let mut service = DirectoryService::new(
        SqliteLedgerRepository::try_new(conn).unwrap(),
        SqliteContentRepository::new(conn),
        InMemoryShortIdRegistry::new(),
        TerminatorSplitter,
        NormalizationPolicy::default(),
    );
    let receipt = service
        .ingest_document("doc", Some("d1"), "Alpha one. Beta two. Gamma three.")
        .unwrap();
    receipt.document_id
}

fn identify(text: &str) -> NodeRef {
    NodeRef::Content(dimdir_core::content_id_for(
        &NormalizationPolicy::default().normalize(text),
    ))
}

#[test]
fn rel_returns_empty_sequence_when_no_relations_exist() {
    let conn = open_db_in_memory().unwrap();
    let document = ingest_fixture(&conn);

    let ledger = SqliteLedgerRepository::try_new(&conn).unwrap();
    let content = SqliteContentRepository::new(&conn);
    let relations = SqliteRelationRepository::try_new(&conn).unwrap();
    let evaluator = Evaluator::new(&ledger, &content, &relations, NormalizationPolicy::default());

    let context = ContextCell::new(document, 0, 2);
    let value = evaluator.evaluate("rel(A1, 'synonym')", &context).unwrap();
    assert_eq!(value, Value::List(vec![]));
}

#[test]
fn rel_returns_neighbor_texts_for_content_level_edges() {
    let conn = open_db_in_memory().unwrap();
    let document = ingest_fixture(&conn);

    let ledger = SqliteLedgerRepository::try_new(&conn).unwrap();
    let content = SqliteContentRepository::new(&conn);
    let relations = SqliteRelationRepository::try_new(&conn).unwrap();
    relations
        .add_relation(
            &identify("Alpha one"),
            &identify("Beta two"),
            "synonym",
            Metadata::new(),
        )
        .unwrap();

    let evaluator = Evaluator::new(&ledger, &content, &relations, NormalizationPolicy::default());
    let context = ContextCell::new(document, 0, 2);

    let value = evaluator.evaluate("rel(A1, 'synonym')", &context).unwrap();
    assert_eq!(value, Value::List(vec![Value::Text("Beta two".to_string())]));

    // The alias registered for the long form behaves identically.
    let value = evaluator.evaluate("rel.all(A1, 'synonym')", &context).unwrap();
    assert_eq!(value, Value::List(vec![Value::Text("Beta two".to_string())]));

    // Relation type filters are exact.
    let value = evaluator.evaluate("rel(A1, 'antonym')", &context).unwrap();
    assert_eq!(value, Value::List(vec![]));
}

#[test]
fn rel_count_counts_edges_with_optional_type() {
    let conn = open_db_in_memory().unwrap();
    let document = ingest_fixture(&conn);

    let ledger = SqliteLedgerRepository::try_new(&conn).unwrap();
    let content = SqliteContentRepository::new(&conn);
    let relations = SqliteRelationRepository::try_new(&conn).unwrap();
    relations
        .add_relation(
            &identify("Alpha one"),
            &identify("Beta two"),
            "synonym",
            Metadata::new(),
        )
        .unwrap();
    relations
        .add_relation(
            &identify("Alpha one"),
            &identify("Gamma three"),
            "related",
            Metadata::new(),
        )
        .unwrap();

    let evaluator = Evaluator::new(&ledger, &content, &relations, NormalizationPolicy::default());
    let context = ContextCell::new(document, 2, 1);

    assert_eq!(
        evaluator.evaluate("rel.count(A1)", &context).unwrap(),
        Value::Number(2.0)
    );
    assert_eq!(
        evaluator
            .evaluate("rel.count(A1, 'synonym')", &context)
            .unwrap(),
        Value::Number(1.0)
    );
    assert_eq!(
        evaluator
            .evaluate("rel.count(A2, 'missing')", &context)
            .unwrap(),
        Value::Number(0.0)
    );
}

#[test]
fn addr_lists_every_occurrence_of_the_content() {
    let conn = open_db_in_memory().unwrap();
    let document = ingest_fixture(&conn);
    {
        let mut service = DirectoryService::new(
            SqliteLedgerRepository::try_new(&conn).unwrap(),
            SqliteContentRepository::new(&conn),
            InMemoryShortIdRegistry::new(),
            TerminatorSplitter,
            NormalizationPolicy::default(),
        );
        service
            .ingest_document("doc", Some("d2"), "Alpha one. Something else.")
            .unwrap();
    }

    let ledger = SqliteLedgerRepository::try_new(&conn).unwrap();
    let content = SqliteContentRepository::new(&conn);
    let relations = SqliteRelationRepository::try_new(&conn).unwrap();
    let evaluator = Evaluator::new(&ledger, &content, &relations, NormalizationPolicy::default());
    let context = ContextCell::new(document, 1, 1);

    let value = evaluator.evaluate("addr(A1)", &context).unwrap();
    assert_eq!(
        value,
        Value::List(vec![
            Value::Text("doc:d1-0".to_string()),
            Value::Text("doc:d2-0".to_string()),
        ])
    );

    // Text argument resolves through the same identity derivation.
    let by_text = evaluator.evaluate("addr('alpha ONE')", &context).unwrap();
    assert_eq!(by_text, value);
}

#[test]
fn id_returns_the_content_id_text() {
    let conn = open_db_in_memory().unwrap();
    let document = ingest_fixture(&conn);

    let ledger = SqliteLedgerRepository::try_new(&conn).unwrap();
    let content = SqliteContentRepository::new(&conn);
    let relations = SqliteRelationRepository::try_new(&conn).unwrap();
    let evaluator = Evaluator::new(&ledger, &content, &relations, NormalizationPolicy::default());
    let context = ContextCell::new(document, 1, 1);

    let expected = dimdir_core::content_id_for("alpha one").to_string();
    assert_eq!(
        evaluator.evaluate("id(A1)", &context).unwrap(),
        Value::Text(expected.clone())
    );
    assert_eq!(
        evaluator.evaluate("id('Alpha one')", &context).unwrap(),
        Value::Text(expected)
    );
}

#[test]
fn bare_references_dereference_to_sentence_text() {
    let conn = open_db_in_memory().unwrap();
    let document = ingest_fixture(&conn);

    let ledger = SqliteLedgerRepository::try_new(&conn).unwrap();
    let content = SqliteContentRepository::new(&conn);
    let relations = SqliteRelationRepository::try_new(&conn).unwrap();
    let evaluator = Evaluator::new(&ledger, &content, &relations, NormalizationPolicy::default());

    let context = ContextCell::new(document.clone(), 0, 1);
    assert_eq!(
        evaluator.evaluate("A2", &context).unwrap(),
        Value::Text("Beta two".to_string())
    );

    // Relative form counts from the context cell.
    let context = ContextCell::new(document, 2, 0);
    assert_eq!(
        evaluator.evaluate("(-2, 1)", &context).unwrap(),
        Value::Text("Alpha one".to_string())
    );

    let err = evaluator.evaluate("(-3, 0)", &context).unwrap_err();
    assert!(matches!(err, EvalError::ReferenceOutOfRange { .. }));
}

#[test]
fn unallocated_cell_reference_fails_with_unknown_address() {
    let conn = open_db_in_memory().unwrap();
    let document = ingest_fixture(&conn);

    let ledger = SqliteLedgerRepository::try_new(&conn).unwrap();
    let content = SqliteContentRepository::new(&conn);
    let relations = SqliteRelationRepository::try_new(&conn).unwrap();
    let evaluator = Evaluator::new(&ledger, &content, &relations, NormalizationPolicy::default());

    let context = ContextCell::new(document, 0, 1);
    let err = evaluator.evaluate("A9", &context).unwrap_err();
    assert!(matches!(err, EvalError::Ledger(LedgerError::UnknownAddress(_))));
}

#[test]
fn malformed_calls_surface_typed_errors() {
    let conn = open_db_in_memory().unwrap();
    let document = ingest_fixture(&conn);

    let ledger = SqliteLedgerRepository::try_new(&conn).unwrap();
    let content = SqliteContentRepository::new(&conn);
    let relations = SqliteRelationRepository::try_new(&conn).unwrap();
    let evaluator = Evaluator::new(&ledger, &content, &relations, NormalizationPolicy::default());
    let context = ContextCell::new(document, 0, 2);

    let err = evaluator.evaluate("nope(A1)", &context).unwrap_err();
    assert!(matches!(err, EvalError::UnknownFunction(name) if name == "nope"));

    let err = evaluator.evaluate("rel(A1)", &context).unwrap_err();
    assert!(matches!(
        err,
        EvalError::ArityMismatch { got: 1, .. }
    ));

    let err = evaluator.evaluate("rel(1, 'synonym')", &context).unwrap_err();
    assert!(matches!(
        err,
        EvalError::TypeMismatch {
            argument: 1,
            expected: "reference",
            ..
        }
    ));

    let err = evaluator.evaluate("rel(A1, 2)", &context).unwrap_err();
    assert!(matches!(
        err,
        EvalError::TypeMismatch {
            argument: 2,
            expected: "text",
            ..
        }
    ));

    let err = evaluator.evaluate("rel(A1 'synonym')", &context).unwrap_err();
    assert!(matches!(err, EvalError::Parse(ParseError::UnexpectedToken { .. })));
}

#[test]
fn self_reference_is_circular() {
    let conn = open_db_in_memory().unwrap();
    let document = ingest_fixture(&conn);

    let ledger = SqliteLedgerRepository::try_new(&conn).unwrap();
    let content = SqliteContentRepository::new(&conn);
    let relations = SqliteRelationRepository::try_new(&conn).unwrap();
    let evaluator = Evaluator::new(&ledger, &content, &relations, NormalizationPolicy::default());

    // A1 resolves to (row 0, column 0): the cell being evaluated.
    let context = ContextCell::new(document.clone(), 0, 0);
    let err = evaluator.evaluate("A1", &context).unwrap_err();
    assert!(matches!(err, EvalError::CircularReference { row: 0, col: 0 }));

    // Zero offsets point at the context cell as well.
    let err = evaluator.evaluate("rel((0, 0), 'synonym')", &context).unwrap_err();
    assert!(matches!(err, EvalError::CircularReference { .. }));
}

#[test]
fn plane_mapping_supplies_the_context_column() {
    let conn = open_db_in_memory().unwrap();
    let document = ingest_fixture(&conn);

    let schema = dimdir_core::ObjectSchema::from_json(
        r#"{
            "object_type": "sentence_record",
            "fields": [{"name": "body", "kind": "text"}]
        }"#,
    )
    .unwrap();
    let plane = dimdir_core::AddressPlane::from_json(
        r#"{
            "plane_id": {"dbid_l": "doc", "dbid_s": "p0"},
            "levels": [{"name": "document", "index": 0}, {"name": "sentence", "index": 1}],
            "columns": [{"name": "content", "index": 0}]
        }"#,
    )
    .unwrap();
    let mapping = dimdir_core::FieldMapping::from_json(
        r#"{
            "object_type": "sentence_record",
            "plane_id": {"dbid_l": "doc", "dbid_s": "p0"},
            "entries": [{"field": "body", "column": "content"}]
        }"#,
        &schema,
        &plane,
    )
    .unwrap();

    let context =
        ContextCell::for_field(document.clone(), 1, &plane, &mapping, "body").unwrap();
    assert_eq!(context.col, 0);

    let ledger = SqliteLedgerRepository::try_new(&conn).unwrap();
    let content = SqliteContentRepository::new(&conn);
    let relations = SqliteRelationRepository::try_new(&conn).unwrap();
    let evaluator = Evaluator::new(&ledger, &content, &relations, NormalizationPolicy::default());
    assert_eq!(
        evaluator.evaluate("A1", &context).unwrap(),
        Value::Text("Alpha one".to_string())
    );

    let err =
        ContextCell::for_field(document, 1, &plane, &mapping, "missing").unwrap_err();
    assert!(matches!(err, dimdir_core::PlaneError::UnknownField(_)));
}

#[test]
fn occurrence_level_edges_are_visible_from_their_cell_only() {
    let conn = open_db_in_memory().unwrap();
    let document = ingest_fixture(&conn);

    let ledger = SqliteLedgerRepository::try_new(&conn).unwrap();
    let content = SqliteContentRepository::new(&conn);
    let relations = SqliteRelationRepository::try_new(&conn).unwrap();

    let here = NodeRef::Occurrence(dimdir_core::Address::new(document.clone(), 1));
    relations
        .add_relation(&here, &identify("Gamma three"), "cites", Metadata::new())
        .unwrap();

    let evaluator = Evaluator::new(&ledger, &content, &relations, NormalizationPolicy::default());
    let context = ContextCell::new(document, 0, 1);

    let value = evaluator.evaluate("rel(A2, 'cites')", &context).unwrap();
    assert_eq!(value, Value::List(vec![Value::Text("Gamma three".to_string())]));

    // The target content sees the edge from its side as well.
    let value = evaluator.evaluate("rel(A3, 'cites')", &context).unwrap();
    assert_eq!(value, Value::List(vec![Value::Text("Beta two".to_string())]));

    // An uninvolved cell sees nothing.
    let value = evaluator.evaluate("rel(A1, 'cites')", &context).unwrap();
    assert_eq!(value, Value::List(vec![]));
}
