use super::*;
use crate::enums::MethodNamespace;
use crate::error::RecastError;
use crate::record::ModelRecords;
use crate::schema::{MemorySchemaSource, SchemaSource};
use crate::types::{CastBehavior, CastType, TypeDescriptor};
use recast_commons::config::RecastConfig;
use recast_commons::errors::{CastError, DeclarationError, ResolutionError};
use recast_commons::models::{AttributeName, Column, ColumnType, TableName, Value};
use recast_commons::serialization::Codec;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn attr(name: &str) -> AttributeName {
    AttributeName::new(name)
}

fn create_test_source() -> Arc<MemorySchemaSource> {
    let source = MemorySchemaSource::new();
    source.set_table(
        "topics",
        vec![
            Column::new("id", ColumnType::Integer, false, None),
            Column::simple("title", ColumnType::Text),
            Column::simple("content", ColumnType::Text),
            Column::simple("group", ColumnType::Text),
            Column::simple("status", ColumnType::Integer),
        ],
    );
    source.set_table(
        "overloaded_types",
        vec![
            Column::simple("overloaded_float", ColumnType::Float),
            Column::simple("overloaded_string_with_limit", ColumnType::Text),
            Column::new(
                "string_with_default",
                ColumnType::Text,
                true,
                Some(Value::Text("the original default".to_string())),
            ),
        ],
    );
    Arc::new(source)
}

fn create_test_registry() -> (AttributeRegistry, Arc<MemorySchemaSource>) {
    let source = create_test_source();
    (AttributeRegistry::new(source.clone()), source)
}

/// Schema source wrapper counting lookups, for caching and contention tests.
struct CountingSource {
    inner: Arc<MemorySchemaSource>,
    calls: AtomicU64,
    delay: Duration,
}

impl CountingSource {
    fn new(inner: Arc<MemorySchemaSource>, delay: Duration) -> Self {
        Self {
            inner,
            calls: AtomicU64::new(0),
            delay,
        }
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SchemaSource for CountingSource {
    fn columns_for(&self, table: &TableName) -> Result<Vec<Column>, ResolutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.inner.columns_for(table)
    }
}

// ===== Resolution basics =====

#[test]
fn test_undeclared_columns_pass_through() {
    let (registry, _) = create_test_registry();
    let topic = registry.define_model("Topic", "topics").unwrap();

    let schema = topic.resolved_schema().unwrap();
    assert_eq!(schema.len(), 5);
    assert_eq!(schema.type_of(&attr("title")).base_type(), ColumnType::Text);
    assert_eq!(schema.type_of(&attr("id")).base_type(), ColumnType::Integer);
}

#[test]
fn test_declared_attribute_overrides_column_type() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("OverloadedType", "overloaded_types").unwrap();
    model.attribute("overloaded_float", "integer").unwrap();

    let descriptor = model.type_for_attribute("overloaded_float").unwrap();
    assert_eq!(descriptor.base_type(), ColumnType::Integer);
}

#[test]
fn test_virtual_attribute_gets_declared_type() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("OverloadedType", "overloaded_types").unwrap();
    model.attribute("non_existent_decimal", "decimal").unwrap();

    let schema = model.resolved_schema().unwrap();
    assert!(schema.contains(&attr("non_existent_decimal")));
    assert_eq!(
        schema.type_of(&attr("non_existent_decimal")).base_type(),
        ColumnType::Decimal
    );
}

#[test]
fn test_column_default_flows_into_descriptor() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("OverloadedType", "overloaded_types").unwrap();

    let descriptor = model.type_for_attribute("string_with_default").unwrap();
    assert_eq!(
        descriptor.default_value(),
        Some(&Value::Text("the original default".to_string()))
    );
}

#[test]
fn test_declared_default_overrides_column_default() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("OverloadedType", "overloaded_types").unwrap();
    model
        .attribute_with_default("string_with_default", Some("string"), "the overloaded default")
        .unwrap();

    let descriptor = model.type_for_attribute("string_with_default").unwrap();
    assert_eq!(
        descriptor.default_value(),
        Some(&Value::Text("the overloaded default".to_string()))
    );
}

#[test]
fn test_default_is_cast_on_read() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("OverloadedType", "overloaded_types").unwrap();
    model
        .attribute_with_default("overloaded_float", Some("float"), "123")
        .unwrap();

    let record = model.new_record().unwrap();
    assert_eq!(record.get("overloaded_float").unwrap(), Value::Float(123.0));
}

#[test]
fn test_resolution_is_idempotent() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    model.serialize_json("content").unwrap();
    model
        .enum_attribute("status", vec![("draft", 0), ("published", 1)])
        .declare()
        .unwrap();

    let first = model.resolved_schema().unwrap();
    model.reload_schema();
    let second = model.resolved_schema().unwrap();

    assert_eq!(first.len(), second.len());
    for (name, descriptor) in first.iter() {
        assert_eq!(descriptor, &second.type_of(name), "descriptor for `{name}` drifted");
    }
}

#[test]
fn test_cached_schema_is_reused() {
    let source = create_test_source();
    let counting = Arc::new(CountingSource::new(source, Duration::ZERO));
    let registry = AttributeRegistry::new(counting.clone());
    let model = registry.define_model("Topic", "topics").unwrap();

    let first = model.resolved_schema().unwrap();
    let second = model.resolved_schema().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(counting.calls(), 1);
}

#[test]
fn test_resolution_failure_is_retryable() {
    let source = Arc::new(MemorySchemaSource::new());
    let registry = AttributeRegistry::new(source.clone());
    let model = registry.define_model("Topic", "topics").unwrap();

    let err = model.resolved_schema().unwrap_err();
    assert!(matches!(
        err,
        RecastError::Resolution(ResolutionError::TableNotFound { .. })
    ));

    source.set_table("topics", vec![Column::simple("title", ColumnType::Text)]);
    assert!(model.resolved_schema().is_ok());
}

#[test]
fn test_reload_schema_picks_up_new_columns() {
    let source = Arc::new(MemorySchemaSource::new());
    source.set_table("topics", vec![Column::simple("title", ColumnType::Text)]);
    let registry = AttributeRegistry::new(source.clone());
    let model = registry.define_model("Topic", "topics").unwrap();

    assert_eq!(model.resolved_schema().unwrap().len(), 1);

    source.set_table(
        "topics",
        vec![
            Column::simple("title", ColumnType::Text),
            Column::simple("group", ColumnType::Text),
        ],
    );
    // Still cached until an explicit reload.
    assert_eq!(model.resolved_schema().unwrap().len(), 1);
    model.reload_schema();
    assert_eq!(model.resolved_schema().unwrap().len(), 2);
}

// ===== Inheritance =====

#[test]
fn test_subclass_inherits_resolved_types() {
    let (registry, _) = create_test_registry();
    let parent = registry.define_model("OverloadedType", "overloaded_types").unwrap();
    parent.attribute("overloaded_float", "integer").unwrap();
    let child = registry.define_subclass("ChildOfOverloadedType", &parent).unwrap();

    assert_eq!(
        parent.type_for_attribute("overloaded_float").unwrap(),
        child.type_for_attribute("overloaded_float").unwrap()
    );
}

#[test]
fn test_subclass_default_only_keeps_parent_type() {
    let (registry, _) = create_test_registry();
    let parent = registry.define_model("OverloadedType", "overloaded_types").unwrap();
    parent.attribute("overloaded_float", "integer").unwrap();

    let child = registry.define_subclass("Child", &parent).unwrap();
    child.attribute_default("overloaded_float", "123").unwrap();

    let parent_type = parent.type_for_attribute("overloaded_float").unwrap();
    let child_type = child.type_for_attribute("overloaded_float").unwrap();
    assert_eq!(parent_type.base_type(), child_type.base_type());
    assert_eq!(parent_type.cast_type(), child_type.cast_type());

    let record = child.new_record().unwrap();
    assert_eq!(record.get("overloaded_float").unwrap(), Value::Integer(123));
}

#[test]
fn test_subclass_default_only_keeps_parent_type_for_virtual_attribute() {
    let (registry, _) = create_test_registry();
    let parent = registry.define_model("OverloadedType", "overloaded_types").unwrap();
    parent.attribute("non_existent_decimal", "decimal").unwrap();

    let child = registry.define_subclass("Child", &parent).unwrap();
    child.attribute_default("non_existent_decimal", "123").unwrap();

    assert_eq!(
        parent
            .type_for_attribute("non_existent_decimal")
            .unwrap()
            .cast_type(),
        child
            .type_for_attribute("non_existent_decimal")
            .unwrap()
            .cast_type()
    );
    let record = child.new_record().unwrap();
    assert_eq!(record.get("non_existent_decimal").unwrap(), Value::Float(123.0));
}

#[test]
fn test_grandchild_redeclaration_replaces_chain() {
    let (registry, _) = create_test_registry();
    let parent = registry.define_model("OverloadedType", "overloaded_types").unwrap();
    parent.attribute("overloaded_float", "integer").unwrap();
    let child = registry.define_subclass("Child", &parent).unwrap();
    let grandchild = registry.define_subclass("Grandchild", &child).unwrap();
    grandchild.attribute("overloaded_float", "float").unwrap();

    assert_eq!(
        parent.type_for_attribute("overloaded_float").unwrap().base_type(),
        ColumnType::Integer
    );
    assert_eq!(
        grandchild
            .type_for_attribute("overloaded_float")
            .unwrap()
            .base_type(),
        ColumnType::Float
    );
}

#[test]
fn test_redeclaration_invalidates_only_that_model() {
    let (registry, _) = create_test_registry();
    let parent = registry.define_model("Topic", "topics").unwrap();
    let child = registry.define_subclass("ImportantTopic", &parent).unwrap();

    let parent_before = parent.resolved_schema().unwrap();
    let child_before = child.resolved_schema().unwrap();

    parent.attribute("title", "integer").unwrap();

    // Parent rebuilt, child cache untouched.
    let parent_after = parent.resolved_schema().unwrap();
    assert!(!Arc::ptr_eq(&parent_before, &parent_after));
    assert!(Arc::ptr_eq(&child_before, &child.resolved_schema().unwrap()));

    // After its own reload the child sees the updated parent chain.
    child.reload_schema();
    assert_eq!(
        child.type_for_attribute("title").unwrap().base_type(),
        ColumnType::Integer
    );
}

#[test]
fn test_duplicate_model_definition_rejected() {
    let (registry, _) = create_test_registry();
    registry.define_model("Topic", "topics").unwrap();
    let err = registry.define_model("Topic", "topics").unwrap_err();
    assert!(matches!(err, DeclarationError::ModelAlreadyDefined { .. }));
}

// ===== Serialization =====

#[test]
fn test_serialized_attribute_decodes_stored_json() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    model.serialize_json("group").unwrap();

    let mut row = BTreeMap::new();
    row.insert(attr("group"), Value::Text("1".to_string()));
    let record = model.instantiate(row).unwrap();
    assert_eq!(record.get("group").unwrap(), Value::Integer(1));
}

#[test]
fn test_serialize_twice_replaces_codec() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    model.serialize_json("content").unwrap();
    model.serialize_json("content").unwrap();

    let descriptor = model.type_for_attribute("content").unwrap();
    match descriptor.cast_type() {
        CastType::Serialized { subtype, .. } => {
            assert!(
                matches!(**subtype, CastType::Base(ColumnType::Text)),
                "codec stacked instead of replaced: {subtype:?}"
            );
        }
        other => panic!("expected serialized type, got {other:?}"),
    }
}

#[test]
fn test_serialize_binary_column_fails_at_declaration() {
    let source = Arc::new(MemorySchemaSource::new());
    source.set_table("blobs", vec![Column::simple("payload", ColumnType::Binary)]);
    let registry = AttributeRegistry::new(source);
    let model = registry.define_model("Blob", "blobs").unwrap();

    let err = model.serialize_json("payload").unwrap_err();
    match err {
        RecastError::Declaration(DeclarationError::ColumnNotSerializable { attribute, base }) => {
            assert_eq!(attribute, "payload");
            assert_eq!(base, "BINARY");
        }
        other => panic!("expected declaration error, got {other}"),
    }
}

#[test]
fn test_serialize_unknown_base_fails_at_resolution() {
    let source = Arc::new(MemorySchemaSource::new());
    source.set_table("blobs", vec![Column::simple("payload", ColumnType::Binary)]);
    let registry = AttributeRegistry::new(source);
    let model = registry.define_model("Blob", "blobs").unwrap();

    // A decorator hides the base type from the declaration-time check, so
    // the incompatibility surfaces when the producer runs.
    model.attribute_decorated("payload", Ok).unwrap();
    model.serialize_json("payload").unwrap();

    let err = model.resolved_schema().unwrap_err();
    assert!(matches!(
        err,
        RecastError::Declaration(DeclarationError::ColumnNotSerializable { .. })
    ));
}

#[test]
fn test_mutation_detection_does_not_double_serialize() {
    // A custom base type and a codec that each append a marker, so any
    // double application is visible in the round-tripped value.
    struct SuffixType;
    impl CastBehavior for SuffixType {
        fn name(&self) -> &str {
            "suffix"
        }
        fn cast(&self, value: &Value) -> Result<Value, CastError> {
            match value {
                Value::Text(s) => Ok(Value::Text(
                    s.strip_suffix(" serialized").unwrap_or(s).to_string(),
                )),
                other => Ok(other.clone()),
            }
        }
        fn serialize(&self, value: &Value) -> Result<Value, CastError> {
            match value {
                Value::Text(s) => Ok(Value::Text(format!("{s} serialized"))),
                other => Ok(other.clone()),
            }
        }
    }

    struct SuffixCodec;
    impl Codec for SuffixCodec {
        fn name(&self) -> &str {
            "suffix-codec"
        }
        fn dump(&self, value: &Value) -> Result<Value, CastError> {
            match value {
                Value::Text(s) => Ok(Value::Text(format!("{s} encoded"))),
                other => Ok(other.clone()),
            }
        }
        fn load(&self, stored: &Value) -> Result<Value, CastError> {
            match stored {
                Value::Text(s) => Ok(Value::Text(
                    s.strip_suffix(" encoded").unwrap_or(s).to_string(),
                )),
                other => Ok(other.clone()),
            }
        }
    }

    let (registry, _) = create_test_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    model
        .attribute_descriptor("title", TypeDescriptor::custom(Arc::new(SuffixType)))
        .unwrap();
    model
        .serialize_with("title", Arc::new(SuffixCodec), AttributeDefault::NotProvided)
        .unwrap();

    let mut record = model.new_record().unwrap();
    record.set("title", "bar");
    record.changes_applied().unwrap();

    assert_eq!(record.get("title").unwrap(), Value::Text("bar".to_string()));
    assert!(!record.changed().unwrap(), "round trip flagged as changed");

    // The stored image carries exactly one application of each layer.
    let row = record.to_row().unwrap();
    assert_eq!(
        row.get(&attr("title")).unwrap(),
        &Value::Text("bar encoded serialized".to_string())
    );
}

// ===== Custom types =====

#[test]
fn test_registered_type_resolves_through_lookup() {
    let (registry, _) = create_test_registry();
    registry.register_type("shouty", |base| {
        struct Shouty(ColumnType);
        impl CastBehavior for Shouty {
            fn name(&self) -> &str {
                "shouty"
            }
            fn base_type(&self) -> ColumnType {
                self.0
            }
            fn cast(&self, value: &Value) -> Result<Value, CastError> {
                match value {
                    Value::Text(s) => Ok(Value::Text(s.to_uppercase())),
                    other => Ok(other.clone()),
                }
            }
            fn serialize(&self, value: &Value) -> Result<Value, CastError> {
                Ok(value.clone())
            }
        }
        TypeDescriptor::custom(Arc::new(Shouty(base)))
    });

    let model = registry.define_model("Topic", "topics").unwrap();
    model.attribute("title", "shouty").unwrap();

    let mut row = BTreeMap::new();
    row.insert(attr("title"), Value::Text("quiet".to_string()));
    let record = model.instantiate(row).unwrap();
    assert_eq!(record.get("title").unwrap(), Value::Text("QUIET".to_string()));
}

#[test]
fn test_unknown_type_name_fails_resolution() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    // Symbolic lookup runs at resolution so a custom type may be registered
    // after the declaration that names it.
    model.attribute("title", "mystery").unwrap();
    let err = model.resolved_schema().unwrap_err();
    assert!(matches!(
        err,
        RecastError::Declaration(DeclarationError::UnknownType { .. })
    ));
}

// ===== Concurrency =====

#[test]
fn test_concurrent_first_resolution_is_single_flight() {
    let source = create_test_source();
    let counting = Arc::new(CountingSource::new(source, Duration::from_millis(25)));
    let registry = AttributeRegistry::new(counting.clone());
    let model = registry.define_model("Topic", "topics").unwrap();
    model.serialize_json("group").unwrap();
    // `serialize` consults the schema at declaration time; only the
    // resolution traffic below is under test.
    let calls_before_resolution = counting.calls();

    let thread_count = 8;
    let barrier = Arc::new(Barrier::new(thread_count));
    let mut handles = Vec::new();
    for _ in 0..thread_count {
        let model = Arc::clone(&model);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            model.resolved_schema().unwrap()
        }));
    }

    let schemas: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Every thread observed the same fully-installed schema.
    for schema in &schemas {
        assert!(Arc::ptr_eq(schema, &schemas[0]));
        assert!(schema.contains(&attr("group")));
        assert!(matches!(
            schema.type_of(&attr("group")).cast_type(),
            CastType::Serialized { .. }
        ));
    }
    // And the schema source was consulted once, not once per thread.
    assert_eq!(counting.calls() - calls_before_resolution, 1);
}

#[test]
fn test_concurrent_readers_decode_consistently() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    model.serialize_json("group").unwrap();

    let thread_count = 4;
    let barrier = Arc::new(Barrier::new(thread_count));
    let mut handles = Vec::new();
    for _ in 0..thread_count {
        let model = Arc::clone(&model);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            let mut row = BTreeMap::new();
            row.insert(AttributeName::new("group"), Value::Text("1".to_string()));
            let record = model.instantiate(row).unwrap();
            record.get("group").unwrap()
        }));
    }

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Value::Integer(1));
    }
}

// ===== Enums =====

fn create_status_model(registry: &AttributeRegistry) -> Arc<Model> {
    let model = registry.define_model("Topic", "topics").unwrap();
    model
        .enum_attribute("status", vec![("draft", 0), ("published", 1)])
        .declare()
        .unwrap();
    model
}

fn record_with_status(model: &Arc<Model>, stored: i64) -> crate::record::Record {
    let mut row = BTreeMap::new();
    row.insert(attr("status"), Value::Integer(stored));
    model.instantiate(row).unwrap()
}

#[test]
fn test_enum_cast_and_predicates() {
    let (registry, _) = create_test_registry();
    let model = create_status_model(&registry);

    let record = record_with_status(&model, 0);
    assert_eq!(record.get("status").unwrap(), Value::Text("draft".to_string()));
    assert!(record.predicate("draft").unwrap());
    assert!(!record.predicate("published").unwrap());
}

#[test]
fn test_enum_scopes_filter_by_stored_value() {
    let (registry, _) = create_test_registry();
    let model = create_status_model(&registry);

    let draft = record_with_status(&model, 0);
    let published = record_with_status(&model, 1);

    let scope = model.scope("draft").unwrap();
    assert_eq!(scope.stored_value(), &Value::Integer(0));
    assert!(scope.matches(&draft).unwrap());
    assert!(!scope.matches(&published).unwrap());

    let negative = model.scope("not_draft").unwrap();
    assert!(negative.negated());
    assert!(!negative.matches(&draft).unwrap());
    assert!(negative.matches(&published).unwrap());
}

#[test]
fn test_enum_rejects_out_of_domain_stored_value() {
    let (registry, _) = create_test_registry();
    let model = create_status_model(&registry);

    let record = record_with_status(&model, 9);
    let err = record.get("status").unwrap_err();
    match err {
        RecastError::Cast(CastError::UnknownEnumValue { attribute, value }) => {
            assert_eq!(attribute, "status");
            assert_eq!(value, "9");
        }
        other => panic!("expected enum cast error, got {other}"),
    }

    // Absent is not an error, and predicates treat it as no match.
    let empty = model.instantiate(BTreeMap::new()).unwrap();
    assert_eq!(empty.get("status").unwrap(), Value::Null);
    assert!(!empty.predicate("draft").unwrap());
}

#[test]
fn test_enum_writes_serialize_to_stored_values() {
    let (registry, _) = create_test_registry();
    let model = create_status_model(&registry);

    let mut record = model.new_record().unwrap();
    record.set("status", "published");
    record.changes_applied().unwrap();

    let row = record.to_row().unwrap();
    assert_eq!(row.get(&attr("status")).unwrap(), &Value::Integer(1));

    let mut record = model.new_record().unwrap();
    record.set("status", "nonsense");
    assert!(record.get("status").is_err());
}

#[test]
fn test_enum_label_set_accessor() {
    let (registry, _) = create_test_registry();
    let model = create_status_model(&registry);

    let labels = model.labels("statuses").unwrap();
    assert_eq!(labels.labels().collect::<Vec<_>>(), vec!["draft", "published"]);
    assert_eq!(labels.value_for("draft"), Some(&Value::Integer(0)));
}

#[test]
fn test_enum_default_label() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    model
        .enum_attribute("status", vec![("draft", 0), ("published", 1)])
        .default("draft")
        .declare()
        .unwrap();

    let record = model.new_record().unwrap();
    assert_eq!(record.get("status").unwrap(), Value::Text("draft".to_string()));
    assert!(record.predicate("draft").unwrap());
}

#[test]
fn test_enum_prefix_and_suffix() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    model
        .enum_attribute("status", vec![("draft", 0), ("published", 1)])
        .prefix()
        .declare()
        .unwrap();

    let record = record_with_status(&model, 0);
    assert!(record.predicate("status_draft").unwrap());
    assert!(model.scope("status_published").is_ok());

    let other = registry.define_model("Comment", "topics").unwrap();
    other
        .enum_attribute("state", vec![("visible", 0)])
        .suffix_with("flag")
        .declare()
        .unwrap();
    assert!(other.find_method(MethodNamespace::Instance, "visible_flag").is_some());
}

#[test]
fn test_enum_without_scopes() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    model
        .enum_attribute("status", vec![("draft", 0)])
        .without_scopes()
        .declare()
        .unwrap();

    assert!(matches!(
        model.scope("draft"),
        Err(RecastError::UnknownMethod { .. })
    ));
    assert!(matches!(
        model.scope("not_draft"),
        Err(RecastError::UnknownMethod { .. })
    ));
    // Predicates are still generated.
    let record = record_with_status(&model, 0);
    assert!(record.predicate("draft").unwrap());
}

#[test]
fn test_enum_alias_for_unsafe_label() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    model
        .enum_attribute("status", vec![("in progress", 0), ("done", 1)])
        .declare()
        .unwrap();

    let record = record_with_status(&model, 0);
    // Both the raw label method and the sanitized alias resolve.
    assert!(record.predicate("in progress").unwrap());
    assert!(record.predicate("in_progress").unwrap());
}

#[test]
fn test_enum_alias_skipped_when_it_collides_with_generated_name() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    // "in progress" sanitizes to "in_progress", which is already taken by a
    // real label; the alias is skipped, both labels keep their own methods.
    model
        .enum_attribute("status", vec![("in_progress", 0), ("in progress", 1)])
        .declare()
        .unwrap();

    let record = record_with_status(&model, 0);
    assert!(record.predicate("in_progress").unwrap());
    let record = record_with_status(&model, 1);
    assert!(record.predicate("in progress").unwrap());
    assert!(!record.predicate("in_progress").unwrap());
}

#[test]
fn test_enum_label_collision_installs_nothing() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    model
        .enum_attribute("status", vec![("draft", 0), ("published", 1)])
        .declare()
        .unwrap();

    // The prefix-less predicate for label "status" collides with the
    // existing attribute reader.
    let err = model
        .enum_attribute("kind", vec![("status", 0)])
        .declare()
        .unwrap_err();
    assert!(matches!(
        err,
        RecastError::Declaration(DeclarationError::MethodConflict { .. })
    ));

    // Nothing was installed for the failed declaration.
    assert!(model.enum_mapping(&attr("kind")).is_none());
    assert!(model.pending_entry(&attr("kind")).is_none());
    assert!(model.find_method(MethodNamespace::ClassLevel, "kinds").is_none());
}

#[test]
fn test_enum_duplicate_labels_rejected() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    let err = model
        .enum_attribute("status", vec![("draft", 0), ("draft", 1)])
        .declare()
        .unwrap_err();
    assert!(matches!(
        err,
        RecastError::Declaration(DeclarationError::DuplicateEnumLabel { .. })
    ));
}

#[test]
fn test_enum_redeclaration_replaces_mapping() {
    let (registry, _) = create_test_registry();
    let model = create_status_model(&registry);
    model
        .enum_attribute("status", vec![("draft", 0), ("published", 1), ("archived", 2)])
        .declare()
        .unwrap();

    let record = record_with_status(&model, 2);
    assert_eq!(record.get("status").unwrap(), Value::Text("archived".to_string()));
    assert_eq!(model.labels("statuses").unwrap().len(), 3);
}

#[test]
fn test_enum_over_serialized_attribute() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    model.serialize_json("group").unwrap();
    model
        .enum_attribute("group", vec![("alpha", 0), ("beta", 1)])
        .declare()
        .unwrap();

    let descriptor = model.type_for_attribute("group").unwrap();
    match descriptor.cast_type() {
        CastType::Enum { subtype, .. } => {
            assert!(matches!(**subtype, CastType::Serialized { .. }));
        }
        other => panic!("expected enum over serialized, got {other:?}"),
    }

    // Stored form is JSON text of the underlying value.
    let mut row = BTreeMap::new();
    row.insert(attr("group"), Value::Text("1".to_string()));
    let record = model.instantiate(row).unwrap();
    assert_eq!(record.get("group").unwrap(), Value::Text("beta".to_string()));

    let mut record = model.new_record().unwrap();
    record.set("group", "alpha");
    record.changes_applied().unwrap();
    assert_eq!(
        record.to_row().unwrap().get(&attr("group")).unwrap(),
        &Value::Text("0".to_string())
    );
}

#[test]
fn test_subclass_sees_parent_enum_methods() {
    let (registry, _) = create_test_registry();
    let parent = create_status_model(&registry);
    let child = registry.define_subclass("ImportantTopic", &parent).unwrap();

    let record = record_with_status(&child, 1);
    assert!(record.predicate("published").unwrap());
    assert!(child.scope("draft").is_ok());
    assert_eq!(child.labels("statuses").unwrap().len(), 2);
}

// ===== Encryption =====

fn create_encrypted_registry() -> (AttributeRegistry, Arc<MemorySchemaSource>) {
    let source = create_test_source();
    let config = RecastConfig::with_encryption_keys(
        "primary-key-material",
        "deterministic-key-material",
        "derivation-salt",
    );
    (AttributeRegistry::with_config(source.clone(), config), source)
}

#[test]
fn test_encrypted_attribute_round_trip() {
    let (registry, _) = create_encrypted_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    model.encrypts("title").unwrap();

    let mut record = model.new_record().unwrap();
    record.set("title", "classified");
    record.changes_applied().unwrap();

    assert_eq!(record.get("title").unwrap(), Value::Text("classified".to_string()));

    let row = record.to_row().unwrap();
    match row.get(&attr("title")).unwrap() {
        Value::Text(stored) => assert!(!stored.contains("classified")),
        other => panic!("expected armored text, got {other:?}"),
    }
}

#[test]
fn test_encrypted_attribute_corruption_is_a_cast_error() {
    let (registry, _) = create_encrypted_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    model.encrypts("title").unwrap();

    let mut row = BTreeMap::new();
    row.insert(attr("title"), Value::Text("not-a-ciphertext".to_string()));
    let record = model.instantiate(row).unwrap();
    assert!(matches!(
        record.get("title").unwrap_err(),
        RecastError::Cast(CastError::MalformedPayload { .. })
    ));
}

#[test]
fn test_encrypted_attributes_join_filter_parameters() {
    let (registry, _) = create_encrypted_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    model.encrypts("title").unwrap();

    assert_eq!(registry.filter_parameters(), vec!["title".to_string()]);

    let mut record = model.new_record().unwrap();
    record.set("title", "classified");
    let rendered = format!("{record:?}");
    assert!(rendered.contains("[FILTERED]"));
    assert!(!rendered.contains("classified"));
}

#[test]
fn test_deterministic_encryption_supports_equality() {
    let (registry, _) = create_encrypted_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    model.encrypts_deterministic("title").unwrap();

    let mut a = model.new_record().unwrap();
    a.set("title", "same");
    a.changes_applied().unwrap();
    let mut b = model.new_record().unwrap();
    b.set("title", "same");
    b.changes_applied().unwrap();

    assert_eq!(
        a.to_row().unwrap().get(&attr("title")),
        b.to_row().unwrap().get(&attr("title"))
    );
}

#[test]
fn test_encrypts_without_keys_is_a_declaration_error() {
    let (registry, _) = create_test_registry();
    let model = registry.define_model("Topic", "topics").unwrap();
    let err = model.encrypts("title").unwrap_err();
    assert!(matches!(
        err,
        RecastError::Declaration(DeclarationError::MissingEncryptionKey)
    ));
}
