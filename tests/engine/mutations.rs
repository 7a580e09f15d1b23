//! Integration tests for the mutation state machine
//!
//! Every public mutation wraps its body in the resource's hooks and writes
//! the row at most once, however many operations it composes.

use relata_engine::{EngineConfig, FieldData, Outcome, ToOneValue};
use relata_foundation::{Context, ErrorKind, Value};
use relata_schema::ChangeKind;

use crate::common::{self, Frozen};

// =============================================================================
// Composite Updates
// =============================================================================

#[test]
fn replace_fields_writes_once_under_one_outer_hook() {
    let (mut engine, counters) = common::engine(EngineConfig::default());
    let mut post = common::find(&engine, "posts", 1);
    let writes = engine.store().writes();

    let data = FieldData::new()
        .with_attribute("title", "Hello again")
        .with_to_one("author", ToOneValue::Key(Value::Int(2)))
        .with_to_many("tags", [2, 3]);
    let outcome = engine.replace_fields(&mut post, data).unwrap();

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(engine.store().writes(), writes + 1);
    assert_eq!(counters.get("posts", ChangeKind::Update), 1);
    assert_eq!(counters.get("posts", ChangeKind::ReplaceFields), 1);
    assert_eq!(counters.get("posts", ChangeKind::ReplaceToOneLink), 1);
    assert_eq!(counters.get("posts", ChangeKind::ReplaceToManyLinks), 1);
    assert_eq!(counters.get("posts", ChangeKind::Create), 0);

    assert_eq!(common::stored(&engine, "Post", 1, "title"), Value::from("Hello again"));
    assert_eq!(common::stored(&engine, "Post", 1, "author_id"), Value::Int(2));
    assert_eq!(common::members(&engine, &post, "tags"), vec![2, 3]);
    assert!(!post.save_needed());
    assert!(!post.is_changing());
}

#[test]
fn nested_public_operations_share_the_outer_save() {
    let (mut engine, counters) = common::engine(EngineConfig::default());
    let mut post = common::find(&engine, "posts", 2);
    let writes = engine.store().writes();

    engine
        .begin_change(&mut post, ChangeKind::ReplaceFields, |engine, post| {
            let linked = engine.replace_to_one_link(post, "author", Value::Int(1))?;
            let tagged = engine.create_to_many_links(post, "tags", vec![Value::Int(3)])?;
            assert!(post.is_changing());
            assert_eq!(engine.store().writes(), writes);
            Ok(linked.and(tagged))
        })
        .unwrap();

    assert_eq!(engine.store().writes(), writes + 1);
    assert_eq!(counters.get("posts", ChangeKind::Update), 1);
    assert_eq!(counters.get("posts", ChangeKind::CreateToManyLink), 1);
    assert_eq!(common::members(&engine, &post, "tags"), vec![1, 3]);
    assert_eq!(post.to_one_key("author").unwrap(), &Value::Int(1));
}

#[test]
fn body_without_changes_does_not_write() {
    let (mut engine, counters) = common::engine(EngineConfig::default());
    let mut post = common::find(&engine, "posts", 1);
    let writes = engine.store().writes();
    let outcome = engine.replace_fields(&mut post, FieldData::new()).unwrap();
    assert!(outcome.is_completed());
    assert_eq!(engine.store().writes(), writes);
    assert_eq!(counters.get("posts", ChangeKind::Update), 1);
}

// =============================================================================
// Creation
// =============================================================================

#[test]
fn new_resources_are_created_with_their_links() {
    let (mut engine, counters) = common::engine(EngineConfig::reflecting());
    let mut post = engine.new_resource("posts", Context::none()).unwrap();
    assert!(post.is_new());
    let writes = engine.store().writes();

    let data = FieldData::new()
        .with_attribute("title", "Fresh")
        .with_attribute("status", "draft")
        .with_to_one("author", ToOneValue::Key(Value::from("3")))
        .with_to_many("tags", [1]);
    engine.replace_fields(&mut post, data).unwrap();

    assert_eq!(post.id(), &Value::Int(5));
    assert_eq!(engine.store().writes(), writes + 1);
    assert_eq!(counters.get("posts", ChangeKind::Create), 1);
    assert_eq!(counters.get("posts", ChangeKind::Update), 0);
    assert_eq!(counters.get("tags", ChangeKind::CreateToManyLink), 0);
    assert_eq!(common::members(&engine, &post, "tags"), vec![1]);
    assert_eq!(common::stored(&engine, "Post", 5, "author_id"), Value::Int(3));
}

#[test]
fn save_resource_creates_once() {
    let (mut engine, counters) = common::engine(EngineConfig::default());
    let mut comment = engine.new_resource("comments", Context::none()).unwrap();
    engine
        .replace_fields(&mut comment, FieldData::new().with_attribute("body", "First!"))
        .unwrap();
    let id = comment.id().clone();
    assert!(!id.is_nil());

    engine.save_resource(&mut comment).unwrap();
    assert_eq!(comment.id(), &id);
    assert_eq!(counters.get("comments", ChangeKind::Create), 1);
    assert_eq!(counters.get("comments", ChangeKind::Update), 1);
}

#[test]
fn abstract_or_unknown_types_cannot_be_instantiated() {
    let (engine, _) = common::engine(EngineConfig::default());
    let err = engine.new_resource("widgets", Context::none()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownResource(_)));
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn validation_failure_leaves_the_store_untouched() {
    let (mut engine, _) = common::engine(EngineConfig::default());
    let mut post = engine.new_resource("posts", Context::none()).unwrap();
    let writes = engine.store().writes();

    let err = engine
        .replace_fields(&mut post, FieldData::new().with_attribute("body", "no title"))
        .unwrap_err();
    let ErrorKind::ValidationErrors(errors) = &err.kind else {
        panic!("expected validation errors, got {err:?}");
    };
    assert_eq!(errors.get("title"), Some(&["can't be blank".to_string()][..]));
    assert_eq!(engine.store().writes(), writes);
    assert!(!post.is_changing());
    assert!(post.is_new());

    engine
        .replace_fields(&mut post, FieldData::new().with_attribute("title", "Titled"))
        .unwrap();
    assert!(!post.is_new());
}

#[test]
fn failures_name_the_resource_and_operation() {
    let (mut engine, _) = common::engine(EngineConfig::default());
    let mut post = engine.new_resource("posts", Context::none()).unwrap();
    let err = engine.replace_fields(&mut post, FieldData::new()).unwrap_err();
    let context = err.context.expect("outermost change attaches context");
    assert_eq!(context.resource.as_deref(), Some("posts"));
    assert_eq!(context.stack, vec!["replace_fields".to_string()]);
}

#[test]
fn rejected_attribute_values_are_reported_by_attribute() {
    let (mut engine, _) = common::engine(EngineConfig::default());
    let mut post = common::find(&engine, "posts", 1);
    let writes = engine.store().writes();

    let err = engine
        .replace_fields(&mut post, FieldData::new().with_attribute("status", "archived"))
        .unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::InvalidFieldValue { ref field, ref value } if field == "status" && *value == Value::from("archived")
    ));

    let err = engine
        .replace_fields(&mut post, FieldData::new().with_attribute("colour", "red"))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownField { ref field, .. } if field == "colour"));
    assert_eq!(engine.store().writes(), writes);
}

#[test]
fn failing_before_hook_aborts_the_change() {
    let (mut engine, counters) = common::engine(EngineConfig::default());
    let mut post = engine
        .find_by_key("posts", &Value::Int(1), &Context::new(Frozen))
        .unwrap();
    let writes = engine.store().writes();

    let err = engine
        .replace_fields(&mut post, FieldData::new().with_attribute("title", "Thawed"))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ValidationErrors(ref e) if e.get("base").is_some()));
    assert_eq!(engine.store().writes(), writes);
    assert_eq!(counters.get("posts", ChangeKind::ReplaceFields), 0);
    assert_eq!(common::stored(&engine, "Post", 1, "title"), Value::from("Hello"));
    assert!(!post.is_changing());
}

#[test]
fn concurrent_edit_loses_with_save_failed() {
    let (mut engine, _) = common::engine(EngineConfig::default());
    let mut first = common::find(&engine, "posts", 1);
    let mut second = common::find(&engine, "posts", 1);

    engine
        .replace_fields(&mut first, FieldData::new().with_attribute("title", "First"))
        .unwrap();
    let err = engine
        .replace_fields(&mut second, FieldData::new().with_attribute("title", "Second"))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::SaveFailed));
    assert_eq!(common::stored(&engine, "Post", 1, "title"), Value::from("First"));
}

#[test]
fn deferred_writes_are_accepted() {
    let (mut engine, _) = common::engine(EngineConfig::default());
    engine.store_mut().set_deferred_writes(true);
    let mut post = common::find(&engine, "posts", 2);
    let outcome = engine
        .replace_fields(&mut post, FieldData::new().with_attribute("body", "later"))
        .unwrap();
    assert_eq!(outcome, Outcome::Accepted);
    assert!(!outcome.is_completed());
}

// =============================================================================
// Removal
// =============================================================================

#[test]
fn restricted_removal_is_locked() {
    let (mut engine, counters) = common::engine(EngineConfig::default());
    let mut grace = common::find(&engine, "people", 1);
    let err = engine.remove(&mut grace).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RecordLocked(ref m) if m.contains("posts")));
    assert_eq!(engine.store().len("Person"), 3);
    assert_eq!(counters.get("people", ChangeKind::Remove), 1);
}

#[test]
fn removal_detaches_dependents() {
    let (mut engine, _) = common::engine(EngineConfig::default());
    let mut post = common::find(&engine, "posts", 2);
    assert_eq!(engine.remove(&mut post).unwrap(), Outcome::Completed);

    let err = engine
        .find_by_key("posts", &Value::Int(2), &Context::none())
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RecordNotFound(Value::Int(2))));
    assert!(common::stored(&engine, "Comment", 3, "post_id").is_nil());
    let rust = common::find(&engine, "tags", 1);
    assert_eq!(common::members(&engine, &rust, "posts"), vec![1]);
}
