//! Issue lifecycle integration tests
//!
//! Creates, lists, edits and removes issues through the engine, checking
//! hooks, named filter strategies and store state along the way.

use relata::engine::{Engine, EngineConfig, FieldData, Filters, QueryOptions, ToOneValue};
use relata::foundation::{Context, ErrorKind, Value};
use relata::storage::{MemoryStore, Persistence};

use crate::tracker::{ids, issue, labels, tracker};

fn filters(pairs: &[(&str, &[Value])]) -> Filters {
    pairs
        .iter()
        .map(|(name, values)| ((*name).to_string(), values.to_vec()))
        .collect()
}

fn listed(engine: &Engine<MemoryStore>, raw: &Filters, sort: &str) -> Vec<i64> {
    let verified = engine.verify_filters("issues", raw, &Context::none()).unwrap();
    let options = QueryOptions::default().with_sort(sort);
    ids(&engine.find("issues", &verified, &options).unwrap())
}

// =============================================================================
// Creation
// =============================================================================

#[test]
fn issue_created_with_links_in_one_change() {
    let (mut engine, journal) = tracker(EngineConfig::default());
    let mut created = engine.new_resource("issues", Context::none()).unwrap();
    let writes = engine.store().writes();

    let data = FieldData::new()
        .with_attribute("title", "Leaky pool")
        .with_attribute("priority", 5)
        .with_to_one("project", ToOneValue::Key(Value::from("core")))
        .with_to_one("assignee", ToOneValue::Key(Value::from("2")))
        .with_to_many("labels", [1]);
    engine.replace_fields(&mut created, data).unwrap();

    assert_eq!(engine.store().writes(), writes + 1);
    assert_eq!(created.id(), &Value::Int(4));
    assert_eq!(created.attribute("state").unwrap(), &Value::from("open"));
    assert_eq!(created.to_one_key("project").unwrap(), &Value::from("core"));
    assert_eq!(created.to_one_key("assignee").unwrap(), &Value::Int(2));
    assert_eq!(labels(&engine, 4), vec![1]);
    assert_eq!(
        *journal.lock().unwrap(),
        ["before create", "before replace_fields", "after replace_fields", "after create"]
    );

    assert_eq!(listed(&engine, &Filters::new(), ""), vec![4, 1, 3]);
}

// =============================================================================
// Listing
// =============================================================================

#[test]
fn named_strategies_verify_and_apply() {
    let (engine, _) = tracker(EngineConfig::default());

    assert_eq!(listed(&engine, &filters(&[("state", &[Value::from("CLOSED")])]), ""), vec![2]);
    assert_eq!(listed(&engine, &filters(&[("search", &[Value::from("sort")])]), ""), vec![3]);
    assert!(listed(&engine, &filters(&[("search", &[Value::from("typo")])]), "").is_empty());

    let both = [Value::from("Open,Closed")];
    assert_eq!(
        listed(&engine, &filters(&[("state", &both), ("project", &[Value::from("relata")])]), ""),
        vec![1, 2]
    );
    assert_eq!(
        listed(&engine, &filters(&[("state", &both), ("labels", &[Value::Int(2)])]), ""),
        vec![2]
    );
}

#[test]
fn counts_respect_defaults_and_relationships() {
    let (engine, _) = tracker(EngineConfig::default());
    let verified = engine
        .verify_filters("issues", &filters(&[("assignee", &[Value::Int(2)])]), &Context::none())
        .unwrap();
    assert_eq!(engine.count("issues", &verified, &QueryOptions::default()).unwrap(), 0);

    let verified = engine
        .verify_filters("issues", &filters(&[("assignee", &[Value::Int(1)])]), &Context::none())
        .unwrap();
    assert_eq!(engine.count("issues", &verified, &QueryOptions::default()).unwrap(), 1);
}

#[test]
fn path_sorts_cross_string_keyed_joins() {
    let (engine, _) = tracker(EngineConfig::default());
    let every_state = filters(&[("state", &[Value::from("open,closed")])]);
    assert_eq!(listed(&engine, &every_state, "project.name,id"), vec![3, 1, 2]);
    assert_eq!(listed(&engine, &every_state, "-assignee.name"), vec![2, 1, 3]);
}

// =============================================================================
// Editing and Removal
// =============================================================================

#[test]
fn closing_an_issue_hides_it_from_the_default_listing() {
    let (mut engine, journal) = tracker(EngineConfig::default());
    let mut crash = issue(&engine, 1);

    let err = engine
        .replace_fields(&mut crash, FieldData::new().with_attribute("state", "Closed"))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidFieldValue { ref field, .. } if field == "state"));
    assert!(!crash.is_changing());

    journal.lock().unwrap().clear();
    engine
        .replace_fields(&mut crash, FieldData::new().with_attribute("state", "closed"))
        .unwrap();
    assert_eq!(
        *journal.lock().unwrap(),
        ["before update", "before replace_fields", "after replace_fields", "after update"]
    );
    assert_eq!(listed(&engine, &Filters::new(), ""), vec![3]);
}

#[test]
fn removing_an_issue_unlinks_its_labels() {
    let (mut engine, _) = tracker(EngineConfig::default());
    let mut typo = issue(&engine, 2);
    engine.remove(&mut typo).unwrap();

    let docs = engine
        .find_by_key("labels", &Value::Int(2), &Context::none())
        .unwrap();
    let related = engine
        .find_related(&docs, "issues", &Filters::new(), &QueryOptions::default())
        .unwrap();
    assert!(related.is_empty());
    assert!(engine.store().find("Issue", &Value::Int(2)).unwrap().is_none());

    let noor = engine.find_by_key("users", &Value::Int(2), &Context::none()).unwrap();
    assert!(engine.store().association_keys(noor.row(), "issues").unwrap().is_empty());
}
