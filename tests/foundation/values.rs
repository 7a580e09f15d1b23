//! Integration tests for Value and Context

use relata_foundation::{Context, Value};

// =============================================================================
// Value Ordering
// =============================================================================

#[test]
fn nil_sorts_before_everything() {
    let mut values = vec![
        Value::from("b"),
        Value::Int(3),
        Value::Nil,
        Value::Bool(true),
        Value::from("a"),
        Value::Int(-1),
    ];
    values.sort();
    assert_eq!(
        values,
        vec![
            Value::Nil,
            Value::Bool(true),
            Value::Int(-1),
            Value::Int(3),
            Value::from("a"),
            Value::from("b"),
        ]
    );
}

#[test]
fn nil_equals_nil() {
    assert_eq!(Value::Nil, Value::Nil);
    assert!(Value::default().is_nil());
}

#[test]
fn floats_compare_by_bits() {
    let nan = Value::Float(f64::NAN);
    assert_eq!(nan, nan.clone());
    assert_ne!(Value::Float(0.0), Value::Float(-0.0));
}

// =============================================================================
// Accessors and Display
// =============================================================================

#[test]
fn accessors_match_variants() {
    assert_eq!(Value::Int(7).as_int(), Some(7));
    assert_eq!(Value::from("x").as_str(), Some("x"));
    assert_eq!(Value::Bool(false).as_bool(), Some(false));
    assert_eq!(Value::from("x").as_int(), None);
    assert_eq!(
        Value::List(vec![Value::Int(1)]).as_list(),
        Some(&[Value::Int(1)][..])
    );
}

#[test]
fn display_joins_lists_with_commas() {
    let list = Value::List(vec![Value::Int(1), Value::from("two"), Value::Nil]);
    assert_eq!(list.to_string(), "1,two,null");
    assert_eq!(Value::from("plain").to_string(), "plain");
}

#[test]
fn type_names_for_diagnostics() {
    assert_eq!(Value::Nil.type_name(), "nil");
    assert_eq!(Value::Int(1).type_name(), "int");
    assert_eq!(Value::from("s").type_name(), "string");
}

// =============================================================================
// Context
// =============================================================================

#[derive(Debug, PartialEq)]
struct CurrentUser(u32);

#[test]
fn context_carries_caller_values() {
    let context = Context::new(CurrentUser(4));
    assert!(!context.is_empty());
    assert_eq!(context.get::<CurrentUser>(), Some(&CurrentUser(4)));
    assert_eq!(context.get::<String>(), None);
}

#[test]
fn empty_context_yields_nothing() {
    let context = Context::none();
    assert!(context.is_empty());
    assert_eq!(context.get::<CurrentUser>(), None);
}

#[test]
fn cloned_context_shares_its_value() {
    let context = Context::new(CurrentUser(9));
    let copy = context.clone();
    assert_eq!(copy.get::<CurrentUser>(), Some(&CurrentUser(9)));
}
