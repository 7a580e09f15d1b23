//! Integration tests for the resource registry

use relata_foundation::{Context, Error, ErrorKind, Value};
use relata_schema::{FilterDef, Registry, RelationshipDescriptor, ResourceType};
use relata_storage::{ColumnRef, Predicate, Relation};

// =============================================================================
// Helper Functions
// =============================================================================

fn blog() -> Registry {
    let mut registry = Registry::new();
    let types = [
        ResourceType::declare("person")
            .attribute("name")
            .relationship(RelationshipDescriptor::to_many("posts").with_inverse("author")),
        ResourceType::declare("post")
            .attribute("title")
            .relationship(
                RelationshipDescriptor::to_one("author")
                    .with_target("people")
                    .with_inverse("posts"),
            )
            .relationship(RelationshipDescriptor::to_many("comments")),
        ResourceType::declare("comment").attribute("body"),
        ResourceType::declare("admin/post").type_name("admin_posts").attribute("title"),
        ResourceType::declare("content").abstract_resource(),
    ];
    for declaration in types {
        registry.register(declaration.build().unwrap()).unwrap();
    }
    registry
}

// =============================================================================
// Registration
// =============================================================================

#[test]
fn types_are_listed_by_name() {
    let registry = blog();
    assert_eq!(
        registry.type_names().collect::<Vec<_>>(),
        ["admin_posts", "comments", "contents", "people", "posts"]
    );
    assert!(registry.contains("people"));
    assert!(registry.check().is_ok());
}

#[test]
fn duplicate_type_names_are_refused() {
    let mut registry = blog();
    let again = ResourceType::declare("post").build().unwrap();
    let err = registry.register(again).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidDeclaration(ref m) if m.contains("posts")));
}

#[test]
fn unknown_types_are_reported() {
    let registry = blog();
    let err = registry.get("widgets").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownResource(ref name) if name == "widgets"));
}

#[test]
fn dangling_targets_fail_the_check() {
    let mut registry = blog();
    registry
        .register_relationship("comments", RelationshipDescriptor::to_one("moderator"))
        .unwrap();
    let err = registry.check().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidDeclaration(ref m) if m.contains("moderators")));
}

#[test]
fn late_relationships_follow_declaration_rules() {
    let mut registry = blog();
    registry
        .register_relationship(
            "comments",
            RelationshipDescriptor::to_one("post").with_inverse("comments"),
        )
        .unwrap();
    let comments = registry.get("comments").unwrap();
    assert_eq!(comments.relationship("post").unwrap().source_type, "comments");

    let err = registry
        .register_relationship("comments", RelationshipDescriptor::to_one("body"))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidDeclaration(_)));
    let err = registry
        .register_relationship("widgets", RelationshipDescriptor::to_one("post"))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownResource(_)));
}

// =============================================================================
// Model Resolution
// =============================================================================

#[test]
fn models_resolve_to_their_types() {
    let registry = blog();
    assert_eq!(registry.resource_type_for("Post").unwrap().type_name(), "posts");
    assert_eq!(
        registry.resource_type_for("Admin::Post").unwrap().type_name(),
        "admin_posts"
    );
    assert_eq!(registry.model_name_for("people"), Some("Person"));
    assert_eq!(registry.model_name_for("contents"), None);
}

#[test]
fn unregistered_models_fall_back_to_their_base_name() {
    let registry = blog();
    assert_eq!(
        registry.resource_type_for("Legacy::Comment").unwrap().type_name(),
        "comments"
    );
    assert!(registry.resource_type_for("Content").is_err());
    assert!(registry.resource_type_for("Widget").is_err());
}

#[test]
fn hints_override_model_registration() {
    let mut registry = blog();
    registry.model_hint("SpecialPost", "posts");
    registry.model_hint("Person", "comments");
    assert_eq!(
        registry.resource_type_for("SpecialPost").unwrap().type_name(),
        "posts"
    );
    assert_eq!(registry.resource_type_for("Person").unwrap().type_name(), "comments");
    assert_eq!(registry.model_name_for("posts"), Some("Post"));
}

#[test]
fn inverse_lookup() {
    let registry = blog();
    let post = registry.get("posts").unwrap();
    let author = post.relationship("author").unwrap();
    let (people, posts) = registry.inverse_of(author).unwrap();
    assert_eq!(people.type_name(), "people");
    assert_eq!(posts.name, "posts");
    assert_eq!(registry.target_of(author).unwrap().type_name(), "people");

    let comments = post.relationship("comments").unwrap();
    assert!(registry.inverse_of(comments).is_none());
}

// =============================================================================
// Named Strategies
// =============================================================================

#[test]
fn named_strategies_resolve_through_the_registry() {
    let mut registry = blog();
    registry.register_verifier("upcase", |values, _| {
        Ok(values
            .iter()
            .map(|v| Value::from(v.to_string().to_uppercase()))
            .collect())
    });
    registry.register_applier("published", |relation, _, _| {
        Ok(relation.filter(Predicate::is_in(
            ColumnRef::root("status"),
            vec![Value::from("published")],
        )))
    });

    let filter = FilterDef::new("title").verify_named("upcase").apply_named("published");
    let verified = registry
        .verify_with(filter.verify.as_ref().unwrap(), &[Value::from("rust")], &Context::none())
        .unwrap();
    assert_eq!(verified, vec![Value::from("RUST")]);

    let relation = registry
        .apply_with(filter.apply.as_ref().unwrap(), Relation::new("Post"), &verified, &Context::none())
        .unwrap();
    assert_eq!(relation.predicates.len(), 1);
}

#[test]
fn missing_named_strategy_is_a_declaration_error() {
    let registry = blog();
    let filter = FilterDef::new("title").verify_named("nope");
    let err = registry
        .verify_with(filter.verify.as_ref().unwrap(), &[], &Context::none())
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidDeclaration(ref m) if m.contains("nope")));
}

#[test]
fn strategy_errors_pass_through() {
    let mut registry = blog();
    registry.register_verifier("strict", |_, _| Err(Error::invalid_field_value("title", "x")));
    let filter = FilterDef::new("title").verify_named("strict");
    let err = registry
        .verify_with(filter.verify.as_ref().unwrap(), &[], &Context::none())
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidFieldValue { .. }));
}
