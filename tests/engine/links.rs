//! Integration tests for relationship links
//!
//! The same edits are run with and without reflection: the stored result
//! must not depend on which side carried the edit out.

use relata_engine::{EngineConfig, LinkOptions};
use relata_foundation::{Context, ErrorKind, Value};
use relata_schema::ChangeKind;

use crate::common;

// =============================================================================
// To-many Creation
// =============================================================================

#[test]
fn direct_create_stages_one_write() {
    let (mut engine, counters) = common::engine(EngineConfig::default());
    let mut post = common::find(&engine, "posts", 2);
    let writes = engine.store().writes();

    engine
        .create_to_many_links(&mut post, "comments", vec![Value::Int(1)])
        .unwrap();

    assert_eq!(engine.store().writes(), writes + 1);
    assert_eq!(common::stored(&engine, "Comment", 1, "post_id"), Value::Int(2));
    assert_eq!(common::members(&engine, &post, "comments"), vec![1, 3]);
    assert_eq!(counters.get("posts", ChangeKind::CreateToManyLink), 1);
    assert_eq!(counters.get("comments", ChangeKind::ReplaceToOneLink), 0);
}

#[test]
fn reflected_create_is_carried_out_by_the_target() {
    let (mut engine, counters) = common::engine(EngineConfig::reflecting());
    let mut post = common::find(&engine, "posts", 2);
    let writes = engine.store().writes();

    engine
        .create_to_many_links(&mut post, "comments", vec![Value::Int(1)])
        .unwrap();

    assert_eq!(engine.store().writes(), writes + 1);
    assert_eq!(common::stored(&engine, "Comment", 1, "post_id"), Value::Int(2));
    assert_eq!(common::members(&engine, &post, "comments"), vec![1, 3]);

    assert_eq!(counters.get("posts", ChangeKind::Update), 1);
    assert_eq!(counters.get("posts", ChangeKind::CreateToManyLink), 1);
    assert_eq!(counters.get("comments", ChangeKind::Update), 1);
    assert_eq!(counters.get("comments", ChangeKind::ReplaceToOneLink), 1);
    assert_eq!(counters.get("posts", ChangeKind::ReplaceToOneLink), 0);
    assert!(!post.reload_needed());
    assert!(!post.save_needed());
}

#[test]
fn reflected_create_through_a_belongs_to_inverse() {
    let (mut engine, _) = common::engine(EngineConfig::reflecting());
    let mut barbara = common::find(&engine, "people", 3);
    engine
        .create_to_many_links(&mut barbara, "posts", vec![Value::Int(4)])
        .unwrap();
    assert_eq!(common::stored(&engine, "Post", 4, "author_id"), Value::Int(3));
    assert_eq!(common::members(&engine, &barbara, "posts"), vec![4]);
}

#[test]
fn existing_members_reject_the_whole_batch() {
    for config in [EngineConfig::default(), EngineConfig::reflecting()] {
        let (mut engine, _) = common::engine(config);
        let mut post = common::find(&engine, "posts", 1);
        let writes = engine.store().writes();

        let err = engine
            .create_to_many_links(&mut post, "comments", vec![Value::Int(3), Value::Int(1)])
            .unwrap_err();

        assert!(matches!(err.kind, ErrorKind::HasManyRelationExists(Value::Int(1))));
        assert_eq!(engine.store().writes(), writes);
        assert_eq!(common::stored(&engine, "Comment", 3, "post_id"), Value::Int(2));
        assert!(!post.is_changing());
    }
}

#[test]
fn string_keys_of_existing_members_are_recognised() {
    for config in [EngineConfig::default(), EngineConfig::reflecting()] {
        let (mut engine, _) = common::engine(config);
        let mut post = common::find(&engine, "posts", 1);
        let writes = engine.store().writes();

        for relationship in ["comments", "tags"] {
            let err = engine
                .create_to_many_links(&mut post, relationship, vec![Value::from("1")])
                .unwrap_err();
            assert!(
                matches!(err.kind, ErrorKind::HasManyRelationExists(Value::Int(1))),
                "{relationship}: {err:?}"
            );
        }
        assert_eq!(engine.store().writes(), writes);
    }
}

#[test]
fn unresolved_members_are_not_found() {
    let (mut engine, _) = common::engine(EngineConfig::default());
    let mut post = common::find(&engine, "posts", 1);
    let err = engine
        .create_to_many_links(&mut post, "tags", vec![Value::Int(3), Value::Int(9)])
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RecordNotFound(Value::Int(9))));
    assert_eq!(common::members(&engine, &post, "tags"), vec![1, 2]);
}

#[test]
fn explicit_reflection_options_edit_directly() {
    let (mut engine, counters) = common::engine(EngineConfig::reflecting());
    let mut post = common::find(&engine, "posts", 2);
    let source = common::find(&engine, "comments", 4);

    engine
        .create_to_many_links_with(
            &mut post,
            "comments",
            vec![Value::Int(4)],
            LinkOptions::reflected(source.row()),
        )
        .unwrap();

    assert_eq!(common::stored(&engine, "Comment", 4, "post_id"), Value::Int(2));
    assert_eq!(counters.get("comments", ChangeKind::ReplaceToOneLink), 0);
}

#[test]
fn new_resources_link_with_their_first_save() {
    let (mut engine, counters) = common::engine(EngineConfig::reflecting());
    let mut comment = engine.new_resource("comments", Context::none()).unwrap();
    let writes = engine.store().writes();

    engine
        .replace_to_one_link(&mut comment, "post", Value::Int(4))
        .unwrap();

    assert_eq!(engine.store().writes(), writes + 1);
    assert_eq!(comment.id(), &Value::Int(5));
    assert_eq!(common::stored(&engine, "Comment", 5, "post_id"), Value::Int(4));
    assert_eq!(counters.get("comments", ChangeKind::Create), 1);
    assert_eq!(counters.get("posts", ChangeKind::CreateToManyLink), 0);
}

// =============================================================================
// To-many Replacement
// =============================================================================

#[test]
fn replacing_tags_gives_the_same_membership_either_way() {
    for config in [EngineConfig::default(), EngineConfig::reflecting()] {
        let (mut engine, _) = common::engine(config);
        let mut post = common::find(&engine, "posts", 1);

        engine
            .replace_to_many_links(&mut post, "tags", vec![Value::Int(2), Value::Int(3)])
            .unwrap();

        assert_eq!(common::members(&engine, &post, "tags"), vec![2, 3]);
        let rust = common::find(&engine, "tags", 1);
        assert_eq!(common::members(&engine, &rust, "posts"), vec![2]);
        let news = common::find(&engine, "tags", 3);
        assert_eq!(common::members(&engine, &news, "posts"), vec![1]);
    }
}

#[test]
fn reflected_tag_replacement_adds_through_the_tag() {
    let (mut engine, counters) = common::engine(EngineConfig::reflecting());
    let mut post = common::find(&engine, "posts", 1);
    engine
        .replace_to_many_links(&mut post, "tags", vec![Value::Int(2), Value::Int(3)])
        .unwrap();
    assert_eq!(counters.get("tags", ChangeKind::CreateToManyLink), 1);
    assert_eq!(counters.get("tags", ChangeKind::RemoveToManyLink), 0);
    assert_eq!(counters.get("posts", ChangeKind::ReplaceToManyLinks), 1);
}

#[test]
fn reflected_comment_replacement_moves_foreign_keys() {
    let (mut engine, _) = common::engine(EngineConfig::reflecting());
    let mut post = common::find(&engine, "posts", 1);

    engine
        .replace_to_many_links(&mut post, "comments", vec![Value::Int(2), Value::Int(3)])
        .unwrap();

    assert!(common::stored(&engine, "Comment", 1, "post_id").is_nil());
    assert_eq!(common::stored(&engine, "Comment", 3, "post_id"), Value::Int(1));
    assert_eq!(common::members(&engine, &post, "comments"), vec![2, 3]);
    let rust_tips = common::find(&engine, "posts", 2);
    assert!(common::members(&engine, &rust_tips, "comments").is_empty());
}

#[test]
fn reflected_replacement_with_string_keys_keeps_current_members() {
    let (mut engine, counters) = common::engine(EngineConfig::reflecting());
    let mut post = common::find(&engine, "posts", 1);
    let writes = engine.store().writes();

    engine
        .replace_to_many_links(&mut post, "comments", vec![Value::from("1"), Value::from("2")])
        .unwrap();

    assert_eq!(engine.store().writes(), writes);
    assert_eq!(common::members(&engine, &post, "comments"), vec![1, 2]);
    assert_eq!(common::stored(&engine, "Comment", 1, "post_id"), Value::Int(1));
    assert_eq!(counters.get("comments", ChangeKind::RemoveToOneLink), 0);
    assert_eq!(counters.get("comments", ChangeKind::ReplaceToOneLink), 0);
}

#[test]
fn replacing_with_nothing_empties_the_relationship() {
    let (mut engine, _) = common::engine(EngineConfig::default());
    let mut post = common::find(&engine, "posts", 1);
    engine.replace_to_many_links(&mut post, "tags", Vec::new()).unwrap();
    assert!(common::members(&engine, &post, "tags").is_empty());
    assert_eq!(engine.store().len("Tag"), 3);
}

// =============================================================================
// To-many Removal
// =============================================================================

#[test]
fn reflected_removal_clears_the_inverse() {
    let (mut engine, counters) = common::engine(EngineConfig::reflecting());
    let mut post = common::find(&engine, "posts", 1);

    engine
        .remove_to_many_link(&mut post, "comments", Value::Int(2))
        .unwrap();

    assert!(common::stored(&engine, "Comment", 2, "post_id").is_nil());
    assert_eq!(common::members(&engine, &post, "comments"), vec![1]);
    assert_eq!(counters.get("comments", ChangeKind::RemoveToOneLink), 1);
    assert_eq!(engine.store().len("Comment"), 4);
}

#[test]
fn string_keys_remove_existing_members() {
    for config in [EngineConfig::default(), EngineConfig::reflecting()] {
        let (mut engine, _) = common::engine(config);
        let mut post = common::find(&engine, "posts", 1);

        engine
            .remove_to_many_link(&mut post, "tags", Value::from("1"))
            .unwrap();

        assert_eq!(common::members(&engine, &post, "tags"), vec![2]);
        let rust = common::find(&engine, "tags", 1);
        assert_eq!(common::members(&engine, &rust, "posts"), vec![2]);
    }
}

#[test]
fn removal_keys_must_fit_the_key_type() {
    let (mut engine, _) = common::engine(EngineConfig::default());
    let mut post = common::find(&engine, "posts", 1);
    let err = engine
        .remove_to_many_link(&mut post, "tags", Value::from("one"))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidFieldValue { .. }));
    assert_eq!(common::members(&engine, &post, "tags"), vec![1, 2]);
}

#[test]
fn removing_a_non_member_is_not_found() {
    let (mut engine, _) = common::engine(EngineConfig::default());
    let mut post = common::find(&engine, "posts", 1);
    let err = engine
        .remove_to_many_link(&mut post, "comments", Value::Int(3))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RecordNotFound(Value::Int(3))));
    assert_eq!(common::stored(&engine, "Comment", 3, "post_id"), Value::Int(2));
}

// =============================================================================
// To-one Links
// =============================================================================

#[test]
fn to_one_keys_are_verified_then_assigned() {
    let (mut engine, _) = common::engine(EngineConfig::default());
    let mut post = common::find(&engine, "posts", 2);

    engine
        .replace_to_one_link(&mut post, "author", Value::from("3"))
        .unwrap();
    assert_eq!(post.to_one_key("author").unwrap(), &Value::Int(3));
    assert_eq!(common::stored(&engine, "Post", 2, "author_id"), Value::Int(3));

    engine.remove_to_one_link(&mut post, "author").unwrap();
    assert!(common::stored(&engine, "Post", 2, "author_id").is_nil());

    let err = engine
        .replace_to_one_link(&mut post, "author", Value::from("three"))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidFieldValue { .. }));
}

#[test]
fn polymorphic_links_record_the_target_model() {
    let (mut engine, _) = common::engine(EngineConfig::default());
    let mut attachment = common::find(&engine, "attachments", 1);

    let owner = engine.find_related_one(&attachment, "attachable").unwrap().unwrap();
    assert_eq!(owner.resource_type().type_name(), "posts");
    assert_eq!(owner.id(), &Value::Int(1));

    engine
        .replace_polymorphic_to_one_link(&mut attachment, "attachable", Value::Int(2), "people")
        .unwrap();
    assert_eq!(common::stored(&engine, "Attachment", 1, "attachable_type"), Value::from("Person"));

    let owner = engine.find_related_one(&attachment, "attachable").unwrap().unwrap();
    assert_eq!(owner.resource_type().type_name(), "people");
    assert_eq!(owner.attribute("name").unwrap(), &Value::from("Ada"));

    engine.remove_to_one_link(&mut attachment, "attachable").unwrap();
    assert!(engine.find_related_one(&attachment, "attachable").unwrap().is_none());
    assert!(common::stored(&engine, "Attachment", 1, "attachable_type").is_nil());
}

#[test]
fn plain_to_one_is_not_polymorphic() {
    let (mut engine, _) = common::engine(EngineConfig::default());
    let mut post = common::find(&engine, "posts", 1);
    let err = engine
        .replace_polymorphic_to_one_link(&mut post, "author", Value::Int(2), "people")
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownField { ref field, .. } if field == "author"));
}

// =============================================================================
// Misuse
// =============================================================================

#[test]
fn relationship_kind_mismatches_are_internal() {
    let (mut engine, _) = common::engine(EngineConfig::default());
    let mut post = common::find(&engine, "posts", 1);

    let err = engine
        .create_to_many_links(&mut post, "author", vec![Value::Int(2)])
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Internal(_)));

    let err = engine
        .replace_to_one_link(&mut post, "tags", Value::Int(2))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Internal(_)));
}

#[test]
fn unknown_relationships_are_unknown_fields() {
    let (mut engine, _) = common::engine(EngineConfig::default());
    let mut post = common::find(&engine, "posts", 1);
    let err = engine
        .remove_to_many_link(&mut post, "editors", Value::Int(1))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownField { ref field, .. } if field == "editors"));
}
