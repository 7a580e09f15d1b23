//! Relationship declarations.
//!
//! A [`RelationshipDescriptor`] carries everything the link protocol and the
//! query engine need to know about one declared relationship. Names that are
//! not given explicitly are derived from the relationship name:
//!
//! | Field | To-one `author` | To-many `comments` |
//! |---|---|---|
//! | target type | `authors` | `comments` |
//! | foreign key | `author_id` | `comment_ids` |
//! | relation name | `author` | `comments` |

use relata_foundation::inflect;

/// Cardinality and shape of a relationship.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    /// At most one related resource of a fixed type.
    ToOne,
    /// Any number of related resources.
    ToMany,
    /// At most one related resource whose type is stored alongside its key.
    PolymorphicToOne,
}

/// A declared relationship between two resource types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationshipDescriptor {
    /// Relationship name.
    pub name: String,
    /// Shape of the relationship.
    pub kind: RelationshipKind,
    /// Type name of the declaring resource, set on registration.
    pub source_type: String,
    /// Type name of the related resource.
    pub target_type: String,
    /// Foreign key column.
    pub foreign_key: String,
    /// Association name used with the store.
    pub relation_name: String,
    /// Column holding the related model, for polymorphic relationships.
    pub polymorphic_type_column: Option<String>,
    /// Relationship on the target that points back.
    pub inverse_name: Option<String>,
    /// Whether edits propagate to the inverse.
    pub reflect: bool,
    /// Whether the foreign key lives on the declaring row.
    pub belongs_to: bool,
}

impl RelationshipDescriptor {
    fn new(name: String, kind: RelationshipKind) -> Self {
        let (target_type, foreign_key) = match kind {
            RelationshipKind::ToMany => (
                name.clone(),
                format!("{}_ids", inflect::singularize(&name)),
            ),
            RelationshipKind::ToOne | RelationshipKind::PolymorphicToOne => {
                (inflect::pluralize(&name), format!("{name}_id"))
            }
        };
        Self {
            polymorphic_type_column: (kind == RelationshipKind::PolymorphicToOne)
                .then(|| format!("{name}_type")),
            relation_name: name.clone(),
            source_type: String::new(),
            inverse_name: None,
            reflect: true,
            belongs_to: kind != RelationshipKind::ToMany,
            target_type,
            foreign_key,
            kind,
            name,
        }
    }

    /// A to-one relationship with the foreign key on the declaring row.
    #[must_use]
    pub fn to_one(name: impl Into<String>) -> Self {
        Self::new(name.into(), RelationshipKind::ToOne)
    }

    /// A to-many relationship.
    #[must_use]
    pub fn to_many(name: impl Into<String>) -> Self {
        Self::new(name.into(), RelationshipKind::ToMany)
    }

    /// A polymorphic to-one relationship.
    #[must_use]
    pub fn polymorphic(name: impl Into<String>) -> Self {
        Self::new(name.into(), RelationshipKind::PolymorphicToOne)
    }

    /// Sets the related resource type.
    #[must_use]
    pub fn with_target(mut self, type_name: impl Into<String>) -> Self {
        self.target_type = type_name.into();
        self
    }

    /// Sets the foreign key column.
    #[must_use]
    pub fn with_foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = column.into();
        self
    }

    /// Sets the store association name.
    #[must_use]
    pub fn with_relation_name(mut self, name: impl Into<String>) -> Self {
        self.relation_name = name.into();
        self
    }

    /// Sets the inverse relationship on the target.
    #[must_use]
    pub fn with_inverse(mut self, name: impl Into<String>) -> Self {
        self.inverse_name = Some(name.into());
        self
    }

    /// Turns reflection on or off for this relationship.
    #[must_use]
    pub fn with_reflect(mut self, reflect: bool) -> Self {
        self.reflect = reflect;
        self
    }

    /// Marks a to-one relationship as keyed from the related row.
    #[must_use]
    pub fn foreign_key_on_related(mut self) -> Self {
        self.belongs_to = false;
        self
    }

    /// Returns true for to-many relationships.
    #[must_use]
    pub fn is_to_many(&self) -> bool {
        self.kind == RelationshipKind::ToMany
    }

    /// Returns true for polymorphic to-one relationships.
    #[must_use]
    pub fn is_polymorphic(&self) -> bool {
        self.kind == RelationshipKind::PolymorphicToOne
    }

    /// Returns true if the declaring row stores the foreign key.
    #[must_use]
    pub fn is_belongs_to(&self) -> bool {
        self.belongs_to && !self.is_to_many()
    }
}
