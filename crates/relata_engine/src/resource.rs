//! Resource instances.

use std::collections::BTreeMap;
use std::sync::Arc;

use relata_foundation::{Context, Error, Result, Value};
use relata_schema::ResourceType;
use relata_storage::Row;

/// How a mutation finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Fully applied.
    Completed,
    /// Accepted by the store but not yet applied.
    Accepted,
}

impl Outcome {
    /// `Completed` only if both are.
    #[must_use]
    pub fn and(self, other: Outcome) -> Outcome {
        if self == Outcome::Completed && other == Outcome::Completed {
            Outcome::Completed
        } else {
            Outcome::Accepted
        }
    }

    /// Returns true for [`Outcome::Completed`].
    #[must_use]
    pub fn is_completed(self) -> bool {
        self == Outcome::Completed
    }
}

/// One resource instance: a row of the resource's model plus mutation state.
///
/// Instances are created per request through the [`Engine`](crate::Engine)
/// and never cached.
#[derive(Debug)]
pub struct Resource {
    pub(crate) resource_type: Arc<ResourceType>,
    pub(crate) row: Row,
    pub(crate) context: Context,
    pub(crate) save_needed: bool,
    pub(crate) reload_needed: bool,
    pub(crate) changing: bool,
}

impl Resource {
    pub(crate) fn new(resource_type: Arc<ResourceType>, row: Row, context: Context) -> Self {
        Self {
            resource_type,
            row,
            context,
            save_needed: false,
            reload_needed: false,
            changing: false,
        }
    }

    /// The declared resource type.
    #[must_use]
    pub fn resource_type(&self) -> &Arc<ResourceType> {
        &self.resource_type
    }

    /// The underlying row.
    #[must_use]
    pub fn row(&self) -> &Row {
        &self.row
    }

    /// Consumes the instance, returning its row.
    #[must_use]
    pub fn into_row(self) -> Row {
        self.row
    }

    /// The caller context the instance was created with.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The primary key value; nil until first saved.
    #[must_use]
    pub fn id(&self) -> &Value {
        self.row.get(self.resource_type.primary_key())
    }

    /// Returns true until the row has been saved once.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.id().is_nil()
    }

    /// Reads an attribute, honoring delegates.
    ///
    /// # Errors
    ///
    /// `UnknownField` if the resource declares no such attribute.
    pub fn attribute(&self, name: &str) -> Result<&Value> {
        self.resource_type
            .column_for(name)
            .map(|column| self.row.get(column))
            .ok_or_else(|| Error::unknown_field(self.resource_type.type_name(), name))
    }

    /// Reads the foreign key of a to-one relationship stored on this row.
    ///
    /// # Errors
    ///
    /// `UnknownField` if there is no such to-one relationship keyed here.
    pub fn to_one_key(&self, relationship: &str) -> Result<&Value> {
        self.resource_type
            .relationship(relationship)
            .filter(|r| r.is_belongs_to())
            .map(|r| self.row.get(&r.foreign_key))
            .ok_or_else(|| Error::unknown_field(self.resource_type.type_name(), relationship))
    }

    /// Eager-loaded rows for a relationship, if loaded.
    #[must_use]
    pub fn loaded(&self, relationship: &str) -> Option<&[Row]> {
        let relation_name = self
            .resource_type
            .relationship(relationship)
            .map_or(relationship, |r| r.relation_name.as_str());
        self.row.loaded(relation_name)
    }

    /// Serializer metadata.
    #[must_use]
    pub fn meta(&self) -> BTreeMap<String, Value> {
        self.resource_type.meta(&self.row, &self.context)
    }

    /// Serializer custom links.
    #[must_use]
    pub fn custom_links(&self) -> BTreeMap<String, Value> {
        self.resource_type.custom_links(&self.row, &self.context)
    }

    /// Returns true if changes are waiting for a save.
    #[must_use]
    pub fn save_needed(&self) -> bool {
        self.save_needed
    }

    /// Returns true if the row must be re-read after the next save.
    #[must_use]
    pub fn reload_needed(&self) -> bool {
        self.reload_needed
    }

    /// Returns true while a mutation is running on this instance.
    #[must_use]
    pub fn is_changing(&self) -> bool {
        self.changing
    }
}
