//! Resource mutation.
//!
//! Every public mutation runs inside [`Engine::begin_change`], which wraps the
//! body in the resource's lifecycle hooks and performs at most one save per
//! top-level call. Link operations invoked from inside another mutation on
//! the same instance are re-entrant: they run their own hooks but leave the
//! save to the outermost call.
//!
//! ```text
//! before(Create|Update)
//!   before(kind)
//!     body            <- may call other public operations (re-entrant)
//!   after(kind)
//!   save              <- only if save_needed or new
//! after(Create|Update)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use relata_foundation::{Error, ErrorContext, ErrorKind, Result, Value};
use relata_schema::ChangeKind;
use relata_storage::{Persistence, WriteStatus};
use tracing::debug;

use crate::engine::Engine;
use crate::resource::{Outcome, Resource};

/// New value for a to-one relationship.
#[derive(Clone, Debug, PartialEq)]
pub enum ToOneValue {
    /// Clears the relationship.
    Null,
    /// Links the resource with this key.
    Key(Value),
    /// Links a resource of the named type.
    Polymorphic {
        /// Related key.
        id: Value,
        /// Related resource type name.
        type_name: String,
    },
}

/// A batch of field replacements.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldData {
    /// Attribute values by attribute name.
    pub attributes: BTreeMap<String, Value>,
    /// To-one relationship values by relationship name.
    pub to_one: BTreeMap<String, ToOneValue>,
    /// To-many relationship keys by relationship name.
    pub to_many: BTreeMap<String, Vec<Value>>,
}

impl FieldData {
    /// An empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute value.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Adds a to-one value.
    #[must_use]
    pub fn with_to_one(mut self, name: impl Into<String>, value: ToOneValue) -> Self {
        self.to_one.insert(name.into(), value);
        self
    }

    /// Adds a to-many key set.
    #[must_use]
    pub fn with_to_many<I, V>(mut self, name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.to_many
            .insert(name.into(), keys.into_iter().map(Into::into).collect());
        self
    }

    /// Returns true if the batch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.to_one.is_empty() && self.to_many.is_empty()
    }
}

impl<P: Persistence> Engine<P> {
    // =========================================================================
    // Change state machine
    // =========================================================================

    /// Runs `body` as a mutation of `kind` on `resource`.
    ///
    /// # Errors
    ///
    /// Propagates hook, body and save failures. `changing` is reset on the
    /// way out either way.
    pub fn begin_change<F>(&mut self, resource: &mut Resource, kind: ChangeKind, body: F) -> Result<Outcome>
    where
        F: FnOnce(&mut Self, &mut Resource) -> Result<Outcome>,
    {
        let resource_type = Arc::clone(&resource.resource_type);
        let callbacks = resource_type.callbacks();

        if resource.changing {
            callbacks.run_before(kind, &mut resource.row, &resource.context)?;
            let outcome = body(self, resource)?;
            callbacks.run_after(kind, &mut resource.row, &resource.context)?;
            return Ok(outcome);
        }

        let outer = if resource.is_new() {
            ChangeKind::Create
        } else {
            ChangeKind::Update
        };
        debug!(resource = resource_type.type_name(), %kind, %outer, "begin change");

        resource.changing = true;
        let result = (|| -> Result<Outcome> {
            callbacks.run_before(outer, &mut resource.row, &resource.context)?;
            callbacks.run_before(kind, &mut resource.row, &resource.context)?;
            let body_outcome = body(self, resource)?;
            callbacks.run_after(kind, &mut resource.row, &resource.context)?;

            let save_outcome = if resource.save_needed || resource.is_new() {
                self.save(resource)?
            } else {
                if resource.reload_needed {
                    self.store.reload(&mut resource.row)?;
                    resource.reload_needed = false;
                }
                Outcome::Completed
            };

            callbacks.run_after(outer, &mut resource.row, &resource.context)?;
            Ok(body_outcome.and(save_outcome))
        })();
        resource.changing = false;
        result.map_err(|err| match err.context {
            Some(_) => err,
            None => err.with_context(
                ErrorContext::new()
                    .with_resource(resource_type.type_name())
                    .with_frame(kind.as_str()),
            ),
        })
    }

    /// Writes the row, mapping store refusals onto the error taxonomy.
    pub(crate) fn save(&mut self, resource: &mut Resource) -> Result<Outcome> {
        let errors = self.store.validate(&resource.row);
        if !errors.is_empty() {
            return Err(Error::validation(errors));
        }

        let outcome = match self.store.save(&mut resource.row)? {
            WriteStatus::Completed => Outcome::Completed,
            WriteStatus::Deferred => Outcome::Accepted,
            WriteStatus::Rejected(errors) if errors.is_empty() => return Err(Error::save_failed()),
            WriteStatus::Rejected(errors) => return Err(Error::validation(errors)),
        };

        if resource.reload_needed {
            self.store.reload(&mut resource.row)?;
        }
        resource.save_needed = false;
        resource.reload_needed = false;
        debug!(
            resource = resource.resource_type.type_name(),
            id = %resource.id(),
            ?outcome,
            "resource saved"
        );
        Ok(outcome)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Saves a new or changed resource.
    ///
    /// # Errors
    ///
    /// `ValidationErrors` or `SaveFailed` when the store refuses the row.
    pub fn save_resource(&mut self, resource: &mut Resource) -> Result<Outcome> {
        resource.save_needed = true;
        if resource.changing {
            return Ok(Outcome::Completed);
        }
        let kind = if resource.is_new() {
            ChangeKind::Create
        } else {
            ChangeKind::Update
        };
        let resource_type = Arc::clone(&resource.resource_type);
        let callbacks = resource_type.callbacks();
        resource.changing = true;
        let result = (|| -> Result<Outcome> {
            callbacks.run_before(kind, &mut resource.row, &resource.context)?;
            let outcome = self.save(resource)?;
            callbacks.run_after(kind, &mut resource.row, &resource.context)?;
            Ok(outcome)
        })();
        resource.changing = false;
        result
    }

    /// Destroys the resource's row.
    ///
    /// # Errors
    ///
    /// `RecordLocked` when a dependent restricts removal and
    /// `ValidationErrors` when the store refuses it.
    pub fn remove(&mut self, resource: &mut Resource) -> Result<Outcome> {
        let resource_type = Arc::clone(&resource.resource_type);
        let callbacks = resource_type.callbacks();

        callbacks.run_before(ChangeKind::Remove, &mut resource.row, &resource.context)?;
        let outcome = match self.store.destroy(&resource.row)? {
            WriteStatus::Completed => Outcome::Completed,
            WriteStatus::Deferred => Outcome::Accepted,
            WriteStatus::Rejected(errors) => return Err(Error::validation(errors)),
        };
        callbacks.run_after(ChangeKind::Remove, &mut resource.row, &resource.context)?;

        debug!(resource = resource_type.type_name(), id = %resource.id(), "resource removed");
        Ok(outcome)
    }

    /// Applies a batch of attribute and relationship replacements with a
    /// single save.
    ///
    /// # Errors
    ///
    /// `UnknownField` for undeclared names, `InvalidFieldValue` for values the
    /// store rejects, and any error of the link operations involved.
    pub fn replace_fields(&mut self, resource: &mut Resource, data: FieldData) -> Result<Outcome> {
        self.begin_change(resource, ChangeKind::ReplaceFields, |engine, resource| {
            let mut outcome = Outcome::Completed;

            for (name, value) in data.attributes {
                engine.assign_attribute(resource, &name, value)?;
            }

            for (name, value) in data.to_one {
                let linked = match value {
                    ToOneValue::Null => engine.remove_to_one_link(resource, &name)?,
                    ToOneValue::Key(key) => engine.replace_to_one_link(resource, &name, key)?,
                    ToOneValue::Polymorphic { id, type_name } => {
                        engine.replace_polymorphic_to_one_link(resource, &name, id, &type_name)?
                    }
                };
                outcome = outcome.and(linked);
            }

            for (name, keys) in data.to_many {
                outcome = outcome.and(engine.replace_to_many_links(resource, &name, keys)?);
            }

            Ok(outcome)
        })
    }

    fn assign_attribute(&mut self, resource: &mut Resource, name: &str, value: Value) -> Result<()> {
        let resource_type = Arc::clone(&resource.resource_type);
        let column = resource_type
            .attribute(name)
            .map(|attribute| attribute.column())
            .ok_or_else(|| Error::unknown_field(resource_type.type_name(), name))?;

        self.store
            .assign(&mut resource.row, column, value.clone())
            .map_err(|err| match err.kind {
                ErrorKind::InvalidFieldValue { .. } => Error::invalid_field_value(name, value),
                _ => err,
            })?;
        resource.save_needed = true;
        Ok(())
    }
}
