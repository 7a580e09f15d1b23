//! Relationship link protocol.
//!
//! Each public operation edits one relationship of one resource. With
//! reflection enabled the edit is carried out from the other side: the
//! related resource updates its inverse relationship and saves itself, and
//! this resource only reloads. The inverse call carries
//! [`LinkOptions::reflected`] so it acts directly instead of reflecting back.
//!
//! Without reflection, edits are staged on the row (or assigned to its
//! foreign key) and written by the single save at the end of the outermost
//! change.

use std::sync::Arc;

use relata_foundation::{inflect, Error, Result, Value};
use relata_schema::{ChangeKind, RelationshipDescriptor, ResourceType};
use relata_storage::{Persistence, Row};
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::resource::{Outcome, Resource};

/// Per-call options of a link operation.
#[derive(Clone, Debug, Default)]
pub struct LinkOptions {
    /// The row whose edit triggered this call, when it is a reflection.
    pub reflected_source: Option<Row>,
}

impl LinkOptions {
    /// Options marking a call as the reflection of an edit on `source`.
    #[must_use]
    pub fn reflected(source: &Row) -> Self {
        Self {
            reflected_source: Some(source.detached()),
        }
    }

    /// Returns true if this call is a reflection.
    #[must_use]
    pub fn is_reflection(&self) -> bool {
        self.reflected_source.is_some()
    }
}

/// The resolved inverse side of a reflecting edit.
struct Inverse {
    target: Arc<ResourceType>,
    relationship: RelationshipDescriptor,
}

impl<P: Persistence> Engine<P> {
    // =========================================================================
    // Public operations
    // =========================================================================

    /// Adds members to a to-many relationship.
    ///
    /// # Errors
    ///
    /// `HasManyRelationExists` if a key is already a member (nothing is
    /// changed), `RecordNotFound` if a key does not resolve.
    pub fn create_to_many_links(
        &mut self,
        resource: &mut Resource,
        relationship: &str,
        keys: Vec<Value>,
    ) -> Result<Outcome> {
        self.create_to_many_links_with(resource, relationship, keys, LinkOptions::default())
    }

    /// [`Engine::create_to_many_links`] with explicit options.
    ///
    /// # Errors
    ///
    /// See [`Engine::create_to_many_links`].
    pub fn create_to_many_links_with(
        &mut self,
        resource: &mut Resource,
        relationship: &str,
        keys: Vec<Value>,
        options: LinkOptions,
    ) -> Result<Outcome> {
        let relationship = self.to_many_relationship(resource, relationship)?;
        self.begin_change(resource, ChangeKind::CreateToManyLink, |engine, resource| {
            engine.create_to_many(resource, &relationship, &keys, &options)
        })
    }

    /// Replaces the full membership of a to-many relationship.
    ///
    /// # Errors
    ///
    /// `RecordNotFound` if a key does not resolve.
    pub fn replace_to_many_links(
        &mut self,
        resource: &mut Resource,
        relationship: &str,
        keys: Vec<Value>,
    ) -> Result<Outcome> {
        self.replace_to_many_links_with(resource, relationship, keys, LinkOptions::default())
    }

    /// [`Engine::replace_to_many_links`] with explicit options.
    ///
    /// # Errors
    ///
    /// See [`Engine::replace_to_many_links`].
    pub fn replace_to_many_links_with(
        &mut self,
        resource: &mut Resource,
        relationship: &str,
        keys: Vec<Value>,
        options: LinkOptions,
    ) -> Result<Outcome> {
        let relationship = self.to_many_relationship(resource, relationship)?;
        self.begin_change(resource, ChangeKind::ReplaceToManyLinks, |engine, resource| {
            engine.replace_to_many(resource, &relationship, &keys, &options)
        })
    }

    /// Points a to-one relationship at `key`.
    ///
    /// # Errors
    ///
    /// `InvalidFieldValue` if the key does not fit the target's key type.
    pub fn replace_to_one_link(
        &mut self,
        resource: &mut Resource,
        relationship: &str,
        key: Value,
    ) -> Result<Outcome> {
        self.replace_to_one_link_with(resource, relationship, key, LinkOptions::default())
    }

    /// [`Engine::replace_to_one_link`] with explicit options.
    ///
    /// # Errors
    ///
    /// See [`Engine::replace_to_one_link`].
    pub fn replace_to_one_link_with(
        &mut self,
        resource: &mut Resource,
        relationship: &str,
        key: Value,
        options: LinkOptions,
    ) -> Result<Outcome> {
        let relationship = self.to_one_relationship(resource, relationship)?;
        self.begin_change(resource, ChangeKind::ReplaceToOneLink, |engine, resource| {
            engine.replace_to_one(resource, &relationship, key, &options)
        })
    }

    /// Points a polymorphic to-one relationship at `key` of type `type_name`.
    ///
    /// # Errors
    ///
    /// `UnknownField` if the relationship is not polymorphic.
    pub fn replace_polymorphic_to_one_link(
        &mut self,
        resource: &mut Resource,
        relationship: &str,
        key: Value,
        type_name: &str,
    ) -> Result<Outcome> {
        self.replace_polymorphic_to_one_link_with(
            resource,
            relationship,
            key,
            type_name,
            LinkOptions::default(),
        )
    }

    /// [`Engine::replace_polymorphic_to_one_link`] with explicit options.
    ///
    /// # Errors
    ///
    /// See [`Engine::replace_polymorphic_to_one_link`].
    pub fn replace_polymorphic_to_one_link_with(
        &mut self,
        resource: &mut Resource,
        relationship: &str,
        key: Value,
        type_name: &str,
        options: LinkOptions,
    ) -> Result<Outcome> {
        let relationship = self.to_one_relationship(resource, relationship)?;
        if !relationship.is_polymorphic() {
            return Err(Error::unknown_field(
                resource.resource_type.type_name(),
                relationship.name,
            ));
        }
        self.begin_change(
            resource,
            ChangeKind::ReplacePolymorphicToOneLink,
            |engine, resource| engine.replace_polymorphic_to_one(resource, &relationship, key, type_name, &options),
        )
    }

    /// Removes one member from a to-many relationship.
    ///
    /// # Errors
    ///
    /// `RecordNotFound` if the key is not a member, `RecordLocked` if the
    /// store restricts the removal.
    pub fn remove_to_many_link(
        &mut self,
        resource: &mut Resource,
        relationship: &str,
        key: Value,
    ) -> Result<Outcome> {
        self.remove_to_many_link_with(resource, relationship, key, LinkOptions::default())
    }

    /// [`Engine::remove_to_many_link`] with explicit options.
    ///
    /// # Errors
    ///
    /// See [`Engine::remove_to_many_link`].
    pub fn remove_to_many_link_with(
        &mut self,
        resource: &mut Resource,
        relationship: &str,
        key: Value,
        options: LinkOptions,
    ) -> Result<Outcome> {
        let relationship = self.to_many_relationship(resource, relationship)?;
        self.begin_change(resource, ChangeKind::RemoveToManyLink, |engine, resource| {
            engine.remove_to_many(resource, &relationship, &key, &options)
        })
    }

    /// Clears a to-one relationship.
    ///
    /// # Errors
    ///
    /// `UnknownField` for an unknown relationship.
    pub fn remove_to_one_link(&mut self, resource: &mut Resource, relationship: &str) -> Result<Outcome> {
        self.remove_to_one_link_with(resource, relationship, LinkOptions::default())
    }

    /// [`Engine::remove_to_one_link`] with explicit options.
    ///
    /// # Errors
    ///
    /// See [`Engine::remove_to_one_link`].
    pub fn remove_to_one_link_with(
        &mut self,
        resource: &mut Resource,
        relationship: &str,
        options: LinkOptions,
    ) -> Result<Outcome> {
        let relationship = self.to_one_relationship(resource, relationship)?;
        self.begin_change(resource, ChangeKind::RemoveToOneLink, |engine, resource| {
            engine.remove_to_one(resource, &relationship, &options)
        })
    }

    // =========================================================================
    // Reflection
    // =========================================================================

    fn should_reflect(
        &self,
        resource: &Resource,
        relationship: &RelationshipDescriptor,
        options: &LinkOptions,
    ) -> Option<Inverse> {
        if !relationship.reflect
            || !self.config.use_relationship_reflection
            || options.is_reflection()
            || resource.is_new()
        {
            return None;
        }
        match self.registry.inverse_of(relationship) {
            Some((target, inverse)) => Some(Inverse {
                target: Arc::clone(target),
                relationship: inverse.clone(),
            }),
            None => {
                warn!(
                    resource = resource.resource_type.type_name(),
                    relationship = %relationship.name,
                    inverse = ?relationship.inverse_name,
                    "inverse relationship not found, editing directly"
                );
                None
            }
        }
    }

    /// Converts caller keys to the target type's key type.
    fn verify_target_keys(
        &self,
        resource: &Resource,
        relationship: &RelationshipDescriptor,
        keys: &[Value],
    ) -> Result<Vec<Value>> {
        let target = self.registry.target_of(relationship)?;
        self.key_type_for(target).verify_all(keys, &resource.context)
    }

    // =========================================================================
    // Bodies
    // =========================================================================

    fn create_to_many(
        &mut self,
        resource: &mut Resource,
        relationship: &RelationshipDescriptor,
        keys: &[Value],
        options: &LinkOptions,
    ) -> Result<Outcome> {
        let keys = &self.verify_target_keys(resource, relationship, keys)?;
        let current = self
            .store
            .association_keys(&resource.row, &relationship.relation_name)?;
        if let Some(existing) = keys.iter().find(|key| current.contains(key)) {
            return Err(Error::has_many_relation_exists(existing.clone()));
        }

        if options.is_reflection() {
            for key in keys {
                self.store
                    .append_association(&mut resource.row, &relationship.relation_name, key)?;
            }
            return Ok(Outcome::Completed);
        }

        let targets = self.find_by_keys(&relationship.target_type, keys, &resource.context)?;
        match self.should_reflect(resource, relationship, options) {
            Some(inverse) => {
                let reflected = LinkOptions::reflected(&resource.row);
                let source_key = resource.id().clone();
                let mut outcome = Outcome::Completed;
                for target in targets {
                    let mut target = Resource::new(
                        Arc::clone(&inverse.target),
                        target.into_row(),
                        resource.context.clone(),
                    );
                    let linked = self.link_inverse(
                        &mut target,
                        &inverse.relationship,
                        source_key.clone(),
                        resource.resource_type.type_name(),
                        reflected.clone(),
                    )?;
                    outcome = outcome.and(linked);
                }
                resource.reload_needed = true;
                Ok(outcome)
            }
            None => {
                for target in &targets {
                    resource
                        .row
                        .stage_append(relationship.relation_name.clone(), target.id().clone());
                }
                resource.save_needed = true;
                Ok(Outcome::Completed)
            }
        }
    }

    fn replace_to_many(
        &mut self,
        resource: &mut Resource,
        relationship: &RelationshipDescriptor,
        keys: &[Value],
        options: &LinkOptions,
    ) -> Result<Outcome> {
        let keys = self.verify_target_keys(resource, relationship, keys)?;
        if self.should_reflect(resource, relationship, options).is_none() {
            resource.row.stage_replace(relationship.relation_name.clone(), keys);
            resource.save_needed = true;
            return Ok(Outcome::Completed);
        }

        let current = self
            .store
            .association_keys(&resource.row, &relationship.relation_name)?;
        let to_delete: Vec<Value> = current.iter().filter(|k| !keys.contains(k)).cloned().collect();
        let to_add: Vec<Value> = keys.iter().filter(|k| !current.contains(k)).cloned().collect();
        debug!(
            resource = resource.resource_type.type_name(),
            relationship = %relationship.name,
            removed = to_delete.len(),
            added = to_add.len(),
            "replacing to-many links"
        );

        let direct = LinkOptions::reflected(&resource.row);
        let mut outcome = Outcome::Completed;
        for key in &to_delete {
            outcome = outcome.and(self.remove_to_many(resource, relationship, key, &direct)?);
        }
        if !to_add.is_empty() {
            outcome = outcome.and(self.create_to_many(resource, relationship, &to_add, &LinkOptions::default())?);
        }
        resource.reload_needed = true;
        Ok(outcome)
    }

    fn replace_to_one(
        &mut self,
        resource: &mut Resource,
        relationship: &RelationshipDescriptor,
        key: Value,
        _options: &LinkOptions,
    ) -> Result<Outcome> {
        let target = self.registry.target_of(relationship)?;
        let key = self.key_type_for(target).verify(&key, &resource.context)?;
        if relationship.is_belongs_to() {
            self.store
                .assign(&mut resource.row, &relationship.foreign_key, key)?;
        } else {
            let keys = if key.is_nil() { Vec::new() } else { vec![key] };
            resource.row.stage_replace(relationship.relation_name.clone(), keys);
        }
        resource.save_needed = true;
        Ok(Outcome::Completed)
    }

    fn replace_polymorphic_to_one(
        &mut self,
        resource: &mut Resource,
        relationship: &RelationshipDescriptor,
        key: Value,
        type_name: &str,
        _options: &LinkOptions,
    ) -> Result<Outcome> {
        let model = self
            .registry
            .model_name_for(type_name)
            .map_or_else(|| inflect::classify(type_name), str::to_string);
        self.store
            .assign(&mut resource.row, &relationship.foreign_key, key)?;
        if let Some(column) = &relationship.polymorphic_type_column {
            self.store
                .assign(&mut resource.row, column, Value::from(model))?;
        }
        resource.save_needed = true;
        Ok(Outcome::Completed)
    }

    fn remove_to_many(
        &mut self,
        resource: &mut Resource,
        relationship: &RelationshipDescriptor,
        key: &Value,
        options: &LinkOptions,
    ) -> Result<Outcome> {
        let target = self.registry.target_of(relationship)?;
        let key = &self.key_type_for(target).verify(key, &resource.context)?;
        match self.should_reflect(resource, relationship, options) {
            Some(inverse) => {
                let target = self.find_by_key(&relationship.target_type, key, &resource.context)?;
                let mut target = Resource::new(
                    Arc::clone(&inverse.target),
                    target.into_row(),
                    resource.context.clone(),
                );
                let reflected = LinkOptions::reflected(&resource.row);
                let outcome = if inverse.relationship.is_to_many() {
                    self.remove_to_many_link_with(
                        &mut target,
                        &inverse.relationship.name,
                        resource.id().clone(),
                        reflected,
                    )?
                } else {
                    self.remove_to_one_link_with(&mut target, &inverse.relationship.name, reflected)?
                };
                resource.reload_needed = true;
                Ok(outcome)
            }
            None => {
                self.store
                    .delete_association(&mut resource.row, &relationship.relation_name, key)?;
                Ok(Outcome::Completed)
            }
        }
    }

    fn remove_to_one(
        &mut self,
        resource: &mut Resource,
        relationship: &RelationshipDescriptor,
        _options: &LinkOptions,
    ) -> Result<Outcome> {
        if relationship.is_belongs_to() {
            resource.row.set(relationship.foreign_key.clone(), Value::Nil);
            if let Some(column) = &relationship.polymorphic_type_column {
                resource.row.set(column.clone(), Value::Nil);
            }
        } else {
            resource
                .row
                .stage_replace(relationship.relation_name.clone(), Vec::new());
        }
        resource.save_needed = true;
        Ok(Outcome::Completed)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Links `target` back to the source through the inverse relationship.
    fn link_inverse(
        &mut self,
        target: &mut Resource,
        inverse: &RelationshipDescriptor,
        source_key: Value,
        source_type: &str,
        options: LinkOptions,
    ) -> Result<Outcome> {
        if inverse.is_to_many() {
            self.create_to_many_links_with(target, &inverse.name, vec![source_key], options)
        } else if inverse.is_polymorphic() {
            self.replace_polymorphic_to_one_link_with(target, &inverse.name, source_key, source_type, options)
        } else {
            self.replace_to_one_link_with(target, &inverse.name, source_key, options)
        }
    }

    fn relationship_of(&self, resource: &Resource, name: &str) -> Result<RelationshipDescriptor> {
        resource
            .resource_type
            .relationship(name)
            .cloned()
            .ok_or_else(|| Error::unknown_field(resource.resource_type.type_name(), name))
    }

    fn to_many_relationship(&self, resource: &Resource, name: &str) -> Result<RelationshipDescriptor> {
        let relationship = self.relationship_of(resource, name)?;
        if !relationship.is_to_many() {
            return Err(Error::internal(format!(
                "{}.{name} is not a to-many relationship",
                resource.resource_type.type_name()
            )));
        }
        Ok(relationship)
    }

    fn to_one_relationship(&self, resource: &Resource, name: &str) -> Result<RelationshipDescriptor> {
        let relationship = self.relationship_of(resource, name)?;
        if relationship.is_to_many() {
            return Err(Error::internal(format!(
                "{}.{name} is not a to-one relationship",
                resource.resource_type.type_name()
            )));
        }
        Ok(relationship)
    }
}
