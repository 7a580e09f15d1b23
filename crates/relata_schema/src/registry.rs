//! Registry of resource types.
//!
//! Holds every declared [`ResourceType`] by type name, the bidirectional
//! model hint table used to type rows, and the named filter strategies.
//! The registry is populated at startup and then shared behind an `Arc`.

use std::collections::BTreeMap;
use std::sync::Arc;

use relata_foundation::{Context, Error, ErrorKind, Result, Value, inflect};
use relata_storage::Relation;
use tracing::debug;

use crate::filter::{ApplyFn, Strategy, VerifyFn};
use crate::relationship::RelationshipDescriptor;
use crate::resource_type::ResourceType;

// =============================================================================
// Registry
// =============================================================================

/// All declared resource types.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    /// Map from type name to resource type.
    types: BTreeMap<String, Arc<ResourceType>>,
    /// Row model to type name.
    model_to_type: BTreeMap<String, String>,
    /// Type name to row model.
    type_to_model: BTreeMap<String, String>,
    /// Named verify strategies.
    verifiers: BTreeMap<String, Strategy<VerifyFn>>,
    /// Named apply strategies.
    appliers: BTreeMap<String, Strategy<ApplyFn>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource type and, unless abstract, its model hint.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDeclaration` if the type name is already taken.
    pub fn register(&mut self, resource: ResourceType) -> Result<()> {
        let type_name = resource.type_name().to_string();
        if self.types.contains_key(&type_name) {
            return Err(Error::new(ErrorKind::InvalidDeclaration(format!(
                "type name `{type_name}` is already registered"
            ))));
        }
        if !resource.is_abstract() {
            self.model_to_type
                .entry(resource.model().to_string())
                .or_insert_with(|| type_name.clone());
            self.type_to_model
                .insert(type_name.clone(), resource.model().to_string());
        }
        debug!(type_name = %type_name, model = resource.model(), "resource registered");
        self.types.insert(type_name, Arc::new(resource));
        Ok(())
    }

    /// Adds a relationship to an already registered type.
    ///
    /// # Errors
    ///
    /// Returns `UnknownResource` for an unregistered type and
    /// `InvalidDeclaration` if the name is reserved or already used.
    pub fn register_relationship(
        &mut self,
        type_name: &str,
        relationship: RelationshipDescriptor,
    ) -> Result<()> {
        let resource = self
            .types
            .get_mut(type_name)
            .ok_or_else(|| Error::unknown_resource(type_name))?;
        Arc::make_mut(resource).add_relationship(relationship)
    }

    /// Maps rows of `model` to the resource `type_name`, overriding the
    /// model's own registration.
    pub fn model_hint(&mut self, model: impl Into<String>, type_name: impl Into<String>) {
        let model = model.into();
        let type_name = type_name.into();
        self.type_to_model
            .entry(type_name.clone())
            .or_insert_with(|| model.clone());
        self.model_to_type.insert(model, type_name);
    }

    /// Returns a resource type by type name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownResource` if no type is registered under the name.
    pub fn get(&self, type_name: &str) -> Result<&Arc<ResourceType>> {
        self.types
            .get(type_name)
            .ok_or_else(|| Error::unknown_resource(type_name))
    }

    /// Returns true if a type is registered under the name.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// All registered type names.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Resolves the resource type for a row model.
    ///
    /// Uses the model hint when there is one, otherwise the resource whose
    /// name is the underscored, unqualified model name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownResource` if neither resolves to a concrete type.
    pub fn resource_type_for(&self, model: &str) -> Result<&Arc<ResourceType>> {
        if let Some(type_name) = self.model_to_type.get(model) {
            return self.get(type_name);
        }
        let name = inflect::underscore(inflect::demodulize(model));
        self.types
            .values()
            .find(|resource| resource.name() == name && !resource.is_abstract())
            .ok_or_else(|| Error::unknown_resource(model))
    }

    /// The row model registered for a type name.
    #[must_use]
    pub fn model_name_for(&self, type_name: &str) -> Option<&str> {
        self.type_to_model.get(type_name).map(String::as_str)
    }

    /// The target resource type of a relationship.
    ///
    /// # Errors
    ///
    /// Returns `UnknownResource` if the target is not registered.
    pub fn target_of(&self, relationship: &RelationshipDescriptor) -> Result<&Arc<ResourceType>> {
        self.get(&relationship.target_type)
    }

    /// The inverse relationship on the target, if declared and present.
    #[must_use]
    pub fn inverse_of(
        &self,
        relationship: &RelationshipDescriptor,
    ) -> Option<(&Arc<ResourceType>, &RelationshipDescriptor)> {
        let inverse_name = relationship.inverse_name.as_deref()?;
        let target = self.types.get(&relationship.target_type)?;
        let inverse = target.relationship(inverse_name)?;
        Some((target, inverse))
    }

    /// Checks that every relationship target is registered.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDeclaration` naming the first dangling relationship.
    pub fn check(&self) -> Result<()> {
        for resource in self.types.values() {
            for relationship in resource.relationships() {
                if relationship.is_polymorphic() {
                    continue;
                }
                if !self.types.contains_key(&relationship.target_type) {
                    return Err(Error::new(ErrorKind::InvalidDeclaration(format!(
                        "{}.{} targets unknown type `{}`",
                        resource.type_name(),
                        relationship.name,
                        relationship.target_type
                    ))));
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Strategies
    // =========================================================================

    /// Registers a verify function under a name.
    pub fn register_verifier<F>(&mut self, name: impl Into<String>, verify: F)
    where
        F: Fn(&[Value], &Context) -> Result<Vec<Value>> + Send + Sync + 'static,
    {
        self.verifiers
            .insert(name.into(), Strategy::Closure(Arc::new(verify)));
    }

    /// Registers an apply function under a name.
    pub fn register_applier<F>(&mut self, name: impl Into<String>, apply: F)
    where
        F: Fn(Relation, &[Value], &Context) -> Result<Relation> + Send + Sync + 'static,
    {
        self.appliers
            .insert(name.into(), Strategy::Closure(Arc::new(apply)));
    }

    /// Runs a verify strategy.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDeclaration` for an unregistered name, or the
    /// strategy's own error.
    pub fn verify_with(
        &self,
        strategy: &Strategy<VerifyFn>,
        values: &[Value],
        context: &Context,
    ) -> Result<Vec<Value>> {
        let verify = Self::resolve(&self.verifiers, strategy)?;
        verify(values, context)
    }

    /// Runs an apply strategy.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDeclaration` for an unregistered name, or the
    /// strategy's own error.
    pub fn apply_with(
        &self,
        strategy: &Strategy<ApplyFn>,
        relation: Relation,
        values: &[Value],
        context: &Context,
    ) -> Result<Relation> {
        let apply = Self::resolve(&self.appliers, strategy)?;
        apply(relation, values, context)
    }

    /// The single dispatch point for strategies.
    fn resolve<'a, F>(named: &'a BTreeMap<String, Strategy<F>>, strategy: &'a Strategy<F>) -> Result<&'a F> {
        let mut current = strategy;
        loop {
            match current {
                Strategy::Closure(f) => return Ok(f),
                Strategy::Named(name) => {
                    current = named.get(name).ok_or_else(|| {
                        Error::new(ErrorKind::InvalidDeclaration(format!(
                            "no strategy registered as `{name}`"
                        )))
                    })?;
                }
            }
        }
    }
}
