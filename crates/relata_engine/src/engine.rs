//! The engine: registry, configuration and store bound together.
//!
//! Operations are split across modules by concern:
//! - [`mutation`](crate::mutation): change state machine, save, remove, field replacement
//! - [`link`](crate::link): relationship link protocol
//! - [`query`](crate::query): filters, sorts, includes, lookups

use std::sync::Arc;

use relata_foundation::{Context, Error, KeyType, Result};
use relata_schema::{Registry, ResourceType};
use relata_storage::{Persistence, Row};

use crate::config::EngineConfig;
use crate::resource::Resource;

/// Resource engine over a persistence store.
#[derive(Debug)]
pub struct Engine<P: Persistence> {
    pub(crate) registry: Arc<Registry>,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) store: P,
}

impl<P: Persistence> Engine<P> {
    /// Creates an engine.
    #[must_use]
    pub fn new(registry: Arc<Registry>, config: Arc<EngineConfig>, store: P) -> Self {
        Self {
            registry,
            config,
            store,
        }
    }

    /// The resource registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &P {
        &self.store
    }

    /// Mutable access to the underlying store.
    pub fn store_mut(&mut self) -> &mut P {
        &mut self.store
    }

    /// Consumes the engine, returning the store.
    #[must_use]
    pub fn into_store(self) -> P {
        self.store
    }

    /// Returns a resource type by type name.
    ///
    /// # Errors
    ///
    /// `UnknownResource` if it is not registered.
    pub fn resource_type(&self, type_name: &str) -> Result<Arc<ResourceType>> {
        self.registry.get(type_name).map(Arc::clone)
    }

    /// Creates an unsaved instance of a resource type.
    ///
    /// # Errors
    ///
    /// `UnknownResource` if the type is not registered or is abstract.
    pub fn new_resource(&self, type_name: &str, context: Context) -> Result<Resource> {
        let resource_type = self.resource_type(type_name)?;
        if resource_type.is_abstract() {
            return Err(Error::unknown_resource(type_name));
        }
        let row = Row::new(resource_type.model());
        Ok(Resource::new(resource_type, row, context))
    }

    /// Wraps an existing row, typed through the registry's model hints.
    ///
    /// # Errors
    ///
    /// `UnknownResource` if no resource type maps the row's model.
    pub fn wrap(&self, row: Row, context: Context) -> Result<Resource> {
        let resource_type = Arc::clone(self.registry.resource_type_for(row.model())?);
        Ok(Resource::new(resource_type, row, context))
    }

    pub(crate) fn key_type_for<'a>(&'a self, resource_type: &'a ResourceType) -> &'a KeyType {
        resource_type
            .key_type()
            .unwrap_or(&self.config.resource_key_type)
    }
}
