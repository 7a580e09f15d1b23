//! Query resolution, resource mutation, and relationship link protocol.
//!
//! This crate provides:
//! - [`Engine`] - Binds a registry, a configuration and a [`Persistence`] store
//! - Mutation: [`Engine::begin_change`], [`Engine::replace_fields`], [`Engine::remove`]
//! - Link protocol: to-many and to-one link operations with optional reflection
//!   onto the inverse relationship
//! - Queries: filter verification and application, sort compilation across
//!   association chains, eager loads, pagination, and key lookups
//!
//! [`Persistence`]: relata_storage::Persistence

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod engine;
pub mod link;
pub mod mutation;
pub mod paginator;
pub mod query;
pub mod resource;

pub use config::{EngineConfig, PaginatorKind};
pub use engine::Engine;
pub use link::LinkOptions;
pub use mutation::{FieldData, ToOneValue};
pub use paginator::{OffsetPaginator, PagedPaginator, Paginator};
pub use query::{Filters, QueryOptions};
pub use relata_schema::SortCriterion;
pub use resource::{Outcome, Resource};
