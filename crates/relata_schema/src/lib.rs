//! Declarative resource metamodel for relata.
//!
//! This crate provides:
//! - [`ResourceType`] - One declared resource: attributes, relationships, filters, hooks
//! - [`RelationshipDescriptor`] - A declared relationship and its naming defaults
//! - [`FilterDef`] and [`Strategy`] - Allowed filters with custom verify/apply strategies
//! - [`Callbacks`] - Before/after lifecycle hooks per [`ChangeKind`]
//! - [`Registry`] - All resource types, model hints, and named strategies

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod attribute;
mod callbacks;
mod filter;
mod registry;
mod relationship;
mod resource_type;

pub use attribute::AttributeDef;
pub use callbacks::{Callbacks, ChangeKind, Hook};
pub use filter::{ApplyFn, FilterDef, Strategy, VerifyFn};
pub use registry::Registry;
pub use relationship::{RelationshipDescriptor, RelationshipKind};
pub use resource_type::{
    LinksHook, MetaHook, RESERVED_FIELDS, ResourceDeclaration, ResourceType, ScopeHook,
    SortCriterion,
};
