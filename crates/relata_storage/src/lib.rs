//! Persistence provider contract, relation model, and in-memory store for relata.
//!
//! This crate provides:
//! - [`Persistence`] - The contract the engine requires from a row store
//! - [`Row`] - One underlying row plus staged association changes
//! - [`Relation`] - A relational query fragment (predicates, joins, order, eager loads)
//! - [`ModelSchema`] - Schema reflection: columns and associations per row model
//! - [`MemoryStore`] - Reference provider with atomic writes over persistent tables

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod memory;
mod provider;
mod relation;
mod row;
mod schema;

pub use memory::MemoryStore;
pub use provider::{Persistence, WriteStatus};
pub use relation::{ColumnRef, Direction, IncludeTree, Join, Order, Predicate, Relation};
pub use row::{LinkChange, Row};
pub use schema::{
    Association, AssociationKind, ColumnSchema, ColumnType, ModelSchema, OnDelete, RowValidator,
    ValidateOn,
};
