//! relata - Declarative resource-to-relation mapping
//!
//! This crate re-exports all layers of the relata system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: relata_engine: Mutation state machine, link protocol, query resolution
//! Layer 2: relata_schema: Resource types, relationships, filters, hooks, registry
//! Layer 1: relata_storage: Rows, relations, persistence trait, in-memory store
//! Layer 0: relata_foundation: Core types (Value, KeyType, Context, Error)
//! ```

pub use relata_engine as engine;
pub use relata_foundation as foundation;
pub use relata_schema as schema;
pub use relata_storage as storage;
