//! Core values, key types, and the error taxonomy for relata.
//!
//! This crate provides:
//! - [`Value`] - Dynamically typed column and key values
//! - [`KeyType`] - Declared primary key domains and key verification
//! - [`Error`] - The closed error taxonomy surfaced to callers
//! - [`Context`] - Opaque caller context passed through every layer
//! - [`inflect`] - Naming conventions shared by resources and models

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod context;
mod error;
pub mod inflect;
mod key;
mod value;

pub use context::Context;
pub use error::{Error, ErrorContext, ErrorKind, FieldErrors};
pub use key::{KeyType, KeyVerifier};
pub use value::Value;

/// Result type used throughout relata.
pub type Result<T> = std::result::Result<T, Error>;
