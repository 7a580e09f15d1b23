//! Error types for relata.
//!
//! Uses `thiserror` for ergonomic error definition with rich context. The
//! first six [`ErrorKind`] variants form the closed taxonomy reported to
//! callers of the mutation and query engines; the remaining variants flag
//! schema misuse by the embedding program.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// The main error type for relata operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates a validation error carrying field-level messages.
    #[must_use]
    pub fn validation(errors: FieldErrors) -> Self {
        Self::new(ErrorKind::ValidationErrors(errors))
    }

    /// Creates a save failure with no field-level cause.
    #[must_use]
    pub fn save_failed() -> Self {
        Self::new(ErrorKind::SaveFailed)
    }

    /// Creates a record not found error.
    #[must_use]
    pub fn record_not_found(key: impl Into<Value>) -> Self {
        Self::new(ErrorKind::RecordNotFound(key.into()))
    }

    /// Creates a record locked error.
    #[must_use]
    pub fn record_locked(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::RecordLocked(detail.into()))
    }

    /// Creates a duplicate to-many membership error.
    #[must_use]
    pub fn has_many_relation_exists(id: impl Into<Value>) -> Self {
        Self::new(ErrorKind::HasManyRelationExists(id.into()))
    }

    /// Creates an invalid field value error.
    #[must_use]
    pub fn invalid_field_value(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(ErrorKind::InvalidFieldValue {
            field: field.into(),
            value: value.into(),
        })
    }

    /// Creates an unknown resource type error.
    #[must_use]
    pub fn unknown_resource(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownResource(name.into()))
    }

    /// Creates an unknown field error.
    #[must_use]
    pub fn unknown_field(resource: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownField {
            resource: resource.into(),
            field: field.into(),
        })
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }

    /// Returns true for the errors a caller can fix by changing its input.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::ValidationErrors(_)
                | ErrorKind::RecordNotFound(_)
                | ErrorKind::HasManyRelationExists(_)
                | ErrorKind::InvalidFieldValue { .. }
                | ErrorKind::FilterNotAllowed(_)
                | ErrorKind::InvalidSortField(_)
        )
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// The row failed validation.
    #[error("validation failed: {0}")]
    ValidationErrors(FieldErrors),

    /// Persistence refused the write without a field-level cause.
    #[error("save failed")]
    SaveFailed,

    /// Requested identifier could not be resolved.
    #[error("record not found: {0}")]
    RecordNotFound(Value),

    /// Removal blocked by a referential restriction.
    #[error("record locked: {0}")]
    RecordLocked(String),

    /// The identifier is already a member of the to-many relationship.
    #[error("relation exists: {0}")]
    HasManyRelationExists(Value),

    /// Value rejected by a field's accepted domain.
    #[error("invalid value for {field}: {value}")]
    InvalidFieldValue {
        /// The field that rejected the value.
        field: String,
        /// The rejected value.
        value: Value,
    },

    /// No resource type is registered under this name.
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    /// The resource declares no attribute or relationship with this name.
    #[error("unknown field {field} on {resource}")]
    UnknownField {
        /// The resource type name.
        resource: String,
        /// The field name that was not found.
        field: String,
    },

    /// The filter is not declared on the resource.
    #[error("filter not allowed: {0}")]
    FilterNotAllowed(String),

    /// The sort field or association path cannot be resolved.
    #[error("invalid sort field: {0}")]
    InvalidSortField(String),

    /// A resource declaration broke a schema invariant.
    #[error("invalid declaration: {0}")]
    InvalidDeclaration(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Field-level validation messages, keyed by field name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Creates an empty error set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message against a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Builder form of [`FieldErrors::add`].
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.add(field, message);
        self
    }

    /// Merges another error set into this one.
    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    /// Returns true if no field has messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of fields with messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Messages for one field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Iterates fields and their messages in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, messages)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{field} {}", messages.join(", "))?;
        }
        Ok(())
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Resource type involved.
    pub resource: Option<String>,
    /// Operation frames, outermost first.
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the resource type.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Adds an operation frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(resource) = &self.resource {
            write!(f, "on {resource}")?;
        }
        if !self.stack.is_empty() {
            writeln!(f)?;
            for frame in &self.stack {
                writeln!(f, "  in {frame}")?;
            }
        }
        Ok(())
    }
}
