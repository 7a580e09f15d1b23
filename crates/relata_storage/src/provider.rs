//! The persistence provider contract.

use relata_foundation::{FieldErrors, Result, Value};

use crate::relation::Relation;
use crate::row::Row;
use crate::schema::{Association, ModelSchema};

/// Result of a write that did not fail outright.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteStatus {
    /// The write is durable.
    Completed,
    /// The write was accepted and will finish later.
    Deferred,
    /// The store refused the write; field errors may be empty.
    Rejected(FieldErrors),
}

/// Storage backend for resource rows.
///
/// Reads take `&self`; writes take `&mut self` and must be atomic: on error
/// or rejection, no part of the write is visible.
pub trait Persistence {
    /// Returns a model schema by name.
    fn model(&self, name: &str) -> Option<&ModelSchema>;

    /// Returns an association of a model by name, ignoring ASCII case.
    fn association(&self, model: &str, name: &str) -> Option<&Association> {
        self.model(model).and_then(|schema| schema.association(name))
    }

    /// Returns true if `model` is `ancestor` or inherits from it.
    fn is_kind_of(&self, model: &str, ancestor: &str) -> bool {
        let mut current = Some(model);
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self.model(name).and_then(|s| s.base.as_deref());
        }
        false
    }

    /// Runs a relation and returns the matching root rows.
    ///
    /// # Errors
    ///
    /// Fails when the relation references unknown models, columns or scopes.
    fn query(&self, relation: &Relation) -> Result<Vec<Row>>;

    /// Counts the rows a relation matches, ignoring its window.
    ///
    /// # Errors
    ///
    /// Same as [`Persistence::query`].
    fn count(&self, relation: &Relation) -> Result<usize>;

    /// Returns true if the relation matches any row.
    ///
    /// # Errors
    ///
    /// Same as [`Persistence::query`].
    fn exists(&self, relation: &Relation) -> Result<bool> {
        self.count(relation).map(|n| n > 0)
    }

    /// Fetches one row by primary key.
    ///
    /// # Errors
    ///
    /// Fails if the model is unknown.
    fn find(&self, model: &str, key: &Value) -> Result<Option<Row>>;

    /// Keys currently related through an association, staged edits included.
    ///
    /// # Errors
    ///
    /// Fails if the association is unknown.
    fn association_keys(&self, row: &Row, association: &str) -> Result<Vec<Value>>;

    /// Assigns a column value after checking it against the column's domain.
    ///
    /// # Errors
    ///
    /// `UnknownField` for undeclared columns, `InvalidFieldValue` for values
    /// outside the column's domain.
    fn assign(&self, row: &mut Row, column: &str, value: Value) -> Result<()>;

    /// Validates a row without writing it.
    fn validate(&self, row: &Row) -> FieldErrors;

    /// Writes a row and its staged association changes.
    ///
    /// Assigns a generated key to new rows and clears the staged changes on
    /// success.
    ///
    /// # Errors
    ///
    /// Fails when a staged change references a missing row.
    fn save(&mut self, row: &mut Row) -> Result<WriteStatus>;

    /// Deletes a row, applying each association's delete policy.
    ///
    /// # Errors
    ///
    /// `RecordLocked` when a restricting dependent exists.
    fn destroy(&mut self, row: &Row) -> Result<WriteStatus>;

    /// Re-reads a row's columns and drops its staged and loaded state.
    ///
    /// # Errors
    ///
    /// `RecordNotFound` if the row no longer exists.
    fn reload(&self, row: &mut Row) -> Result<()>;

    /// Adds `key` to an association. Staged when `row` is not yet saved.
    ///
    /// # Errors
    ///
    /// `RecordNotFound` if the target row does not exist.
    fn append_association(&mut self, row: &mut Row, association: &str, key: &Value) -> Result<()>;

    /// Removes `key` from an association.
    ///
    /// # Errors
    ///
    /// `RecordNotFound` if `key` is not a member, `RecordLocked` if the
    /// dependent cannot be detached.
    fn delete_association(&mut self, row: &mut Row, association: &str, key: &Value) -> Result<()>;
}
