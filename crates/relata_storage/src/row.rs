//! Underlying rows.

use std::collections::BTreeMap;

use relata_foundation::Value;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

static NIL: Value = Value::Nil;

/// An association change staged on a row and written by the next save.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LinkChange {
    /// Replace the whole membership with these keys.
    Replace(Vec<Value>),
    /// Add these keys to the current membership.
    Append(Vec<Value>),
}

impl LinkChange {
    /// Keys carried by the change.
    #[must_use]
    pub fn keys(&self) -> &[Value] {
        match self {
            Self::Replace(keys) | Self::Append(keys) => keys,
        }
    }
}

/// One row of an underlying model.
///
/// Column values live in `fields`. Association edits made before the row is
/// saved are kept in `staged`; eager-loaded associations in `loaded`.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Row {
    model: String,
    fields: BTreeMap<String, Value>,
    staged: BTreeMap<String, LinkChange>,
    loaded: BTreeMap<String, Vec<Row>>,
}

impl Row {
    /// Creates an empty row of the given model.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Builder form of [`Row::set`].
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// The concrete model of this row.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns a column value, nil when unset.
    #[must_use]
    pub fn get(&self, column: &str) -> &Value {
        self.fields.get(column).unwrap_or(&NIL)
    }

    /// Returns true if the column has been set (possibly to nil).
    #[must_use]
    pub fn has(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    /// Sets a column value without any domain checks.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(column.into(), value.into());
    }

    /// Iterates columns in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Replaces every column value with those of `other`, keeping the model.
    pub fn replace_fields(&mut self, other: &Row) {
        self.fields.clone_from(&other.fields);
    }

    /// Stages a full membership replacement for an association.
    pub fn stage_replace(&mut self, association: impl Into<String>, keys: Vec<Value>) {
        self.staged
            .insert(association.into(), LinkChange::Replace(keys));
    }

    /// Stages one additional member for an association.
    pub fn stage_append(&mut self, association: impl Into<String>, key: Value) {
        let change = self
            .staged
            .entry(association.into())
            .or_insert_with(|| LinkChange::Append(Vec::new()));
        match change {
            LinkChange::Replace(keys) | LinkChange::Append(keys) => {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
    }

    /// Drops one staged member. Returns false if it was not staged.
    pub fn unstage(&mut self, association: &str, key: &Value) -> bool {
        let Some(change) = self.staged.get_mut(association) else {
            return false;
        };
        let keys = match change {
            LinkChange::Replace(keys) | LinkChange::Append(keys) => keys,
        };
        let before = keys.len();
        keys.retain(|k| k != key);
        before != keys.len()
    }

    /// The staged change for an association, if any.
    #[must_use]
    pub fn staged(&self, association: &str) -> Option<&LinkChange> {
        self.staged.get(association)
    }

    /// Iterates staged changes in association name order.
    pub fn staged_changes(&self) -> impl Iterator<Item = (&str, &LinkChange)> {
        self.staged.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns true if any association change is waiting for a save.
    #[must_use]
    pub fn has_staged(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Removes and returns all staged changes.
    pub fn take_staged(&mut self) -> BTreeMap<String, LinkChange> {
        std::mem::take(&mut self.staged)
    }

    /// Eager-loaded rows for an association, if it was loaded.
    #[must_use]
    pub fn loaded(&self, association: &str) -> Option<&[Row]> {
        self.loaded.get(association).map(Vec::as_slice)
    }

    /// Stores eager-loaded rows for an association.
    pub fn set_loaded(&mut self, association: impl Into<String>, rows: Vec<Row>) {
        self.loaded.insert(association.into(), rows);
    }

    /// Drops every eager-loaded association.
    pub fn clear_loaded(&mut self) {
        self.loaded.clear();
    }

    /// Copy holding only the model and column values.
    #[must_use]
    pub fn detached(&self) -> Row {
        Row {
            model: self.model.clone(),
            fields: self.fields.clone(),
            staged: BTreeMap::new(),
            loaded: BTreeMap::new(),
        }
    }
}
