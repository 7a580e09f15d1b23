//! Schema definitions for row models and their associations.
//!
//! A [`ModelSchema`] describes one row model: its table, typed columns and
//! named associations. Stores expose these so the query engine can walk
//! association chains and discover foreign keys without knowing the models.

use std::fmt;
use std::sync::Arc;

use relata_foundation::{FieldErrors, Value, inflect};

use crate::row::Row;

/// Schema definition for a row model.
#[derive(Clone, Debug)]
pub struct ModelSchema {
    /// Model name (e.g. `Post`, `Admin::Post`).
    pub name: String,
    /// Backing table name.
    pub table: String,
    /// Primary key column.
    pub primary_key: String,
    /// Parent model for single-table inheritance.
    pub base: Option<String>,
    /// Column definitions.
    pub columns: Vec<ColumnSchema>,
    /// Association definitions.
    pub associations: Vec<Association>,
    /// Optimistic locking counter column.
    pub locking_column: Option<String>,
    /// Row-level validators.
    pub validators: Vec<RowValidator>,
}

impl ModelSchema {
    /// Creates a model with an integer `id` primary key and a derived table name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let table = inflect::pluralize(&inflect::underscore(&name).replace('/', "_"));
        Self {
            table,
            primary_key: "id".to_string(),
            base: None,
            columns: vec![ColumnSchema::new("id", ColumnType::Int)],
            associations: Vec::new(),
            locking_column: None,
            validators: Vec::new(),
            name,
        }
    }

    /// Overrides the table name.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Overrides the primary key column and its type.
    #[must_use]
    pub fn with_primary_key(mut self, column: impl Into<String>, ty: ColumnType) -> Self {
        let column = column.into();
        self.columns.retain(|c| c.name != self.primary_key);
        self.columns.insert(0, ColumnSchema::new(column.clone(), ty));
        self.primary_key = column;
        self
    }

    /// Stores rows of this model in the table of `base`.
    #[must_use]
    pub fn inherits(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Adds a column.
    #[must_use]
    pub fn with_column(mut self, column: ColumnSchema) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds an association, along with the foreign key columns it owns.
    #[must_use]
    pub fn with_association(mut self, association: Association) -> Self {
        if let AssociationKind::BelongsTo {
            foreign_key,
            type_column,
        } = &association.kind
        {
            if self.column(foreign_key).is_none() {
                self.columns
                    .push(ColumnSchema::new(foreign_key.clone(), ColumnType::Any));
            }
            if let Some(type_column) = type_column {
                if self.column(type_column).is_none() {
                    self.columns
                        .push(ColumnSchema::new(type_column.clone(), ColumnType::String));
                }
            }
        }
        self.associations.push(association);
        self
    }

    /// Enables optimistic locking on an integer counter column.
    #[must_use]
    pub fn with_locking_column(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        if self.column(&column).is_none() {
            self.columns
                .push(ColumnSchema::new(column.clone(), ColumnType::Int));
        }
        self.locking_column = Some(column);
        self
    }

    /// Adds a row-level validator.
    #[must_use]
    pub fn with_validator(mut self, validator: RowValidator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Returns the column schema by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns the association by name, ignoring ASCII case.
    #[must_use]
    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Merges inherited columns, associations and validators from `base`.
    #[must_use]
    pub(crate) fn inherit_from(mut self, base: &ModelSchema) -> Self {
        self.table.clone_from(&base.table);
        self.primary_key.clone_from(&base.primary_key);
        let own_columns = std::mem::take(&mut self.columns);
        self.columns.clone_from(&base.columns);
        for column in own_columns {
            if self.column(&column.name).is_none() {
                self.columns.push(column);
            }
        }
        let own_associations = std::mem::take(&mut self.associations);
        self.associations.clone_from(&base.associations);
        for association in own_associations {
            self.associations.retain(|a| a.name != association.name);
            self.associations.push(association);
        }
        let mut validators = base.validators.clone();
        validators.append(&mut self.validators);
        self.validators = validators;
        if self.locking_column.is_none() {
            self.locking_column.clone_from(&base.locking_column);
        }
        self
    }
}

/// Schema definition for a column.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,
    /// Column type.
    pub ty: ColumnType,
    /// Whether nil is rejected on save.
    pub required: bool,
    /// Closed set of accepted values, if any.
    pub allowed: Option<Vec<Value>>,
}

impl ColumnSchema {
    /// Creates an optional column.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            allowed: None,
        }
    }

    /// Marks the column as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restricts the column to an enumerated set of values.
    #[must_use]
    pub fn with_allowed<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Converts a value into this column's domain.
    ///
    /// Returns `None` when the value has the wrong type or lies outside the
    /// allowed set. Nil is always accepted.
    #[must_use]
    pub fn accept(&self, value: &Value) -> Option<Value> {
        if value.is_nil() {
            return Some(Value::Nil);
        }
        let value = self.ty.coerce(value)?;
        match &self.allowed {
            Some(allowed) if !allowed.contains(&value) => None,
            _ => Some(value),
        }
    }
}

/// Column value types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Any value.
    Any,
    /// Boolean.
    Bool,
    /// 64-bit integer.
    Int,
    /// Float.
    Float,
    /// String.
    String,
    /// List of values.
    List,
}

impl ColumnType {
    /// Converts a value to this type, parsing strings where that is lossless.
    #[must_use]
    pub fn coerce(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Nil) | (Self::Any, _) => Some(value.clone()),
            (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_))
            | (Self::String, Value::String(_))
            | (Self::List, Value::List(_)) => Some(value.clone()),
            (Self::Bool, Value::String(s)) => match s.as_ref() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (Self::Int, Value::String(s)) => s.trim().parse().ok().map(Value::Int),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float, Value::Int(n)) => Some(Value::Float(*n as f64)),
            (Self::Float, Value::String(s)) => s.trim().parse().ok().map(Value::Float),
            (Self::String, Value::Int(n)) => Some(Value::from(n.to_string())),
            _ => None,
        }
    }
}

/// A named association from one model to another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Association {
    /// Association name (e.g. `comments`, `author`).
    pub name: String,
    /// Target model. Ignored for polymorphic belongs-to associations.
    pub target: String,
    /// How the association is stored.
    pub kind: AssociationKind,
    /// What happens to dependents when the owner is destroyed.
    pub on_delete: OnDelete,
}

impl Association {
    /// Foreign key stored on this row: `{name}_id`.
    #[must_use]
    pub fn belongs_to(name: impl Into<String>, target: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: AssociationKind::BelongsTo {
                foreign_key: format!("{name}_id"),
                type_column: None,
            },
            target: target.into(),
            on_delete: OnDelete::Nullify,
            name,
        }
    }

    /// Polymorphic belongs-to: `{name}_id` plus a `{name}_type` column.
    #[must_use]
    pub fn belongs_to_polymorphic(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: AssociationKind::BelongsTo {
                foreign_key: format!("{name}_id"),
                type_column: Some(format!("{name}_type")),
            },
            target: String::new(),
            on_delete: OnDelete::Nullify,
            name,
        }
    }

    /// Single dependent whose `foreign_key` points at this row.
    #[must_use]
    pub fn has_one(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: AssociationKind::HasOne {
                foreign_key: foreign_key.into(),
                type_column: None,
            },
            on_delete: OnDelete::Nullify,
        }
    }

    /// Dependents whose `foreign_key` points at this row.
    #[must_use]
    pub fn has_many(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: AssociationKind::HasMany {
                foreign_key: foreign_key.into(),
                type_column: None,
            },
            on_delete: OnDelete::Nullify,
        }
    }

    /// Membership recorded in a join table.
    #[must_use]
    pub fn many_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        join_table: impl Into<String>,
        source_key: impl Into<String>,
        target_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: AssociationKind::ManyToMany {
                join_table: join_table.into(),
                source_key: source_key.into(),
                target_key: target_key.into(),
            },
            on_delete: OnDelete::Nullify,
        }
    }

    /// Matches dependents through a polymorphic type column on the target.
    #[must_use]
    pub fn as_polymorphic(mut self, column: impl Into<String>) -> Self {
        match &mut self.kind {
            AssociationKind::HasOne { type_column, .. }
            | AssociationKind::HasMany { type_column, .. } => *type_column = Some(column.into()),
            AssociationKind::BelongsTo { .. } | AssociationKind::ManyToMany { .. } => {}
        }
        self
    }

    /// Sets the on-delete behavior.
    #[must_use]
    pub fn with_on_delete(mut self, on_delete: OnDelete) -> Self {
        self.on_delete = on_delete;
        self
    }

    /// Returns true for associations with at most one target.
    #[must_use]
    pub fn is_singular(&self) -> bool {
        matches!(
            self.kind,
            AssociationKind::BelongsTo { .. } | AssociationKind::HasOne { .. }
        )
    }

    /// Foreign key column involved in the association, where there is one.
    #[must_use]
    pub fn foreign_key(&self) -> Option<&str> {
        match &self.kind {
            AssociationKind::BelongsTo { foreign_key, .. }
            | AssociationKind::HasOne { foreign_key, .. }
            | AssociationKind::HasMany { foreign_key, .. } => Some(foreign_key),
            AssociationKind::ManyToMany { .. } => None,
        }
    }
}

/// How an association is stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssociationKind {
    /// Foreign key on this row.
    BelongsTo {
        /// Column holding the target key.
        foreign_key: String,
        /// Column holding the target model, for polymorphic targets.
        type_column: Option<String>,
    },
    /// Foreign key on one target row.
    HasOne {
        /// Column on the target holding this row's key.
        foreign_key: String,
        /// Column on the target holding this row's model, if polymorphic.
        type_column: Option<String>,
    },
    /// Foreign key on many target rows.
    HasMany {
        /// Column on the targets holding this row's key.
        foreign_key: String,
        /// Column on the targets holding this row's model, if polymorphic.
        type_column: Option<String>,
    },
    /// Pairs in a join table.
    ManyToMany {
        /// Join table name.
        join_table: String,
        /// Join column holding this row's key.
        source_key: String,
        /// Join column holding the target's key.
        target_key: String,
    },
}

/// What happens to dependents when their owner is destroyed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OnDelete {
    /// Clear the dependents' foreign keys.
    #[default]
    Nullify,
    /// Refuse to destroy the owner while dependents exist.
    Restrict,
    /// Destroy the dependents as well (cascade).
    Destroy,
}

/// When a row validator runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValidateOn {
    /// Before every save.
    Save,
    /// Before destroy.
    Destroy,
}

/// Check run against a whole row.
type RowCheck = Arc<dyn Fn(&Row) -> FieldErrors + Send + Sync>;

/// A named row-level validation.
#[derive(Clone)]
pub struct RowValidator {
    /// When the validator runs.
    pub on: ValidateOn,
    check: RowCheck,
}

impl RowValidator {
    /// Creates a validator that runs on save.
    #[must_use]
    pub fn on_save<F>(check: F) -> Self
    where
        F: Fn(&Row) -> FieldErrors + Send + Sync + 'static,
    {
        Self {
            on: ValidateOn::Save,
            check: Arc::new(check),
        }
    }

    /// Creates a validator that runs on destroy.
    #[must_use]
    pub fn on_destroy<F>(check: F) -> Self
    where
        F: Fn(&Row) -> FieldErrors + Send + Sync + 'static,
    {
        Self {
            on: ValidateOn::Destroy,
            check: Arc::new(check),
        }
    }

    /// Runs the check.
    #[must_use]
    pub fn check(&self, row: &Row) -> FieldErrors {
        (self.check)(row)
    }
}

impl fmt::Debug for RowValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowValidator")
            .field("on", &self.on)
            .finish_non_exhaustive()
    }
}
