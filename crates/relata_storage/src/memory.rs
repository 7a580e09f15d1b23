//! In-memory persistence provider.
//!
//! Tables are persistent maps, so every write builds the next table set from
//! a cheap clone and swaps it in only when the whole write succeeded.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use im::{HashMap, OrdMap, Vector};
use relata_foundation::{Error, FieldErrors, Result, Value};
use tracing::debug;

use crate::provider::{Persistence, WriteStatus};
use crate::relation::{ColumnRef, Direction, IncludeTree, Predicate, Relation};
use crate::row::{LinkChange, Row};
use crate::schema::{Association, AssociationKind, ModelSchema, OnDelete, ValidateOn};

#[derive(Clone, Debug, Default)]
struct Table {
    rows: OrdMap<Value, Row>,
    sequence: i64,
}

#[derive(Clone, Debug, Default)]
struct State {
    tables: HashMap<String, Table>,
    join_tables: HashMap<String, Vector<Row>>,
}

/// One candidate result: a root row plus the rows its left joins produced.
#[derive(Clone, Debug)]
struct Tuple {
    root: Row,
    joined: BTreeMap<String, Option<Row>>,
}

/// Reference [`Persistence`] implementation backed by persistent tables.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    models: BTreeMap<String, ModelSchema>,
    state: State,
    writes: usize,
    deferred: bool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model. Inheriting models must be defined after their base.
    ///
    /// # Errors
    ///
    /// Returns an error if the base model is not defined.
    pub fn define(&mut self, schema: ModelSchema) -> Result<()> {
        let schema = match &schema.base {
            Some(base) => {
                let parent = self
                    .models
                    .get(base)
                    .ok_or_else(|| Error::internal(format!("base model {base} is not defined")))?;
                schema.inherit_from(parent)
            }
            None => schema,
        };
        debug!(model = %schema.name, table = %schema.table, "model defined");
        self.models.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Acknowledges every write as deferred instead of completed.
    #[must_use]
    pub fn with_deferred_writes(mut self, deferred: bool) -> Self {
        self.deferred = deferred;
        self
    }

    /// Switches deferred acknowledgement on or off.
    pub fn set_deferred_writes(&mut self, deferred: bool) {
        self.deferred = deferred;
    }

    /// Number of committed writes (saves, destroys, direct association edits).
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Stores a row without validation or write accounting, assigning a key
    /// when it has none. Intended for seeding fixtures.
    ///
    /// # Errors
    ///
    /// Fails if the model is unknown or the row is stale.
    pub fn insert(&mut self, row: Row) -> Result<Row> {
        let mut next = self.state.clone();
        let saved = self
            .write_row(&mut next, &row)?
            .ok_or_else(|| Error::internal("stale row"))?;
        self.state = next;
        Ok(saved)
    }

    /// Number of stored rows of a model, including inheriting models.
    #[must_use]
    pub fn len(&self, model: &str) -> usize {
        self.rows_of(&self.state, model).count()
    }

    /// Returns true if no row of the model is stored.
    #[must_use]
    pub fn is_empty(&self, model: &str) -> bool {
        self.len(model) == 0
    }

    fn commit(&mut self, next: State) -> WriteStatus {
        self.state = next;
        self.writes += 1;
        if self.deferred {
            WriteStatus::Deferred
        } else {
            WriteStatus::Completed
        }
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    fn schema(&self, model: &str) -> Result<&ModelSchema> {
        self.models
            .get(model)
            .ok_or_else(|| Error::internal(format!("unknown model {model}")))
    }

    fn primary_key_of(&self, model: &str) -> &str {
        self.models
            .get(model)
            .map_or("id", |schema| schema.primary_key.as_str())
    }

    fn key_of<'r>(&self, row: &'r Row) -> &'r Value {
        row.get(self.primary_key_of(row.model()))
    }

    fn rows_of<'s>(&'s self, state: &'s State, model: &'s str) -> impl Iterator<Item = &'s Row> {
        self.models
            .get(model)
            .and_then(|schema| state.tables.get(&schema.table))
            .into_iter()
            .flat_map(|table| table.rows.values())
            .filter(move |row| self.is_kind_of(row.model(), model))
    }

    fn fetch(&self, state: &State, model: &str, key: &Value) -> Option<Row> {
        let schema = self.models.get(model)?;
        let row = state.tables.get(&schema.table)?.rows.get(key)?;
        self.is_kind_of(row.model(), model).then(|| row.clone())
    }

    fn put_row(&self, state: &mut State, row: Row) -> Result<()> {
        let schema = self.schema(row.model())?;
        let key = row.get(&schema.primary_key).clone();
        let mut table = state.tables.get(&schema.table).cloned().unwrap_or_default();
        table.rows.insert(key, row);
        state.tables.insert(schema.table.clone(), table);
        Ok(())
    }

    fn association_on(&self, model: &str, name: &str) -> Result<&Association> {
        self.association(model, name)
            .ok_or_else(|| Error::unknown_field(model, name))
    }

    /// Rows reachable from `row` through `association`.
    fn related(&self, state: &State, row: &Row, association: &Association) -> Result<Vec<Row>> {
        match &association.kind {
            AssociationKind::BelongsTo {
                foreign_key,
                type_column,
            } => {
                let key = row.get(foreign_key);
                if key.is_nil() {
                    return Ok(Vec::new());
                }
                let target = match type_column {
                    Some(column) => match row.get(column).as_str() {
                        Some(model) => model.to_string(),
                        None => return Ok(Vec::new()),
                    },
                    None => association.target.clone(),
                };
                Ok(self.fetch(state, &target, key).into_iter().collect())
            }
            AssociationKind::HasOne {
                foreign_key,
                type_column,
            }
            | AssociationKind::HasMany {
                foreign_key,
                type_column,
            } => {
                let owner_key = self.key_of(row);
                if owner_key.is_nil() {
                    return Ok(Vec::new());
                }
                let mut rows: Vec<Row> = self
                    .rows_of(state, &association.target)
                    .filter(|candidate| candidate.get(foreign_key) == owner_key)
                    .filter(|candidate| {
                        type_column.as_ref().is_none_or(|column| {
                            candidate
                                .get(column)
                                .as_str()
                                .is_some_and(|model| self.is_kind_of(row.model(), model))
                        })
                    })
                    .cloned()
                    .collect();
                if association.is_singular() {
                    rows.truncate(1);
                }
                Ok(rows)
            }
            AssociationKind::ManyToMany {
                join_table,
                source_key,
                target_key,
            } => {
                let owner_key = self.key_of(row);
                if owner_key.is_nil() {
                    return Ok(Vec::new());
                }
                Ok(state
                    .join_tables
                    .get(join_table)
                    .into_iter()
                    .flat_map(|links| links.iter())
                    .filter(|link| link.get(source_key) == owner_key)
                    .filter_map(|link| self.fetch(state, &association.target, link.get(target_key)))
                    .collect())
            }
        }
    }

    // =========================================================================
    // Query execution
    // =========================================================================

    fn select(&self, relation: &Relation) -> Result<Vec<Tuple>> {
        self.schema(&relation.model)?;
        let state = &self.state;
        let mut tuples: Vec<Tuple> = self
            .rows_of(state, &relation.model)
            .map(|row| Tuple {
                root: row.clone(),
                joined: BTreeMap::new(),
            })
            .collect();

        for join in &relation.joins {
            let mut next = Vec::with_capacity(tuples.len());
            for mut tuple in tuples {
                let parent = match &join.parent {
                    None => Some(tuple.root.clone()),
                    Some(alias) => tuple
                        .joined
                        .get(alias)
                        .ok_or_else(|| missing_scope(alias))?
                        .clone(),
                };
                let related = match parent {
                    Some(parent) => {
                        let association = self.association_on(parent.model(), &join.association)?;
                        self.related(state, &parent, association)?
                    }
                    None => Vec::new(),
                };
                if related.is_empty() {
                    tuple.joined.insert(join.alias.clone(), None);
                    next.push(tuple);
                } else {
                    for row in related {
                        let mut fanned = tuple.clone();
                        fanned.joined.insert(join.alias.clone(), Some(row));
                        next.push(fanned);
                    }
                }
            }
            tuples = next;
        }

        let mut selected = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            if self.matches_all(relation, &tuple)? {
                selected.push(tuple);
            }
        }
        Ok(selected)
    }

    fn scope_rows<'t>(
        &self,
        relation: &Relation,
        tuple: &'t Tuple,
        column: &ColumnRef,
    ) -> Result<Vec<Cow<'t, Row>>> {
        match &column.scope {
            None => Ok(vec![Cow::Borrowed(&tuple.root)]),
            Some(scope) if relation.has_join(scope) => Ok(tuple
                .joined
                .get(scope)
                .and_then(Option::as_ref)
                .map(Cow::Borrowed)
                .into_iter()
                .collect()),
            Some(scope) if relation.includes_association(scope) => {
                let association = self.association_on(tuple.root.model(), scope)?;
                Ok(self
                    .related(&self.state, &tuple.root, association)?
                    .into_iter()
                    .map(Cow::Owned)
                    .collect())
            }
            Some(scope) => Err(missing_scope(scope)),
        }
    }

    fn matches_all(&self, relation: &Relation, tuple: &Tuple) -> Result<bool> {
        for predicate in &relation.predicates {
            if !self.matches(relation, tuple, predicate)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn matches(&self, relation: &Relation, tuple: &Tuple, predicate: &Predicate) -> Result<bool> {
        let column = predicate.column();
        for row in self.scope_rows(relation, tuple, column)? {
            let schema = self.schema(row.model())?;
            let column_schema = schema.column(&column.column).ok_or_else(|| {
                Error::internal(format!("column {column} does not exist on {}", schema.name))
            })?;
            let value = row.get(&column.column);
            if value.is_nil() {
                continue;
            }
            let hit = match predicate {
                Predicate::In { values, .. } => values
                    .iter()
                    .any(|v| column_schema.ty.coerce(v).as_ref() == Some(value)),
                Predicate::NotIn { values, .. } => values
                    .iter()
                    .all(|v| column_schema.ty.coerce(v).as_ref() != Some(value)),
                Predicate::Contains { needle, .. } => value
                    .as_str()
                    .is_some_and(|s| s.to_lowercase().contains(&needle.to_lowercase())),
            };
            if hit {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn sort(&self, relation: &Relation, tuples: Vec<Tuple>) -> Result<Vec<Tuple>> {
        if relation.orders.is_empty() {
            return Ok(tuples);
        }
        let mut keyed = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let mut keys = Vec::with_capacity(relation.orders.len());
            for order in &relation.orders {
                let value = self
                    .scope_rows(relation, &tuple, &order.column)?
                    .first()
                    .map(|row| row.get(&order.column.column).clone())
                    .unwrap_or_default();
                keys.push(value);
            }
            keyed.push((keys, tuple));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            relation
                .orders
                .iter()
                .zip(a.iter().zip(b))
                .map(|(order, (x, y))| match order.direction {
                    Direction::Asc => x.cmp(y),
                    Direction::Desc => y.cmp(x),
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        Ok(keyed.into_iter().map(|(_, tuple)| tuple).collect())
    }

    fn load_includes(&self, row: &mut Row, trees: &[IncludeTree]) -> Result<()> {
        for tree in trees {
            let association = self.association_on(row.model(), &tree.name)?;
            let mut related = self.related(&self.state, row, association)?;
            for child in &mut related {
                self.load_includes(child, &tree.children)?;
            }
            row.set_loaded(tree.name.clone(), related);
        }
        Ok(())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Writes the row's columns into `state`. Returns `None` on a stale lock.
    fn write_row(&self, state: &mut State, row: &Row) -> Result<Option<Row>> {
        let schema = self.schema(row.model())?;
        let pk = &schema.primary_key;
        let mut stored = row.detached();
        let mut table = state.tables.get(&schema.table).cloned().unwrap_or_default();
        let key = row.get(pk).clone();
        match &key {
            Value::Nil => {
                table.sequence += 1;
                stored.set(pk.clone(), Value::Int(table.sequence));
            }
            Value::Int(n) => table.sequence = table.sequence.max(*n),
            _ => {}
        }
        if let Some(lock) = &schema.locking_column {
            if let Some(existing) = table.rows.get(&key) {
                if existing.get(lock) != row.get(lock) {
                    return Ok(None);
                }
            }
            let version = row.get(lock).as_int().unwrap_or(0) + 1;
            stored.set(lock.clone(), Value::Int(version));
        }
        table
            .rows
            .insert(stored.get(pk).clone(), stored.clone());
        state.tables.insert(schema.table.clone(), table);
        Ok(Some(stored))
    }

    fn apply_link(
        &self,
        state: &mut State,
        owner: &Row,
        association: &Association,
        change: &LinkChange,
    ) -> Result<()> {
        let owner_key = self.key_of(owner).clone();
        match &association.kind {
            AssociationKind::BelongsTo { foreign_key, .. } => {
                let mut stored = self
                    .fetch(state, owner.model(), &owner_key)
                    .ok_or_else(|| Error::record_not_found(owner_key.clone()))?;
                stored.set(
                    foreign_key.clone(),
                    change.keys().first().cloned().unwrap_or_default(),
                );
                self.put_row(state, stored)
            }
            AssociationKind::HasOne {
                foreign_key,
                type_column,
            }
            | AssociationKind::HasMany {
                foreign_key,
                type_column,
            } => {
                if let LinkChange::Replace(keys) = change {
                    for current in self.related(state, owner, association)? {
                        if !keys.contains(self.key_of(&current)) {
                            self.detach(state, current, association)?;
                        }
                    }
                }
                for key in change.keys() {
                    let mut target = self
                        .fetch(state, &association.target, key)
                        .ok_or_else(|| Error::record_not_found(key.clone()))?;
                    target.set(foreign_key.clone(), owner_key.clone());
                    if let Some(column) = type_column {
                        target.set(column.clone(), owner.model());
                    }
                    self.put_row(state, target)?;
                }
                Ok(())
            }
            AssociationKind::ManyToMany {
                join_table,
                source_key,
                target_key,
            } => {
                let mut links = state.join_tables.get(join_table).cloned().unwrap_or_default();
                if let LinkChange::Replace(_) = change {
                    links.retain(|link| link.get(source_key) != &owner_key);
                }
                for key in change.keys() {
                    if self.fetch(state, &association.target, key).is_none() {
                        return Err(Error::record_not_found(key.clone()));
                    }
                    let present = links.iter().any(|link| {
                        link.get(source_key) == &owner_key && link.get(target_key) == key
                    });
                    if !present {
                        links.push_back(
                            Row::new(join_table.clone())
                                .with(source_key.clone(), owner_key.clone())
                                .with(target_key.clone(), key.clone()),
                        );
                    }
                }
                state.join_tables.insert(join_table.clone(), links);
                Ok(())
            }
        }
    }

    /// Detaches one dependent according to the association's delete policy.
    fn detach(&self, state: &mut State, mut dependent: Row, association: &Association) -> Result<()> {
        let Some(foreign_key) = association.foreign_key() else {
            return Ok(());
        };
        if association.on_delete == OnDelete::Destroy {
            return match self.destroy_in(state, &dependent)? {
                Some(errors) => Err(Error::validation(errors)),
                None => Ok(()),
            };
        }
        let required = self
            .schema(dependent.model())?
            .column(foreign_key)
            .is_some_and(|c| c.required);
        if required {
            return Err(Error::record_locked(format!(
                "Cannot remove {} from {}: {foreign_key} is required",
                self.key_of(&dependent),
                association.name
            )));
        }
        dependent.set(foreign_key.to_string(), Value::Nil);
        if let AssociationKind::HasOne {
            type_column: Some(column),
            ..
        }
        | AssociationKind::HasMany {
            type_column: Some(column),
            ..
        } = &association.kind
        {
            dependent.set(column.clone(), Value::Nil);
        }
        self.put_row(state, dependent)
    }

    fn unlink(
        state: &mut State,
        join_table: &str,
        source_key: &str,
        owner: &Value,
        target: Option<(&str, &Value)>,
    ) {
        if let Some(links) = state.join_tables.get(join_table) {
            let mut links = links.clone();
            links.retain(|link| {
                let same_owner = link.get(source_key) == owner;
                let same_target = target.is_none_or(|(column, key)| link.get(column) == key);
                !(same_owner && same_target)
            });
            state.join_tables.insert(join_table.to_string(), links);
        }
    }

    /// Removes a row from `state`. Returns validation errors if refused.
    fn destroy_in(&self, state: &mut State, row: &Row) -> Result<Option<FieldErrors>> {
        let schema = self.schema(row.model())?;
        let key = row.get(&schema.primary_key).clone();
        if key.is_nil() || self.fetch(state, row.model(), &key).is_none() {
            return Err(Error::record_not_found(key));
        }
        let mut errors = FieldErrors::new();
        for validator in schema.validators.iter().filter(|v| v.on == ValidateOn::Destroy) {
            errors.merge(validator.check(row));
        }
        if !errors.is_empty() {
            return Ok(Some(errors));
        }

        for association in &schema.associations {
            if matches!(association.kind, AssociationKind::BelongsTo { .. }) {
                continue;
            }
            let dependents = self.related(state, row, association)?;
            if !dependents.is_empty() && association.on_delete == OnDelete::Restrict {
                return Err(Error::record_locked(format!(
                    "Cannot delete record because of dependent {}",
                    association.name
                )));
            }
            match &association.kind {
                AssociationKind::ManyToMany {
                    join_table,
                    source_key,
                    ..
                } => Self::unlink(state, join_table, source_key, &key, None),
                _ => {
                    for dependent in dependents {
                        if association.on_delete == OnDelete::Destroy {
                            if let Some(errors) = self.destroy_in(state, &dependent)? {
                                return Ok(Some(errors));
                            }
                        } else {
                            let foreign_key = association.foreign_key().unwrap_or_default();
                            let mut dependent = dependent;
                            dependent.set(foreign_key.to_string(), Value::Nil);
                            self.put_row(state, dependent)?;
                        }
                    }
                }
            }
        }

        if let Some(table) = state.tables.get(&schema.table) {
            let mut table = table.clone();
            table.rows.remove(&key);
            state.tables.insert(schema.table.clone(), table);
        }
        Ok(None)
    }
}

fn missing_scope(scope: &str) -> Error {
    Error::internal(format!("missing FROM-clause entry for table \"{scope}\""))
}

impl Persistence for MemoryStore {
    fn model(&self, name: &str) -> Option<&ModelSchema> {
        self.models.get(name)
    }

    fn query(&self, relation: &Relation) -> Result<Vec<Row>> {
        let tuples = self.select(relation)?;
        let tuples = self.sort(relation, tuples)?;
        let offset = relation.offset.unwrap_or(0);
        let limit = relation.limit.unwrap_or(usize::MAX);
        let mut rows = Vec::new();
        for tuple in tuples.into_iter().skip(offset).take(limit) {
            let mut row = tuple.root;
            self.load_includes(&mut row, &relation.includes)?;
            rows.push(row);
        }
        debug!(model = %relation.model, rows = rows.len(), "query");
        Ok(rows)
    }

    fn count(&self, relation: &Relation) -> Result<usize> {
        Ok(self.select(relation)?.len())
    }

    fn find(&self, model: &str, key: &Value) -> Result<Option<Row>> {
        self.schema(model)?;
        Ok(self.fetch(&self.state, model, key))
    }

    fn association_keys(&self, row: &Row, association: &str) -> Result<Vec<Value>> {
        let association = self.association_on(row.model(), association)?;
        let mut keys: Vec<Value> = self
            .related(&self.state, row, association)?
            .iter()
            .map(|related| self.key_of(related).clone())
            .collect();
        match row.staged(&association.name) {
            Some(LinkChange::Replace(staged)) => keys.clone_from(staged),
            Some(LinkChange::Append(staged)) => {
                for key in staged {
                    if !keys.contains(key) {
                        keys.push(key.clone());
                    }
                }
            }
            None => {}
        }
        Ok(keys)
    }

    fn assign(&self, row: &mut Row, column: &str, value: Value) -> Result<()> {
        let schema = self.schema(row.model())?;
        let column_schema = schema
            .column(column)
            .ok_or_else(|| Error::unknown_field(row.model(), column))?;
        let accepted = column_schema
            .accept(&value)
            .ok_or_else(|| Error::invalid_field_value(column, value))?;
        row.set(column, accepted);
        Ok(())
    }

    fn validate(&self, row: &Row) -> FieldErrors {
        let mut errors = FieldErrors::new();
        let Some(schema) = self.models.get(row.model()) else {
            return errors.with("base", "is not a known model");
        };
        for column in &schema.columns {
            if column.name == schema.primary_key {
                continue;
            }
            let value = row.get(&column.name);
            if value.is_nil() {
                if column.required {
                    errors.add(column.name.clone(), "can't be blank");
                }
            } else if column.ty.coerce(value).as_ref() != Some(value) {
                errors.add(column.name.clone(), "is invalid");
            } else if column.accept(value).is_none() {
                errors.add(column.name.clone(), "is not included in the list");
            }
        }
        for validator in schema.validators.iter().filter(|v| v.on == ValidateOn::Save) {
            errors.merge(validator.check(row));
        }
        errors
    }

    fn save(&mut self, row: &mut Row) -> Result<WriteStatus> {
        let errors = self.validate(row);
        if !errors.is_empty() {
            debug!(model = row.model(), %errors, "save rejected by validation");
            return Ok(WriteStatus::Rejected(errors));
        }
        let mut next = self.state.clone();
        let Some(stored) = self.write_row(&mut next, row)? else {
            debug!(model = row.model(), key = %self.key_of(row), "stale row");
            return Ok(WriteStatus::Rejected(FieldErrors::new()));
        };
        for (name, change) in row.staged_changes() {
            let association = self.association_on(row.model(), name)?;
            self.apply_link(&mut next, &stored, association, change)?;
        }
        row.take_staged();
        let key = self.key_of(&stored).clone();
        let saved = self.fetch(&next, stored.model(), &key).unwrap_or(stored);
        row.replace_fields(&saved);
        debug!(model = row.model(), %key, "row saved");
        Ok(self.commit(next))
    }

    fn destroy(&mut self, row: &Row) -> Result<WriteStatus> {
        let mut next = self.state.clone();
        if let Some(errors) = self.destroy_in(&mut next, row)? {
            return Ok(WriteStatus::Rejected(errors));
        }
        debug!(model = row.model(), key = %self.key_of(row), "row destroyed");
        Ok(self.commit(next))
    }

    fn reload(&self, row: &mut Row) -> Result<()> {
        let key = self.key_of(row).clone();
        let stored = self
            .fetch(&self.state, row.model(), &key)
            .ok_or_else(|| Error::record_not_found(key))?;
        row.replace_fields(&stored);
        row.take_staged();
        row.clear_loaded();
        Ok(())
    }

    fn append_association(&mut self, row: &mut Row, association: &str, key: &Value) -> Result<()> {
        let association = self.association_on(row.model(), association)?.clone();
        if let AssociationKind::BelongsTo { .. } = association.kind {
            return Err(Error::internal(format!(
                "cannot append to singular association {}",
                association.name
            )));
        }
        if self.key_of(row).is_nil() {
            row.stage_append(association.name, key.clone());
            return Ok(());
        }
        let mut next = self.state.clone();
        self.apply_link(
            &mut next,
            &row.detached(),
            &association,
            &LinkChange::Append(vec![key.clone()]),
        )?;
        row.clear_loaded();
        self.commit(next);
        Ok(())
    }

    fn delete_association(&mut self, row: &mut Row, association: &str, key: &Value) -> Result<()> {
        let association = self.association_on(row.model(), association)?.clone();
        let owner_key = self.key_of(row).clone();
        if owner_key.is_nil() {
            return if row.unstage(&association.name, key) {
                Ok(())
            } else {
                Err(Error::record_not_found(key.clone()))
            };
        }
        let member = self
            .related(&self.state, row, &association)?
            .into_iter()
            .find(|related| self.key_of(related) == key)
            .ok_or_else(|| Error::record_not_found(key.clone()))?;
        let mut next = self.state.clone();
        match &association.kind {
            AssociationKind::BelongsTo { .. } => {
                return Err(Error::internal(format!(
                    "cannot delete from singular association {}",
                    association.name
                )));
            }
            AssociationKind::ManyToMany {
                join_table,
                source_key,
                target_key,
            } => Self::unlink(
                &mut next,
                join_table,
                source_key,
                &owner_key,
                Some((target_key.as_str(), key)),
            ),
            AssociationKind::HasOne { .. } | AssociationKind::HasMany { .. } => {
                self.detach(&mut next, member, &association)?;
            }
        }
        row.clear_loaded();
        self.commit(next);
        Ok(())
    }
}
