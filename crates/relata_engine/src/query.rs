//! Query resolution.
//!
//! Turns filter maps, include directives, sort criteria and paginators into
//! a [`Relation`] on the resource's model, runs it against the store and
//! materializes the rows as [`Resource`]s.
//!
//! ```text
//! base scope -> filters -> includes (forced + requested) -> sort -> window
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use relata_foundation::{Context, Error, ErrorKind, Result, Value};
use relata_schema::{RelationshipDescriptor, ResourceType, SortCriterion};
use relata_storage::{ColumnRef, IncludeTree, Join, Persistence, Predicate, Relation, Row};
use tracing::debug;

use crate::engine::Engine;
use crate::paginator::Paginator;
use crate::resource::Resource;

/// Filter values by filter name.
pub type Filters = BTreeMap<String, Vec<Value>>;

/// Everything a query needs besides its filters.
#[derive(Clone, Default)]
pub struct QueryOptions {
    /// Caller context handed to scopes and strategies.
    pub context: Context,
    /// Relationships to eager-load.
    pub includes: Vec<IncludeTree>,
    /// Requested order; the resource's default sort when empty.
    pub sort: Vec<SortCriterion>,
    /// Requested window; the configured default paginator when unset.
    pub paginator: Option<Arc<dyn Paginator>>,
}

impl QueryOptions {
    /// Options carrying only a context.
    #[must_use]
    pub fn new(context: Context) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    /// Adds include directives parsed from `"comments.author,tags"`.
    #[must_use]
    pub fn with_includes(mut self, text: &str) -> Self {
        for tree in IncludeTree::parse_list(text) {
            IncludeTree::merge_into(&mut self.includes, tree);
        }
        self
    }

    /// Sets sort criteria parsed from `"-created,author.name"`.
    #[must_use]
    pub fn with_sort(mut self, text: &str) -> Self {
        self.sort = SortCriterion::parse_list(text);
        self
    }

    /// Sets the paginator.
    #[must_use]
    pub fn with_paginator(mut self, paginator: impl Paginator + 'static) -> Self {
        self.paginator = Some(Arc::new(paginator));
        self
    }
}

impl fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("context", &self.context)
            .field("includes", &self.includes)
            .field("sort", &self.sort)
            .field("paginator", &self.paginator)
            .finish()
    }
}

/// Splits a lone `"a,b"` string into separate values.
fn split_values(values: &[Value]) -> Vec<Value> {
    match values {
        [Value::String(text)] if text.contains(',') => text
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Value::from)
            .collect(),
        _ => values.to_vec(),
    }
}

impl<P: Persistence> Engine<P> {
    // =========================================================================
    // Filters
    // =========================================================================

    /// Checks and normalizes raw filter values.
    ///
    /// # Errors
    ///
    /// `FilterNotAllowed` for names that are not declared filters,
    /// relationships or the type name itself; errors of custom verifiers.
    pub fn verify_filters(&self, type_name: &str, raw: &Filters, context: &Context) -> Result<Filters> {
        let resource_type = self.resource_type(type_name)?;
        let mut verified = Filters::new();

        for (name, values) in raw {
            let values = split_values(values);
            let values = match resource_type.filter(name) {
                Some(filter) => match &filter.verify {
                    Some(strategy) => self.registry.verify_with(strategy, &values, context)?,
                    None => values,
                },
                None if resource_type.relationship(name).is_some()
                    || name == resource_type.type_name() =>
                {
                    values
                }
                None => return Err(Error::new(ErrorKind::FilterNotAllowed(name.clone()))),
            };
            verified.insert(name.clone(), values);
        }

        for filter in resource_type.filters() {
            if let Some(default) = &filter.default {
                verified
                    .entry(filter.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        Ok(verified)
    }

    /// Adds filter predicates to `relation`.
    ///
    /// Returns the relation and the eager loads the predicates depend on.
    /// Relationship and type-name values are compared as keys of the type
    /// they select, so `"1"` matches an integer key.
    ///
    /// # Errors
    ///
    /// Errors of custom apply strategies; `UnknownResource` for relationship
    /// filters whose target is not registered.
    pub fn apply_filters(
        &self,
        resource_type: &ResourceType,
        mut relation: Relation,
        filters: &Filters,
        context: &Context,
    ) -> Result<(Relation, Vec<IncludeTree>)> {
        let mut forced = Vec::new();

        for (name, values) in filters {
            if let Some(relationship) = resource_type.relationship(name) {
                if relationship.is_belongs_to() {
                    let values = match self.registry.target_of(relationship) {
                        Ok(target) => self.coerce_keys(target, values, context),
                        Err(_) => values.clone(),
                    };
                    relation = relation.filter(Predicate::is_in(
                        ColumnRef::root(relationship.foreign_key.clone()),
                        values,
                    ));
                } else {
                    let target = self.registry.target_of(relationship)?;
                    relation = relation.filter(Predicate::is_in(
                        ColumnRef::scoped(relationship.relation_name.clone(), target.primary_key()),
                        self.coerce_keys(target, values, context),
                    ));
                    IncludeTree::merge_into(&mut forced, IncludeTree::new(relationship.name.clone()));
                }
            } else if name == resource_type.type_name() {
                relation = relation.filter(Predicate::is_in(
                    ColumnRef::root(resource_type.primary_key()),
                    self.coerce_keys(resource_type, values, context),
                ));
            } else if let Some(strategy) = resource_type.filter(name).and_then(|f| f.apply.as_ref()) {
                relation = self.registry.apply_with(strategy, relation, values, context)?;
            } else {
                let column = resource_type.column_for(name).unwrap_or(name);
                relation = relation.filter(Predicate::is_in(ColumnRef::root(column), values.clone()));
            }
        }

        Ok((relation, forced))
    }

    // =========================================================================
    // Includes
    // =========================================================================

    /// Resolves include directives to store associations and merges them
    /// into the relation's eager loads.
    ///
    /// # Errors
    ///
    /// `UnknownField` for names that are not relationships.
    pub fn apply_includes(
        &self,
        resource_type: &ResourceType,
        mut relation: Relation,
        trees: &[IncludeTree],
    ) -> Result<Relation> {
        for tree in trees {
            relation = relation.include(self.resolve_include(resource_type, tree)?);
        }
        Ok(relation)
    }

    fn resolve_include(&self, resource_type: &ResourceType, tree: &IncludeTree) -> Result<IncludeTree> {
        let relationship = resource_type
            .relationship(&tree.name)
            .ok_or_else(|| Error::unknown_field(resource_type.type_name(), &tree.name))?;

        let mut resolved = IncludeTree::new(relationship.relation_name.clone());
        if tree.children.is_empty() {
            return Ok(resolved);
        }
        let target = self.registry.target_of(relationship)?;
        for child in &tree.children {
            resolved = resolved.with_child(self.resolve_include(target, child)?);
        }
        Ok(resolved)
    }

    // =========================================================================
    // Sorting
    // =========================================================================

    /// Adds ordering terms for `criteria`, joining associations for dotted
    /// paths.
    ///
    /// # Errors
    ///
    /// `InvalidSortField` for fields that are not sortable and paths that do
    /// not resolve.
    pub fn apply_sort(
        &self,
        resource_type: &ResourceType,
        mut relation: Relation,
        criteria: &[SortCriterion],
    ) -> Result<Relation> {
        for criterion in criteria {
            let column = match criterion.field.rsplit_once('.') {
                Some((path, column)) => {
                    let (joined, scoped) = self.join_sort_path(resource_type, relation, path, column, criterion)?;
                    relation = joined;
                    scoped
                }
                None => {
                    if !resource_type.sortable_fields().contains(&criterion.field) {
                        return Err(invalid_sort(criterion));
                    }
                    let column = resource_type
                        .column_for(&criterion.field)
                        .unwrap_or(&criterion.field);
                    ColumnRef::root(column)
                }
            };
            relation = relation.order(column, criterion.direction);
        }
        Ok(relation)
    }

    /// Left-joins each hop of `path`, aliased by the associations walked so
    /// far: `author.posts` joins `author_sorting` then `author_posts_sorting`.
    fn join_sort_path(
        &self,
        resource_type: &ResourceType,
        mut relation: Relation,
        path: &str,
        column: &str,
        criterion: &SortCriterion,
    ) -> Result<(Relation, ColumnRef)> {
        let mut model = resource_type.model().to_string();
        let mut parent: Option<String> = None;
        let mut prefix = String::new();

        for segment in path.split('.') {
            let association = self
                .store
                .association(&model, segment)
                .filter(|association| !association.target.is_empty())
                .ok_or_else(|| invalid_sort(criterion))?;
            if !prefix.is_empty() {
                prefix.push('_');
            }
            prefix.push_str(&association.name);
            let alias = format!("{prefix}_sorting");
            relation = relation.left_join(Join {
                alias: alias.clone(),
                parent: parent.take(),
                association: association.name.clone(),
            });
            model.clone_from(&association.target);
            parent = Some(alias);
        }

        let known = self
            .store
            .model(&model)
            .is_some_and(|schema| schema.column(column).is_some());
        match parent {
            Some(alias) if known => Ok((relation, ColumnRef::scoped(alias, column))),
            _ => Err(invalid_sort(criterion)),
        }
    }

    // =========================================================================
    // Finders
    // =========================================================================

    /// Finds resources of a type.
    ///
    /// `filters` are expected to have passed [`Engine::verify_filters`].
    ///
    /// # Errors
    ///
    /// Any error of the pipeline stages or the store.
    pub fn find(&self, type_name: &str, filters: &Filters, options: &QueryOptions) -> Result<Vec<Resource>> {
        let resource_type = self.resource_type(type_name)?;
        let base = resource_type.base_relation(&options.context);
        let relation = self.compile(&resource_type, base, filters, options)?;
        let rows = self.store.query(&relation)?;
        debug!(type_name, rows = rows.len(), "find");
        self.materialize(rows, &options.context)
    }

    /// Counts resources matching `filters`, ignoring order and window.
    ///
    /// # Errors
    ///
    /// Any error of the filter stage or the store.
    pub fn count(&self, type_name: &str, filters: &Filters, options: &QueryOptions) -> Result<usize> {
        let resource_type = self.resource_type(type_name)?;
        let base = resource_type.base_relation(&options.context);
        let (relation, forced) = self.apply_filters(&resource_type, base, filters, &options.context)?;
        let relation = self.apply_includes(&resource_type, relation, &forced)?;
        self.store.count(&relation)
    }

    /// Finds one resource by key.
    ///
    /// # Errors
    ///
    /// `InvalidFieldValue` for a malformed key, `RecordNotFound(key)` on a
    /// miss.
    pub fn find_by_key(&self, type_name: &str, key: &Value, context: &Context) -> Result<Resource> {
        self.find_by_key_with(type_name, key, &QueryOptions::new(context.clone()))
    }

    /// [`Engine::find_by_key`] with includes.
    ///
    /// # Errors
    ///
    /// See [`Engine::find_by_key`].
    pub fn find_by_key_with(&self, type_name: &str, key: &Value, options: &QueryOptions) -> Result<Resource> {
        let mut found = self.find_by_keys_with(type_name, std::slice::from_ref(key), options)?;
        found.pop().ok_or_else(|| Error::record_not_found(key.clone()))
    }

    /// Finds resources by key, in the order requested.
    ///
    /// # Errors
    ///
    /// `InvalidFieldValue` for a malformed key, `RecordNotFound` naming the
    /// first key that does not resolve.
    pub fn find_by_keys(&self, type_name: &str, keys: &[Value], context: &Context) -> Result<Vec<Resource>> {
        self.find_by_keys_with(type_name, keys, &QueryOptions::new(context.clone()))
    }

    /// [`Engine::find_by_keys`] with includes.
    ///
    /// # Errors
    ///
    /// See [`Engine::find_by_keys`].
    pub fn find_by_keys_with(
        &self,
        type_name: &str,
        keys: &[Value],
        options: &QueryOptions,
    ) -> Result<Vec<Resource>> {
        let resource_type = self.resource_type(type_name)?;
        let keys = self
            .key_type_for(&resource_type)
            .verify_all(keys, &options.context)?;

        let relation = resource_type
            .base_relation(&options.context)
            .filter(Predicate::is_in(ColumnRef::root(resource_type.primary_key()), keys.clone()));
        let relation = self.apply_includes(&resource_type, relation, &options.includes)?;

        let mut by_key: BTreeMap<Value, Row> = self
            .store
            .query(&relation)?
            .into_iter()
            .map(|row| (row.get(resource_type.primary_key()).clone(), row))
            .collect();

        let mut rows = Vec::with_capacity(keys.len());
        for key in &keys {
            let row = match by_key.remove(key) {
                Some(row) => row,
                None => rows
                    .iter()
                    .find(|row: &&Row| row.get(resource_type.primary_key()) == key)
                    .cloned()
                    .ok_or_else(|| Error::record_not_found(key.clone()))?,
            };
            rows.push(row);
        }
        self.materialize(rows, &options.context)
    }

    /// Finds the members of a to-many relationship.
    ///
    /// # Errors
    ///
    /// `UnknownField` if `relationship` is not a to-many relationship of the
    /// resource, plus any error of [`Engine::find`]'s pipeline.
    pub fn find_related(
        &self,
        resource: &Resource,
        relationship: &str,
        filters: &Filters,
        options: &QueryOptions,
    ) -> Result<Vec<Resource>> {
        let relationship = related(resource, relationship, RelationshipDescriptor::is_to_many)?;
        let target = self.registry.target_of(relationship)?;
        let members = self
            .store
            .association_keys(&resource.row, &relationship.relation_name)?;

        let base = target
            .base_relation(&options.context)
            .filter(Predicate::is_in(ColumnRef::root(target.primary_key()), members));
        let relation = self.compile(target, base, filters, options)?;
        let rows = self.store.query(&relation)?;
        debug!(
            resource = resource.resource_type.type_name(),
            relationship = %relationship.name,
            rows = rows.len(),
            "find related"
        );
        self.materialize(rows, &options.context)
    }

    /// Finds the resource a to-one relationship points at, if any.
    ///
    /// # Errors
    ///
    /// `UnknownField` if `relationship` is not a to-one relationship of the
    /// resource; `UnknownResource` if the related row's model maps to no
    /// resource type.
    pub fn find_related_one(&self, resource: &Resource, relationship: &str) -> Result<Option<Resource>> {
        let relationship = related(resource, relationship, |r| !r.is_to_many())?;
        let row = &resource.row;

        let found = if let Some(type_column) = &relationship.polymorphic_type_column {
            let key = row.get(&relationship.foreign_key);
            match row.get(type_column).as_str() {
                Some(model) if !key.is_nil() => self.store.find(model, key)?,
                _ => None,
            }
        } else {
            let target = self.registry.target_of(relationship)?;
            let key = if relationship.is_belongs_to() {
                row.get(&relationship.foreign_key).clone()
            } else {
                self.store
                    .association_keys(row, &relationship.relation_name)?
                    .into_iter()
                    .next()
                    .unwrap_or_default()
            };
            if key.is_nil() {
                None
            } else {
                self.store.find(target.model(), &key)?
            }
        };

        found
            .map(|row| self.wrap(row, resource.context.clone()))
            .transpose()
    }

    // =========================================================================
    // Keys
    // =========================================================================

    /// Verifies a key against a type's key type.
    ///
    /// # Errors
    ///
    /// `InvalidFieldValue("id", key)` if the key does not fit.
    pub fn verify_key(&self, type_name: &str, key: &Value, context: &Context) -> Result<Value> {
        let resource_type = self.resource_type(type_name)?;
        self.key_type_for(&resource_type).verify(key, context)
    }

    /// Verifies several keys, stopping at the first that does not fit.
    ///
    /// # Errors
    ///
    /// See [`Engine::verify_key`].
    pub fn verify_keys(&self, type_name: &str, keys: &[Value], context: &Context) -> Result<Vec<Value>> {
        let resource_type = self.resource_type(type_name)?;
        self.key_type_for(&resource_type).verify_all(keys, context)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Converts filter values to `resource_type`'s key type where they fit.
    /// Values that do not fit are kept and match nothing.
    fn coerce_keys(&self, resource_type: &ResourceType, values: &[Value], context: &Context) -> Vec<Value> {
        let key_type = self.key_type_for(resource_type);
        values
            .iter()
            .map(|value| key_type.verify(value, context).unwrap_or_else(|_| value.clone()))
            .collect()
    }

    /// Filters, includes, sort and window on top of `base`.
    fn compile(
        &self,
        resource_type: &ResourceType,
        base: Relation,
        filters: &Filters,
        options: &QueryOptions,
    ) -> Result<Relation> {
        let (relation, mut includes) = self.apply_filters(resource_type, base, filters, &options.context)?;
        for tree in &options.includes {
            IncludeTree::merge_into(&mut includes, tree.clone());
        }
        let relation = self.apply_includes(resource_type, relation, &includes)?;

        let sort = if options.sort.is_empty() {
            resource_type.default_sort()
        } else {
            options.sort.clone()
        };
        let relation = self.apply_sort(resource_type, relation, &sort)?;

        Ok(match &options.paginator {
            Some(paginator) => paginator.apply(relation),
            None => match self.config.default_paginator()? {
                Some(paginator) => paginator.apply(relation),
                None => relation,
            },
        })
    }

    fn materialize(&self, rows: Vec<Row>, context: &Context) -> Result<Vec<Resource>> {
        rows.into_iter()
            .map(|row| self.wrap(row, context.clone()))
            .collect()
    }
}

fn related<'a>(
    resource: &'a Resource,
    name: &str,
    accept: impl Fn(&RelationshipDescriptor) -> bool,
) -> Result<&'a RelationshipDescriptor> {
    resource
        .resource_type
        .relationship(name)
        .filter(|relationship| accept(relationship))
        .ok_or_else(|| Error::unknown_field(resource.resource_type.type_name(), name))
}

fn invalid_sort(criterion: &SortCriterion) -> Error {
    Error::new(ErrorKind::InvalidSortField(criterion.field.clone()))
}
