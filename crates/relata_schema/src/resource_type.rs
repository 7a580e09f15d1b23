//! Resource type declarations.
//!
//! A [`ResourceType`] is built once through [`ResourceType::declare`] and is
//! immutable afterwards, apart from relationships added through the
//! [`Registry`](crate::Registry) while it is still exclusively owned.
//!
//! ```text
//! ResourceType::declare("post")
//!     .attributes(["title", "body"])
//!     .relationship(RelationshipDescriptor::to_one("author").with_target("people"))
//!     .relationship(RelationshipDescriptor::to_many("comments"))
//!     .filter(FilterDef::new("title"))
//!     .build()?
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use relata_foundation::{Context, Error, ErrorKind, KeyType, Result, Value, inflect};
use relata_storage::{Direction, Relation, Row};

use crate::attribute::AttributeDef;
use crate::callbacks::{Callbacks, ChangeKind};
use crate::filter::FilterDef;
use crate::relationship::RelationshipDescriptor;

/// Field names no attribute or relationship may use.
pub const RESERVED_FIELDS: [&str; 6] = ["id", "ids", "type", "types", "hrefs", "links"];

/// Narrows the starting relation of every query on a resource.
pub type ScopeHook = Arc<dyn Fn(Relation, &Context) -> Relation + Send + Sync>;

/// Produces per-row metadata for serializers.
pub type MetaHook = Arc<dyn Fn(&Row, &Context) -> BTreeMap<String, Value> + Send + Sync>;

/// Produces per-row custom links for serializers.
pub type LinksHook = Arc<dyn Fn(&Row, &Context) -> BTreeMap<String, Value> + Send + Sync>;

// =============================================================================
// SortCriterion
// =============================================================================

/// One sort term: a field name or dotted association path, and a direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortCriterion {
    /// Field name or dotted path such as `author.name`.
    pub field: String,
    /// Sort direction.
    pub direction: Direction,
}

impl SortCriterion {
    /// Ascending sort on a field.
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    /// Descending sort on a field.
    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }

    /// Parses `"-created,author.name"`; a leading `-` means descending.
    #[must_use]
    pub fn parse_list(text: &str) -> Vec<Self> {
        text.split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(|term| match term.strip_prefix('-') {
                Some(field) => Self::desc(field),
                None => Self::asc(term.trim_start_matches('+')),
            })
            .collect()
    }
}

// =============================================================================
// ResourceType
// =============================================================================

/// A declared resource.
#[derive(Clone)]
pub struct ResourceType {
    name: String,
    type_name: String,
    model: String,
    attributes: BTreeMap<String, AttributeDef>,
    relationships: BTreeMap<String, RelationshipDescriptor>,
    primary_key: String,
    key_type: Option<KeyType>,
    filters: BTreeMap<String, FilterDef>,
    is_abstract: bool,
    immutable: bool,
    default_sort: Vec<SortCriterion>,
    base_scope: Option<ScopeHook>,
    meta: Option<MetaHook>,
    custom_links: Option<LinksHook>,
    callbacks: Callbacks,
}

impl ResourceType {
    /// Starts declaring a resource named `name` (singular, e.g. `post`).
    #[must_use]
    pub fn declare(name: impl Into<String>) -> ResourceDeclaration {
        let name = name.into();
        ResourceDeclaration {
            resource: Self {
                type_name: inflect::pluralize(&name),
                model: inflect::camelize(&name),
                attributes: BTreeMap::new(),
                relationships: BTreeMap::new(),
                primary_key: "id".to_string(),
                key_type: None,
                filters: BTreeMap::new(),
                is_abstract: false,
                immutable: false,
                default_sort: Vec::new(),
                base_scope: None,
                meta: None,
                custom_links: None,
                callbacks: Callbacks::new(),
                name,
            },
            problems: Vec::new(),
        }
    }

    /// Singular resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Externally visible type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Underlying row model.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Primary key column.
    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Declared key type, if any.
    #[must_use]
    pub fn key_type(&self) -> Option<&KeyType> {
        self.key_type.as_ref()
    }

    /// Returns true for abstract resources.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Returns true for immutable resources.
    #[must_use]
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    /// Attributes in name order.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDef> {
        self.attributes.values()
    }

    /// Returns an attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.get(name)
    }

    /// Relationships in name order.
    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipDescriptor> {
        self.relationships.values()
    }

    /// Returns a relationship by name.
    #[must_use]
    pub fn relationship(&self, name: &str) -> Option<&RelationshipDescriptor> {
        self.relationships.get(name)
    }

    /// Declared filters in name order.
    pub fn filters(&self) -> impl Iterator<Item = &FilterDef> {
        self.filters.values()
    }

    /// Returns a declared filter by name.
    #[must_use]
    pub fn filter(&self, name: &str) -> Option<&FilterDef> {
        self.filters.get(name)
    }

    /// Sort used when a query supplies none. Primary key ascending by default.
    #[must_use]
    pub fn default_sort(&self) -> Vec<SortCriterion> {
        if self.default_sort.is_empty() {
            vec![SortCriterion::asc(self.primary_key.clone())]
        } else {
            self.default_sort.clone()
        }
    }

    /// Lifecycle hooks.
    #[must_use]
    pub fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    /// The row column backing an attribute, honoring delegates.
    #[must_use]
    pub fn column_for(&self, attribute: &str) -> Option<&str> {
        if attribute == "id" {
            return Some(&self.primary_key);
        }
        self.attributes.get(attribute).map(AttributeDef::column)
    }

    /// The starting relation for every query on this resource.
    #[must_use]
    pub fn base_relation(&self, context: &Context) -> Relation {
        let relation = Relation::new(self.model.clone());
        match &self.base_scope {
            Some(scope) => scope(relation, context),
            None => relation,
        }
    }

    /// Serializer metadata for a row.
    #[must_use]
    pub fn meta(&self, row: &Row, context: &Context) -> BTreeMap<String, Value> {
        self.meta
            .as_ref()
            .map_or_else(BTreeMap::new, |meta| meta(row, context))
    }

    /// Serializer custom links for a row.
    #[must_use]
    pub fn custom_links(&self, row: &Row, context: &Context) -> BTreeMap<String, Value> {
        self.custom_links
            .as_ref()
            .map_or_else(BTreeMap::new, |links| links(row, context))
    }

    /// `id` followed by attribute and relationship names.
    #[must_use]
    pub fn fetchable_fields(&self) -> Vec<String> {
        std::iter::once("id".to_string())
            .chain(self.attributes.keys().cloned())
            .chain(self.relationships.keys().cloned())
            .collect()
    }

    /// Attribute and relationship names; empty for immutable resources.
    #[must_use]
    pub fn updatable_fields(&self) -> Vec<String> {
        if self.immutable {
            return Vec::new();
        }
        self.attributes
            .keys()
            .chain(self.relationships.keys())
            .cloned()
            .collect()
    }

    /// Attribute and relationship names; empty for immutable resources.
    #[must_use]
    pub fn creatable_fields(&self) -> Vec<String> {
        self.updatable_fields()
    }

    /// `id`, the primary key column when it is not `id`, then attribute
    /// names.
    #[must_use]
    pub fn sortable_fields(&self) -> Vec<String> {
        std::iter::once("id".to_string())
            .chain((self.primary_key != "id").then(|| self.primary_key.clone()))
            .chain(self.attributes.keys().cloned())
            .collect()
    }

    /// Adds a relationship after declaration.
    pub(crate) fn add_relationship(&mut self, mut relationship: RelationshipDescriptor) -> Result<()> {
        if let Some(problem) = self.name_problem(&relationship.name, false) {
            return Err(Error::new(ErrorKind::InvalidDeclaration(problem)));
        }
        relationship.source_type.clone_from(&self.type_name);
        self.relationships
            .insert(relationship.name.clone(), relationship);
        Ok(())
    }

    fn name_problem(&self, field: &str, attribute: bool) -> Option<String> {
        if RESERVED_FIELDS.contains(&field) {
            return Some(format!("{}: `{field}` is a reserved field name", self.type_name));
        }
        let clash = if attribute {
            self.relationships.contains_key(field)
        } else {
            self.attributes.contains_key(field)
        };
        if clash {
            return Some(format!(
                "{}: `{field}` is declared as both an attribute and a relationship",
                self.type_name
            ));
        }
        let duplicate = if attribute {
            self.attributes.contains_key(field)
        } else {
            self.relationships.contains_key(field)
        };
        duplicate.then(|| format!("{}: `{field}` is declared twice", self.type_name))
    }
}

impl fmt::Debug for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceType")
            .field("type_name", &self.type_name)
            .field("model", &self.model)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field("relationships", &self.relationships.keys().collect::<Vec<_>>())
            .field("abstract", &self.is_abstract)
            .field("immutable", &self.immutable)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// ResourceDeclaration
// =============================================================================

/// Builder returned by [`ResourceType::declare`].
///
/// Problems are collected as they are declared and reported by
/// [`ResourceDeclaration::build`].
#[must_use]
pub struct ResourceDeclaration {
    resource: ResourceType,
    problems: Vec<String>,
}

impl ResourceDeclaration {
    /// Overrides the type name.
    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.resource.type_name = type_name.into();
        self
    }

    /// Overrides the row model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.resource.model = model.into();
        self
    }

    /// Overrides the primary key column.
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.resource.primary_key = column.into();
        self
    }

    /// Declares the key type.
    pub fn key_type(mut self, key_type: KeyType) -> Self {
        self.resource.key_type = Some(key_type);
        self
    }

    /// Declares an attribute stored in the column of the same name.
    pub fn attribute(self, name: impl Into<String>) -> Self {
        self.attribute_def(AttributeDef::new(name))
    }

    /// Declares several plain attributes.
    pub fn attributes<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(self, Self::attribute)
    }

    /// Declares an attribute with a format or delegate.
    pub fn attribute_def(mut self, attribute: AttributeDef) -> Self {
        if let Some(problem) = self.resource.name_problem(&attribute.name, true) {
            self.problems.push(problem);
        }
        self.resource
            .attributes
            .insert(attribute.name.clone(), attribute);
        self
    }

    /// Declares a relationship.
    pub fn relationship(mut self, relationship: RelationshipDescriptor) -> Self {
        if let Some(problem) = self.resource.name_problem(&relationship.name, false) {
            self.problems.push(problem);
        }
        self.resource
            .relationships
            .insert(relationship.name.clone(), relationship);
        self
    }

    /// Declares an allowed filter.
    pub fn filter(mut self, filter: FilterDef) -> Self {
        self.resource.filters.insert(filter.name.clone(), filter);
        self
    }

    /// Declares several allowed filters with default strategies.
    pub fn filters<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .fold(self, |decl, name| decl.filter(FilterDef::new(name)))
    }

    /// Marks the resource abstract.
    pub fn abstract_resource(mut self) -> Self {
        self.resource.is_abstract = true;
        self
    }

    /// Marks the resource immutable.
    pub fn immutable(mut self) -> Self {
        self.resource.immutable = true;
        self
    }

    /// Sets the default sort.
    pub fn default_sort(mut self, criteria: Vec<SortCriterion>) -> Self {
        self.resource.default_sort = criteria;
        self
    }

    /// Sets the base scope.
    pub fn base_scope<F>(mut self, scope: F) -> Self
    where
        F: Fn(Relation, &Context) -> Relation + Send + Sync + 'static,
    {
        self.resource.base_scope = Some(Arc::new(scope));
        self
    }

    /// Sets the metadata hook.
    pub fn meta<F>(mut self, meta: F) -> Self
    where
        F: Fn(&Row, &Context) -> BTreeMap<String, Value> + Send + Sync + 'static,
    {
        self.resource.meta = Some(Arc::new(meta));
        self
    }

    /// Sets the custom links hook.
    pub fn custom_links<F>(mut self, links: F) -> Self
    where
        F: Fn(&Row, &Context) -> BTreeMap<String, Value> + Send + Sync + 'static,
    {
        self.resource.custom_links = Some(Arc::new(links));
        self
    }

    /// Adds a hook run before `kind`.
    pub fn before<F>(mut self, kind: ChangeKind, hook: F) -> Self
    where
        F: Fn(ChangeKind, &mut Row, &Context) -> Result<()> + Send + Sync + 'static,
    {
        self.resource.callbacks.add_before(kind, Arc::new(hook));
        self
    }

    /// Adds a hook run after `kind` succeeded.
    pub fn after<F>(mut self, kind: ChangeKind, hook: F) -> Self
    where
        F: Fn(ChangeKind, &mut Row, &Context) -> Result<()> + Send + Sync + 'static,
    {
        self.resource.callbacks.add_after(kind, Arc::new(hook));
        self
    }

    /// Finishes the declaration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDeclaration` listing every reserved, duplicated or
    /// clashing field name, or an empty primary key.
    pub fn build(mut self) -> Result<ResourceType> {
        if self.resource.primary_key.is_empty() {
            self.problems
                .push(format!("{}: primary key is empty", self.resource.type_name));
        }
        if !self.problems.is_empty() {
            return Err(Error::new(ErrorKind::InvalidDeclaration(
                self.problems.join("; "),
            )));
        }
        let type_name = self.resource.type_name.clone();
        for relationship in self.resource.relationships.values_mut() {
            relationship.source_type.clone_from(&type_name);
        }
        Ok(self.resource)
    }
}
