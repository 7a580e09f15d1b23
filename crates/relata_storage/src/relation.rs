//! Relational query fragments.
//!
//! A [`Relation`] is the provider-neutral form of one query: a root model,
//! predicates, left joins, ordering, eager loads and a window. The query
//! engine builds relations; stores execute them.

use std::fmt;

use relata_foundation::Value;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// =============================================================================
// Columns and predicates
// =============================================================================

/// A column, optionally qualified by a join alias or association name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ColumnRef {
    /// Join alias or eager-loaded association; `None` for the root model.
    pub scope: Option<String>,
    /// Column name.
    pub column: String,
}

impl ColumnRef {
    /// A column of the root model.
    #[must_use]
    pub fn root(column: impl Into<String>) -> Self {
        Self {
            scope: None,
            column: column.into(),
        }
    }

    /// A column of a joined or eager-loaded relation.
    #[must_use]
    pub fn scoped(scope: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{scope}.{}", self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

/// A row predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Predicate {
    /// Column value is one of `values`.
    In {
        /// Column tested.
        column: ColumnRef,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// Column value is none of `values`.
    NotIn {
        /// Column tested.
        column: ColumnRef,
        /// Rejected values.
        values: Vec<Value>,
    },
    /// String column contains `needle`, ignoring case.
    Contains {
        /// Column tested.
        column: ColumnRef,
        /// Substring searched for.
        needle: String,
    },
}

impl Predicate {
    /// Inclusion predicate.
    #[must_use]
    pub fn is_in(column: ColumnRef, values: Vec<Value>) -> Self {
        Self::In { column, values }
    }

    /// The column the predicate reads.
    #[must_use]
    pub fn column(&self) -> &ColumnRef {
        match self {
            Self::In { column, .. } | Self::NotIn { column, .. } | Self::Contains { column, .. } => {
                column
            }
        }
    }
}

// =============================================================================
// Joins and ordering
// =============================================================================

/// A left outer join along one association.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Join {
    /// Alias the joined rows are addressed by.
    pub alias: String,
    /// Alias of the joined relation this hop starts from; `None` for the root.
    pub parent: Option<String>,
    /// Association followed from the parent.
    pub association: String,
}

/// Sort direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    /// Ascending, nil first.
    #[default]
    Asc,
    /// Descending, nil last.
    Desc,
}

/// One ordering term.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Order {
    /// Column sorted on.
    pub column: ColumnRef,
    /// Sort direction.
    pub direction: Direction,
}

// =============================================================================
// Eager loads
// =============================================================================

/// A (possibly nested) eager-load directive.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IncludeTree {
    /// Relationship or association name.
    pub name: String,
    /// Nested directives.
    pub children: Vec<IncludeTree>,
}

impl IncludeTree {
    /// A leaf directive.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Adds a nested directive.
    #[must_use]
    pub fn with_child(mut self, child: IncludeTree) -> Self {
        Self::merge_into(&mut self.children, child);
        self
    }

    /// Parses `"comments.author,tags"` into merged trees.
    #[must_use]
    pub fn parse_list(text: &str) -> Vec<IncludeTree> {
        let mut trees = Vec::new();
        for path in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let mut segments = path.split('.').filter(|s| !s.is_empty()).rev();
            let Some(last) = segments.next() else {
                continue;
            };
            let tree = segments.fold(IncludeTree::new(last), |child, name| {
                IncludeTree::new(name).with_child(child)
            });
            Self::merge_into(&mut trees, tree);
        }
        trees
    }

    /// Merges `tree` into `trees`, combining directives with the same name.
    pub fn merge_into(trees: &mut Vec<IncludeTree>, tree: IncludeTree) {
        if let Some(existing) = trees.iter_mut().find(|t| t.name == tree.name) {
            for child in tree.children {
                Self::merge_into(&mut existing.children, child);
            }
        } else {
            trees.push(tree);
        }
    }
}

// =============================================================================
// Relation
// =============================================================================

/// A query over one root model.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Relation {
    /// Root model. Rows of models inheriting from it match too.
    pub model: String,
    /// Conjunction of predicates.
    pub predicates: Vec<Predicate>,
    /// Left joins, in application order.
    pub joins: Vec<Join>,
    /// Ordering terms, most significant first.
    pub orders: Vec<Order>,
    /// Eager loads.
    pub includes: Vec<IncludeTree>,
    /// Rows skipped.
    pub offset: Option<usize>,
    /// Maximum rows returned.
    pub limit: Option<usize>,
}

impl Relation {
    /// All rows of a model.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            predicates: Vec::new(),
            joins: Vec::new(),
            orders: Vec::new(),
            includes: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    /// Adds a predicate.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Adds a left join unless one with the same alias exists.
    #[must_use]
    pub fn left_join(mut self, join: Join) -> Self {
        if !self.has_join(&join.alias) {
            self.joins.push(join);
        }
        self
    }

    /// Returns true if a join with this alias exists.
    #[must_use]
    pub fn has_join(&self, alias: &str) -> bool {
        self.joins.iter().any(|j| j.alias == alias)
    }

    /// Adds an ordering term.
    #[must_use]
    pub fn order(mut self, column: ColumnRef, direction: Direction) -> Self {
        self.orders.push(Order { column, direction });
        self
    }

    /// Merges an eager-load directive.
    #[must_use]
    pub fn include(mut self, tree: IncludeTree) -> Self {
        IncludeTree::merge_into(&mut self.includes, tree);
        self
    }

    /// Returns true if an association is eager-loaded at the root.
    #[must_use]
    pub fn includes_association(&self, name: &str) -> bool {
        self.includes.iter().any(|t| t.name == name)
    }

    /// Skips rows.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Caps the number of rows.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Drops ordering and window, keeping the row set.
    #[must_use]
    pub fn unwindowed(mut self) -> Self {
        self.orders.clear();
        self.offset = None;
        self.limit = None;
        self
    }
}
