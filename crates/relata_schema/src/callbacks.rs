//! Lifecycle hooks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use relata_foundation::{Context, Result};
use relata_storage::Row;

/// A hookable mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeKind {
    /// First save of a new row.
    Create,
    /// Save of an existing row.
    Update,
    /// Row removal.
    Remove,
    /// Adding members to a to-many relationship.
    CreateToManyLink,
    /// Replacing a to-many relationship's membership.
    ReplaceToManyLinks,
    /// Replacing a to-one relationship.
    ReplaceToOneLink,
    /// Replacing a polymorphic to-one relationship.
    ReplacePolymorphicToOneLink,
    /// Removing one member from a to-many relationship.
    RemoveToManyLink,
    /// Clearing a to-one relationship.
    RemoveToOneLink,
    /// Batch field replacement.
    ReplaceFields,
}

impl ChangeKind {
    /// Snake-case name, used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Remove => "remove",
            Self::CreateToManyLink => "create_to_many_link",
            Self::ReplaceToManyLinks => "replace_to_many_links",
            Self::ReplaceToOneLink => "replace_to_one_link",
            Self::ReplacePolymorphicToOneLink => "replace_polymorphic_to_one_link",
            Self::RemoveToManyLink => "remove_to_many_link",
            Self::RemoveToOneLink => "remove_to_one_link",
            Self::ReplaceFields => "replace_fields",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle hook. A failing `before` hook aborts the mutation.
pub type Hook = Arc<dyn Fn(ChangeKind, &mut Row, &Context) -> Result<()> + Send + Sync>;

/// Before and after hooks, per change kind.
#[derive(Clone, Default)]
pub struct Callbacks {
    before: BTreeMap<ChangeKind, Vec<Hook>>,
    after: BTreeMap<ChangeKind, Vec<Hook>>,
}

impl Callbacks {
    /// Creates an empty hook set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hook run before `kind`.
    pub fn add_before(&mut self, kind: ChangeKind, hook: Hook) {
        self.before.entry(kind).or_default().push(hook);
    }

    /// Adds a hook run after `kind` succeeded.
    pub fn add_after(&mut self, kind: ChangeKind, hook: Hook) {
        self.after.entry(kind).or_default().push(hook);
    }

    /// Runs the `before` hooks in declaration order.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first hook error.
    pub fn run_before(&self, kind: ChangeKind, row: &mut Row, context: &Context) -> Result<()> {
        Self::run(self.before.get(&kind), kind, row, context)
    }

    /// Runs the `after` hooks in declaration order.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first hook error.
    pub fn run_after(&self, kind: ChangeKind, row: &mut Row, context: &Context) -> Result<()> {
        Self::run(self.after.get(&kind), kind, row, context)
    }

    fn run(hooks: Option<&Vec<Hook>>, kind: ChangeKind, row: &mut Row, context: &Context) -> Result<()> {
        for hook in hooks.into_iter().flatten() {
            hook(kind, row, context)?;
        }
        Ok(())
    }

    /// Number of hooks registered for a kind, before and after combined.
    #[must_use]
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.before.get(&kind).map_or(0, Vec::len) + self.after.get(&kind).map_or(0, Vec::len)
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("before", &self.before.keys().collect::<Vec<_>>())
            .field("after", &self.after.keys().collect::<Vec<_>>())
            .finish()
    }
}
