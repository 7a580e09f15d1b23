//! Filter declarations and custom strategies.

use std::fmt;
use std::sync::Arc;

use relata_foundation::{Context, Result, Value};
use relata_storage::Relation;

/// Custom filter verification: normalizes raw values or rejects them.
pub type VerifyFn = Arc<dyn Fn(&[Value], &Context) -> Result<Vec<Value>> + Send + Sync>;

/// Custom filter application: narrows a relation by verified values.
pub type ApplyFn = Arc<dyn Fn(Relation, &[Value], &Context) -> Result<Relation> + Send + Sync>;

/// A custom strategy: either a function registered on the registry under a
/// name, or a closure carried by the declaration itself.
#[derive(Clone)]
pub enum Strategy<F> {
    /// Resolved through the registry.
    Named(String),
    /// Carried inline.
    Closure(F),
}

impl<F> fmt::Debug for Strategy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "Named({name})"),
            Self::Closure(_) => write!(f, "Closure(..)"),
        }
    }
}

/// An allowed filter.
#[derive(Clone, Debug)]
pub struct FilterDef {
    /// Filter name.
    pub name: String,
    /// Custom verification.
    pub verify: Option<Strategy<VerifyFn>>,
    /// Custom application.
    pub apply: Option<Strategy<ApplyFn>>,
    /// Values used when the caller does not supply the filter.
    pub default: Option<Vec<Value>>,
}

impl FilterDef {
    /// A filter with default verification and application.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verify: None,
            apply: None,
            default: None,
        }
    }

    /// Verifies values with an inline closure.
    #[must_use]
    pub fn verify_with<F>(mut self, verify: F) -> Self
    where
        F: Fn(&[Value], &Context) -> Result<Vec<Value>> + Send + Sync + 'static,
    {
        self.verify = Some(Strategy::Closure(Arc::new(verify)));
        self
    }

    /// Verifies values with a function registered under `name`.
    #[must_use]
    pub fn verify_named(mut self, name: impl Into<String>) -> Self {
        self.verify = Some(Strategy::Named(name.into()));
        self
    }

    /// Applies values with an inline closure.
    #[must_use]
    pub fn apply_with<F>(mut self, apply: F) -> Self
    where
        F: Fn(Relation, &[Value], &Context) -> Result<Relation> + Send + Sync + 'static,
    {
        self.apply = Some(Strategy::Closure(Arc::new(apply)));
        self
    }

    /// Applies values with a function registered under `name`.
    #[must_use]
    pub fn apply_named(mut self, name: impl Into<String>) -> Self {
        self.apply = Some(Strategy::Named(name.into()));
        self
    }

    /// Sets the default values.
    #[must_use]
    pub fn with_default<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.default = Some(values.into_iter().map(Into::into).collect());
        self
    }
}
