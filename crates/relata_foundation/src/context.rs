//! Opaque caller context.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Caller-supplied context (current user, permissions, request data).
///
/// The engine never inspects it; it only hands it to resource hooks and
/// filter strategies. Cloning is O(1).
#[derive(Clone, Default)]
pub struct Context(Option<Arc<dyn Any + Send + Sync>>);

impl Context {
    /// Wraps a value as context.
    #[must_use]
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    /// The empty context.
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    /// Returns true if no value was supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Borrows the wrapped value if it has type `T`.
    #[must_use]
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|v| v.downcast_ref::<T>())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_some() {
            write!(f, "Context(..)")
        } else {
            write!(f, "Context(none)")
        }
    }
}
