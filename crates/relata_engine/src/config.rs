//! Engine-wide configuration.

use std::sync::Arc;

use relata_foundation::{KeyType, Result};

use crate::paginator::{OffsetPaginator, PagedPaginator, Paginator};

/// Paginator used when a query supplies none.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PaginatorKind {
    /// No pagination.
    #[default]
    None,
    /// Offset/limit windows.
    Offset,
    /// Numbered pages.
    Paged,
}

/// Configuration shared by every operation of an [`Engine`](crate::Engine).
///
/// Built once at startup and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Whether relationship edits propagate to inverse relationships.
    pub use_relationship_reflection: bool,

    /// Key type for resources that declare none.
    pub resource_key_type: KeyType,

    /// Paginator used when a query supplies none.
    pub default_paginator: PaginatorKind,

    /// Page size used when a paginator is given no size.
    pub default_page_size: usize,

    /// Largest page size a caller may request.
    pub maximum_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_relationship_reflection: false,
            resource_key_type: KeyType::Integer,
            default_paginator: PaginatorKind::None,
            default_page_size: 10,
            maximum_page_size: 20,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with relationship reflection enabled.
    #[must_use]
    pub fn reflecting() -> Self {
        Self {
            use_relationship_reflection: true,
            ..Self::default()
        }
    }

    /// Creates a configuration that pages every query by default.
    #[must_use]
    pub fn paged() -> Self {
        Self {
            default_paginator: PaginatorKind::Paged,
            ..Self::default()
        }
    }

    /// Builder method to enable/disable relationship reflection.
    #[must_use]
    pub fn with_relationship_reflection(mut self, reflect: bool) -> Self {
        self.use_relationship_reflection = reflect;
        self
    }

    /// Builder method to set the default key type.
    #[must_use]
    pub fn with_resource_key_type(mut self, key_type: KeyType) -> Self {
        self.resource_key_type = key_type;
        self
    }

    /// Builder method to set the default paginator.
    #[must_use]
    pub fn with_default_paginator(mut self, kind: PaginatorKind) -> Self {
        self.default_paginator = kind;
        self
    }

    /// Builder method to set the default page size.
    #[must_use]
    pub fn with_default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size;
        self
    }

    /// Builder method to set the maximum page size.
    #[must_use]
    pub fn with_maximum_page_size(mut self, size: usize) -> Self {
        self.maximum_page_size = size;
        self
    }

    /// Instantiates the default paginator with default parameters.
    ///
    /// # Errors
    ///
    /// Fails if the default page size exceeds the maximum.
    pub fn default_paginator(&self) -> Result<Option<Arc<dyn Paginator>>> {
        Ok(match self.default_paginator {
            PaginatorKind::None => None,
            PaginatorKind::Offset => Some(Arc::new(OffsetPaginator::new(self, None, None)?)),
            PaginatorKind::Paged => Some(Arc::new(PagedPaginator::new(self, None, None)?)),
        })
    }
}
