//! Paginators.

use std::fmt;

use relata_foundation::{Error, Result, Value};
use relata_storage::Relation;

use crate::config::EngineConfig;

/// Windows a relation.
pub trait Paginator: fmt::Debug + Send + Sync {
    /// Applies the window.
    fn apply(&self, relation: Relation) -> Relation;

    /// Number of pages needed for `record_count` rows.
    fn page_count(&self, record_count: usize) -> usize;
}

fn checked_size(config: &EngineConfig, field: &str, size: Option<usize>) -> Result<usize> {
    let size = size.unwrap_or(config.default_page_size);
    if size == 0 || size > config.maximum_page_size {
        return Err(Error::invalid_field_value(field, to_value(size)));
    }
    Ok(size)
}

fn to_value(n: usize) -> Value {
    i64::try_from(n).map_or(Value::Nil, Value::Int)
}

/// Offset/limit pagination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OffsetPaginator {
    /// Rows skipped.
    pub offset: usize,
    /// Rows per page.
    pub limit: usize,
}

impl OffsetPaginator {
    /// Creates a paginator, defaulting to offset 0 and the default page size.
    ///
    /// # Errors
    ///
    /// `InvalidFieldValue("limit", ..)` for a zero or oversized limit.
    pub fn new(config: &EngineConfig, offset: Option<usize>, limit: Option<usize>) -> Result<Self> {
        Ok(Self {
            offset: offset.unwrap_or(0),
            limit: checked_size(config, "limit", limit)?,
        })
    }
}

impl Paginator for OffsetPaginator {
    fn apply(&self, relation: Relation) -> Relation {
        relation.offset(self.offset).limit(self.limit)
    }

    fn page_count(&self, record_count: usize) -> usize {
        record_count.div_ceil(self.limit)
    }
}

/// Numbered-page pagination; pages start at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PagedPaginator {
    /// Page number.
    pub number: usize,
    /// Rows per page.
    pub size: usize,
}

impl PagedPaginator {
    /// Creates a paginator, defaulting to page 1 and the default page size.
    ///
    /// # Errors
    ///
    /// `InvalidFieldValue("number", ..)` for page 0 and
    /// `InvalidFieldValue("size", ..)` for a zero or oversized page.
    pub fn new(config: &EngineConfig, number: Option<usize>, size: Option<usize>) -> Result<Self> {
        let number = number.unwrap_or(1);
        if number == 0 {
            return Err(Error::invalid_field_value("number", to_value(number)));
        }
        Ok(Self {
            number,
            size: checked_size(config, "size", size)?,
        })
    }
}

impl Paginator for PagedPaginator {
    fn apply(&self, relation: Relation) -> Relation {
        relation
            .offset((self.number - 1).saturating_mul(self.size))
            .limit(self.size)
    }

    fn page_count(&self, record_count: usize) -> usize {
        record_count.div_ceil(self.size)
    }
}
