//! Integration tests for Layer 2: Schema
//!
//! Tests for resource declarations, relationship naming, hooks, and the
//! registry that ties resource types to row models.

mod registry;
