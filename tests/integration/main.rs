//! Cross-layer integration tests for relata
//!
//! Tests that drive every layer through the root crate's re-exports.

mod issue_lifecycle;
