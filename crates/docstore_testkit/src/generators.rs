//! Property-based test generators using proptest.
//!
//! Provides strategies for documents, identifiers and batch shapes used by
//! the bulk and scroll property tests.

use proptest::prelude::*;
use serde_json::{json, Value};

/// Strategy for document identifiers, including characters that need escaping.
pub fn document_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9][a-zA-Z0-9_\\-\" ]{0,15}").expect("Invalid regex")
}

/// Strategy for a set of distinct identifiers.
pub fn distinct_ids_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(document_id_strategy(), 0..max).prop_map(|ids| ids.into_iter().collect())
}

/// Strategy for flat JSON document sources.
pub fn document_source_strategy() -> impl Strategy<Value = Value> {
    (
        any::<i64>(),
        prop::string::string_regex("[a-z \"\\\\]{0,24}").expect("Invalid regex"),
        any::<bool>(),
    )
        .prop_map(|(number, title, active)| json!({"number": number, "title": title, "active": active}))
}

/// Strategy for documents keyed by distinct identifiers.
pub fn documents_strategy(max: usize) -> impl Strategy<Value = Vec<(String, Value)>> {
    prop::collection::btree_map(document_id_strategy(), document_source_strategy(), 0..max)
        .prop_map(|docs| docs.into_iter().collect())
}

/// Strategy for a page size paired with a document count.
pub fn paging_strategy(max_docs: usize) -> impl Strategy<Value = (usize, usize)> {
    (1usize..20, 0..max_docs)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
