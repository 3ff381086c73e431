//! Test fixtures and cluster helpers.
//!
//! Provides a connection wired to an in-memory cluster, query builders and
//! seeding helpers for common test scenarios.

use crate::fake::FakeCluster;
use docstore_client::{
    BackoffConfig, BulkConfig, CollectionClient, Connection, HttpClient, Query, RequestContext,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// A fake cluster together with a connection that talks to it.
///
/// Retries back off immediately so fault-injection tests stay fast.
pub struct TestCluster {
    /// The in-memory cluster.
    pub cluster: Arc<FakeCluster>,
    /// Connection routed to `cluster`.
    pub connection: Connection,
}

impl TestCluster {
    /// Creates an empty cluster and connection.
    pub fn new() -> Self {
        let cluster = FakeCluster::new();
        let http: Arc<dyn HttpClient> = cluster.clone();
        Self {
            cluster,
            connection: Connection::new(http).with_backoff(BackoffConfig::immediate()),
        }
    }

    /// Replaces the bulk batching bounds of the connection.
    #[must_use]
    pub fn with_bulk_config(mut self, config: BulkConfig) -> Self {
        self.connection = self.connection.with_bulk_config(config);
        self
    }

    /// Returns a client for `name`.
    pub fn collection(&self, name: &str) -> CollectionClient {
        self.connection.collection(name)
    }
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestCluster {
    type Target = FakeCluster;

    fn deref(&self) -> &Self::Target {
        &self.cluster
    }
}

/// A context without deadline or cancellation.
pub fn background() -> RequestContext {
    RequestContext::background()
}

/// `{"query": {"match_all": {}}}`
pub fn match_all() -> Query {
    query(json!({"match_all": {}}))
}

/// An `ids` query over the given identifiers.
pub fn ids_query<I, S>(ids: I) -> Query
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let values: Vec<String> = ids.into_iter().map(Into::into).collect();
    query(json!({"ids": {"values": values}}))
}

/// A `term` query on a (possibly dotted) field.
pub fn term_query(field: &str, value: impl Into<Value>) -> Query {
    query(json!({"term": {field: value.into()}}))
}

fn query(clause: Value) -> Query {
    let mut body = Query::new();
    body.insert("query".into(), clause);
    body
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a cluster whose `index` holds `count` documents.
    ///
    /// Document `i` has id `doc-{i:05}` and source
    /// `{"n": i, "group": i % 3}`, so id order matches `n`.
    pub fn seeded_cluster(index: &str, count: usize) -> TestCluster {
        let test = TestCluster::new();
        test.create_index(index);
        for i in 0..count {
            test.insert(index, &doc_id(i), json!({"n": i, "group": i % 3}));
        }
        test
    }

    /// Id used by [`seeded_cluster`] for document `i`.
    pub fn doc_id(i: usize) -> String {
        format!("doc-{:05}", i)
    }
}
