//! # Docstore Client
//!
//! Generic document-store client layer for search clusters.
//!
//! This crate provides:
//! - A pooled HTTP transport adapter with gzip negotiation and node discovery
//! - A retry executor with a retryability predicate and per-retry hooks
//! - A collection client for search, count, exists, get, index and delete
//! - A bulk writer that batches actions into size-bounded NDJSON requests
//! - A scroll pagination engine that streams pages from a server-side cursor
//! - A typed repository parameterized over caller-supplied hit mappers
//!
//! ## Architecture
//!
//! ```text
//! DocumentRepository ──► CollectionClient ──► Retry ──► HttpClient ──► cluster
//!         │                    │
//!         └──► scroll ─────────┤
//!                              └──► BulkWriter ───────► HttpClient
//! ```
//!
//! ## Key Invariants
//!
//! - A response reporting any failed shard is an error, never a partial result
//! - Not-found errors are never retried
//! - A scroll session stops after the first page shorter than the page size
//! - A scroll cursor is released on every exit path, best-effort
//! - Query bodies are opaque; the client never interprets them

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod aggregation;
mod bulk;
mod cluster;
mod collection;
mod config;
mod context;
mod error;
mod http;
mod model;
mod repository;
mod retry;
mod scroll;
mod transport;

#[cfg(test)]
mod test_support;

pub use aggregation::{Aggregations, TermsAggregate, TermsBucket, TopHitsAggregate};
pub use bulk::{BulkWriter, WriteAction};
pub use cluster::ClusterClients;
pub use collection::{CollectionClient, CollectionHandle, Connection, DocumentRef, IndexDocument};
pub use config::{BackoffConfig, BulkConfig, ClusterConfig, ClusterConfigMap, DEFAULT_TIMEOUT};
pub use context::RequestContext;
pub use error::{ErrorKind, StoreError, StoreResult};
pub use http::{NodePool, PooledHttpClient};
pub use model::{
    CountResponse, ErrorDetails, ErrorEnvelope, Query, SearchHit, SearchHits, SearchResponse,
    ShardFailure, ShardsInfo, TotalHits,
};
pub use repository::{ClosureMapper, DocumentRepository, HitMapper, JsonMapper};
pub use retry::Retry;
pub use scroll::{PageStream, ScrollOptions};
pub use transport::{HttpClient, HttpRequest, HttpResponse, Method};
