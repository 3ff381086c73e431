//! Primitive operations against one named collection.

use crate::bulk::{BulkWriter, WriteAction};
use crate::config::{BackoffConfig, BulkConfig};
use crate::context::RequestContext;
use crate::error::{StoreError, StoreResult};
use crate::model::{error_from_response, parse_search_response, CountResponse, Query, SearchHit, SearchResponse};
use crate::retry::Retry;
use crate::transport::{HttpClient, HttpRequest, HttpResponse, Method};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Attempts for every operation except count.
pub(crate) const DEFAULT_ATTEMPTS: u32 = 5;
/// Attempts for count requests.
pub(crate) const COUNT_ATTEMPTS: u32 = 3;
/// Per-attempt timeout of single-document deletes.
const DELETE_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared connection to one cluster.
///
/// Cheap to clone; every collection derived from it shares the same
/// transport.
#[derive(Clone)]
pub struct Connection {
    http: Arc<dyn HttpClient>,
    backoff: BackoffConfig,
    bulk: BulkConfig,
}

impl Connection {
    /// Creates a connection over a transport with default backoff and bulk bounds.
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            backoff: BackoffConfig::default(),
            bulk: BulkConfig::default(),
        }
    }

    /// Sets the delay schedule used between retries.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the bulk batch bounds.
    pub fn with_bulk_config(mut self, bulk: BulkConfig) -> Self {
        self.bulk = bulk;
        self
    }

    /// Returns the transport.
    pub fn http(&self) -> &Arc<dyn HttpClient> {
        &self.http
    }

    /// Returns the backoff schedule.
    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }

    /// Returns a client bound to `collection`.
    pub fn collection(&self, collection: impl Into<String>) -> CollectionClient {
        CollectionClient::new(CollectionHandle {
            connection: self.clone(),
            name: collection.into(),
        })
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("backoff", &self.backoff)
            .field("bulk", &self.bulk)
            .finish_non_exhaustive()
    }
}

/// Immutable reference to a connection and a collection name.
#[derive(Debug, Clone)]
pub struct CollectionHandle {
    connection: Connection,
    name: String,
}

impl CollectionHandle {
    /// Returns the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub(crate) async fn send(&self, request: HttpRequest) -> StoreResult<HttpResponse> {
        self.connection.http.send(request).await
    }

    /// Builds an executor that logs every failed attempt of `operation`.
    fn retry<'a>(&'a self, attempts: u32, operation: &'a str) -> Retry<'a> {
        Retry::new(attempts)
            .with_backoff(self.connection.backoff.clone())
            .on_retry(move |attempt, err| {
                error!(
                    "{} on {} failed on attempt {}: {}",
                    operation, self.name, attempt, err
                )
            })
    }

    fn doc_request(&self, method: Method, id: &str, routing: Option<&str>) -> HttpRequest {
        let request = HttpRequest::new(method, [self.name.as_str(), "_doc", id]);
        match routing.filter(|routing| !routing.is_empty()) {
            Some(routing) => request.with_query("routing", routing),
            None => request,
        }
    }
}

/// Identifier and optional routing key of a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    /// Document identifier.
    pub id: String,
    /// Routing key; `None` uses the default routing.
    pub routing: Option<String>,
}

impl DocumentRef {
    /// Creates a reference without routing.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            routing: None,
        }
    }

    /// Sets the routing key; an empty key means no routing.
    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        let routing = routing.into();
        self.routing = (!routing.is_empty()).then_some(routing);
        self
    }
}

/// A document to index under a caller-chosen identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument<T> {
    /// Document identifier.
    pub id: String,
    /// Routing key; `None` uses the default routing.
    pub routing: Option<String>,
    /// Document body.
    pub body: T,
}

impl<T> IndexDocument<T> {
    /// Creates a document without routing.
    pub fn new(id: impl Into<String>, body: T) -> Self {
        Self {
            id: id.into(),
            routing: None,
            body,
        }
    }

    /// Sets the routing key; an empty key means no routing.
    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        let routing = routing.into();
        self.routing = (!routing.is_empty()).then_some(routing);
        self
    }
}

/// Client for one collection.
///
/// Every operation takes a [`RequestContext`] and retries its network call
/// on retryable errors: 3 attempts for [`count`](Self::count), 5 for the rest.
/// Batch writes go through the [`BulkWriter`] and are not retried.
#[derive(Debug, Clone)]
pub struct CollectionClient {
    handle: Arc<CollectionHandle>,
    bulk: BulkWriter,
}

impl CollectionClient {
    fn new(handle: CollectionHandle) -> Self {
        let handle = Arc::new(handle);
        let bulk = BulkWriter::new(handle.clone(), handle.connection.bulk);
        Self { handle, bulk }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Returns the shared handle.
    pub fn handle(&self) -> &Arc<CollectionHandle> {
        &self.handle
    }

    /// Returns the bulk writer for this collection.
    pub fn bulk_writer(&self) -> &BulkWriter {
        &self.bulk
    }

    fn search_request(&self, query: &Query) -> StoreResult<HttpRequest> {
        HttpRequest::new(Method::Get, [self.name(), "_search"])
            .with_query("track_total_hits", "false")
            .with_json(query)
    }

    async fn run_search(
        &self,
        ctx: &RequestContext,
        operation: &str,
        request: HttpRequest,
    ) -> StoreResult<SearchResponse> {
        let handle = &self.handle;
        let request = &request;
        let response = handle
            .retry(DEFAULT_ATTEMPTS, operation)
            .run(ctx, move || handle.send(request.clone()))
            .await?;
        parse_search_response(&response)
    }

    /// Searches the collection. Total hit tracking is disabled.
    pub async fn search(&self, ctx: &RequestContext, query: &Query) -> StoreResult<SearchResponse> {
        let request = self.search_request(query)?;
        self.run_search(ctx, "search", request).await
    }

    /// Searches the collection returning at most `size` hits.
    pub async fn search_with_size(
        &self,
        ctx: &RequestContext,
        query: &Query,
        size: usize,
    ) -> StoreResult<SearchResponse> {
        let request = self.search_request(query)?.with_query("size", size.to_string());
        self.run_search(ctx, "search", request).await
    }

    /// Counts documents matching `query`.
    ///
    /// A response with failed shards is an error carrying the shard summary.
    pub async fn count(&self, ctx: &RequestContext, query: &Query) -> StoreResult<CountResponse> {
        let request = HttpRequest::new(Method::Get, [self.name(), "_count"]).with_json(query)?;
        let handle = &self.handle;
        let request = &request;
        handle
            .retry(COUNT_ATTEMPTS, "count")
            .run(ctx, move || async move {
                let response = handle.send(request.clone()).await?;
                if response.is_not_found() {
                    return Err(StoreError::NotFound(format!("collection {}", handle.name())));
                }
                if !response.is_success() {
                    return Err(error_from_response(&response));
                }
                let count: CountResponse = response.json()?;
                count
                    .shards
                    .ensure_complete(|| serde_json::to_string(&count.shards).unwrap_or_default())?;
                Ok(count)
            })
            .await
    }

    /// Checks whether a document exists. A 404 is `Ok(false)`.
    pub async fn exists_by_id(
        &self,
        ctx: &RequestContext,
        id: &str,
        routing: Option<&str>,
    ) -> StoreResult<bool> {
        let request = self.handle.doc_request(Method::Head, id, routing);
        let handle = &self.handle;
        let request = &request;
        handle
            .retry(DEFAULT_ATTEMPTS, "exists")
            .run(ctx, move || async move {
                let response = handle.send(request.clone()).await?;
                if response.is_not_found() {
                    return Ok(false);
                }
                if response.is_success() {
                    return Ok(true);
                }
                Err(StoreError::Internal(format!(
                    "[{}] exists check for {} in {} failed",
                    response.status,
                    id,
                    handle.name()
                )))
            })
            .await
    }

    /// Fetches one document. A 404 or `found: false` is a not-found error.
    pub async fn get_by_id(
        &self,
        ctx: &RequestContext,
        id: &str,
        routing: Option<&str>,
    ) -> StoreResult<SearchHit> {
        let request = self.handle.doc_request(Method::Get, id, routing);
        let handle = &self.handle;
        let request = &request;
        handle
            .retry(DEFAULT_ATTEMPTS, "get")
            .run(ctx, move || async move {
                let response = handle.send(request.clone()).await?;
                if response.is_not_found() {
                    return Err(StoreError::NotFound(format!("document {} in {}", id, handle.name())));
                }
                if !response.is_success() {
                    return Err(error_from_response(&response));
                }
                let hit: SearchHit = response.json()?;
                if hit.found == Some(false) {
                    return Err(StoreError::NotFound(format!("document {} in {}", id, handle.name())));
                }
                Ok(hit)
            })
            .await
    }

    /// Indexes one document without waiting for a refresh.
    ///
    /// The body is serialized before any network call; a serialization
    /// failure is returned at once. A 404 (collection missing) is a
    /// not-found error.
    pub async fn index_document<T: Serialize + ?Sized>(
        &self,
        ctx: &RequestContext,
        id: &str,
        routing: Option<&str>,
        body: &T,
    ) -> StoreResult<()> {
        let request = self
            .handle
            .doc_request(Method::Put, id, routing)
            .with_query("refresh", "false")
            .with_json(body)?;
        let handle = &self.handle;
        let request = &request;
        handle
            .retry(DEFAULT_ATTEMPTS, "index")
            .run(ctx, move || async move {
                let response = handle.send(request.clone()).await?;
                if response.is_not_found() {
                    return Err(StoreError::NotFound(format!("collection {}", handle.name())));
                }
                if !response.is_success() {
                    return Err(error_from_response(&response));
                }
                Ok(())
            })
            .await
    }

    /// Deletes one document. A 404 counts as success.
    pub async fn delete_by_id(
        &self,
        ctx: &RequestContext,
        id: &str,
        routing: Option<&str>,
    ) -> StoreResult<()> {
        let request = self
            .handle
            .doc_request(Method::Delete, id, routing)
            .with_query("timeout", format!("{}s", DELETE_TIMEOUT.as_secs()));
        let handle = &self.handle;
        let request = &request;
        handle
            .retry(DEFAULT_ATTEMPTS, "delete")
            .run(ctx, move || async move {
                let response = tokio::time::timeout(DELETE_TIMEOUT, handle.send(request.clone()))
                    .await
                    .map_err(|_| {
                        StoreError::transport_retryable(format!(
                            "delete of {} timed out after {:?}",
                            id, DELETE_TIMEOUT
                        ))
                    })??;
                if response.is_success() || response.is_not_found() {
                    return Ok(());
                }
                Err(error_from_response(&response))
            })
            .await
    }

    /// Indexes many documents through the bulk writer. Empty input is a no-op.
    pub async fn index_documents<T: Serialize>(
        &self,
        ctx: &RequestContext,
        documents: &[IndexDocument<T>],
    ) -> StoreResult<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let actions = documents
            .iter()
            .map(|doc| WriteAction::index(doc.id.clone(), doc.routing.clone(), &doc.body))
            .collect::<StoreResult<Vec<_>>>()?;
        self.bulk.process_items(ctx, &actions).await
    }

    /// Deletes many documents through the bulk writer. Empty input is a no-op.
    pub async fn delete_documents(&self, ctx: &RequestContext, documents: &[DocumentRef]) -> StoreResult<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let actions: Vec<WriteAction> = documents
            .iter()
            .map(|doc| WriteAction::delete(doc.id.clone(), doc.routing.clone()))
            .collect();
        self.bulk.process_items(ctx, &actions).await
    }

    /// Opens a scroll cursor and returns its first page.
    pub async fn scroll_search(
        &self,
        ctx: &RequestContext,
        query: &Query,
        page_size: usize,
        keep_alive: Duration,
    ) -> StoreResult<SearchResponse> {
        let request = HttpRequest::new(Method::Get, [self.name(), "_search"])
            .with_query("scroll", keep_alive_param(keep_alive))
            .with_query("size", page_size.to_string())
            .with_json(query)?;
        self.run_search(ctx, "scroll search", request).await
    }

    /// Fetches the next page of an open scroll cursor.
    pub async fn scroll_next(
        &self,
        ctx: &RequestContext,
        scroll_id: &str,
        keep_alive: Duration,
    ) -> StoreResult<SearchResponse> {
        let request = HttpRequest::new(Method::Post, ["_search", "scroll"]).with_json(&serde_json::json!({
            "scroll": keep_alive_param(keep_alive),
            "scroll_id": scroll_id,
        }))?;
        self.run_search(ctx, "scroll", request).await
    }

    /// Releases scroll cursors. Unknown or expired cursors are not an error.
    pub async fn clear_scroll(&self, ctx: &RequestContext, scroll_ids: &[String]) -> StoreResult<()> {
        if scroll_ids.is_empty() {
            return Ok(());
        }
        let request = HttpRequest::new(Method::Delete, ["_search", "scroll"])
            .with_json(&serde_json::json!({ "scroll_id": scroll_ids }))?;
        let response = ctx.run(self.handle.send(request)).await?;
        if response.is_success() || response.is_not_found() {
            return Ok(());
        }
        Err(error_from_response(&response))
    }
}

fn keep_alive_param(keep_alive: Duration) -> String {
    format!("{}ms", keep_alive.as_millis())
}
