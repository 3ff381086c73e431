//! In-memory search cluster.
//!
//! [`FakeCluster`] implements [`HttpClient`] and answers the subset of the
//! search HTTP API the client uses: document get/head/put/delete, search with
//! `match_all`, `ids`, `term` and `bool` queries, counts, scroll cursors with
//! rotating tokens, clear-scroll, NDJSON bulk and node info. Faults can be
//! injected per request and every request is logged.
//!
//! Documents are kept per index in id order, so hit order is deterministic.

use async_trait::async_trait;
use bytes::Bytes;
use docstore_client::{HttpClient, HttpRequest, HttpResponse, Method, StoreError, StoreResult};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SIZE: usize = 10;
const SHARDS: u32 = 5;

/// A failure injected into a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Answer with this status and an error envelope.
    Status(u16),
    /// Fail before any response, as a dropped connection would.
    Transport,
    /// Answer normally but report one failed shard.
    ShardFailure,
    /// Answer normally after a delay.
    Latency(Duration),
}

#[derive(Debug)]
struct FaultRule {
    path_fragment: Option<String>,
    fault: Fault,
    remaining: usize,
}

#[derive(Debug, Clone)]
struct StoredDoc {
    source: Value,
    routing: Option<String>,
    version: i64,
}

#[derive(Debug)]
struct ScrollContext {
    index: String,
    ids: Vec<String>,
    position: usize,
    size: usize,
}

#[derive(Debug)]
struct State {
    indices: HashMap<String, BTreeMap<String, StoredDoc>>,
    auto_create_index: bool,
    scrolls: HashMap<String, ScrollContext>,
    scroll_seq: u64,
    released_scrolls: Vec<String>,
    faults: Vec<FaultRule>,
    rejected_ids: HashSet<String>,
    bulk_batches: Vec<usize>,
    publish_addresses: Vec<String>,
    requests: Vec<HttpRequest>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            indices: HashMap::new(),
            auto_create_index: true,
            scrolls: HashMap::new(),
            scroll_seq: 0,
            released_scrolls: Vec::new(),
            faults: Vec::new(),
            rejected_ids: HashSet::new(),
            bulk_batches: Vec::new(),
            publish_addresses: vec!["127.0.0.1:9200".into()],
            requests: Vec::new(),
        }
    }
}

/// An in-memory cluster speaking the search HTTP API.
#[derive(Debug, Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    /// Creates an empty cluster.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates an empty index.
    pub fn create_index(&self, index: &str) {
        self.state.lock().indices.entry(index.to_owned()).or_default();
    }

    /// Makes writes to a missing index fail with 404 instead of creating it.
    pub fn disable_auto_create_index(&self) {
        self.state.lock().auto_create_index = false;
    }

    /// Stores a document, creating the index if needed.
    pub fn insert(&self, index: &str, id: &str, source: Value) {
        self.insert_routed(index, id, None, source);
    }

    /// Stores a document with a routing key.
    pub fn insert_routed(&self, index: &str, id: &str, routing: Option<&str>, source: Value) {
        let mut state = self.state.lock();
        let docs = state.indices.entry(index.to_owned()).or_default();
        put_doc(docs, id, routing.map(str::to_owned), source);
    }

    /// Returns a stored document source.
    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        let state = self.state.lock();
        state
            .indices
            .get(index)
            .and_then(|docs| docs.get(id))
            .map(|doc| doc.source.clone())
    }

    /// Returns the routing key a document was stored with.
    pub fn routing_of(&self, index: &str, id: &str) -> Option<String> {
        let state = self.state.lock();
        state
            .indices
            .get(index)
            .and_then(|docs| docs.get(id))
            .and_then(|doc| doc.routing.clone())
    }

    /// Returns the number of documents in an index.
    pub fn document_count(&self, index: &str) -> usize {
        self.state.lock().indices.get(index).map_or(0, BTreeMap::len)
    }

    /// Fails the next request, whatever its path.
    pub fn fail_next(&self, fault: Fault) {
        self.push_fault(None, fault, 1);
    }

    /// Fails the next `times` requests whose path contains `path_fragment`.
    pub fn fail_times(&self, path_fragment: &str, times: usize, fault: Fault) {
        self.push_fault(Some(path_fragment.to_owned()), fault, times);
    }

    fn push_fault(&self, path_fragment: Option<String>, fault: Fault, times: usize) {
        self.state.lock().faults.push(FaultRule {
            path_fragment,
            fault,
            remaining: times,
        });
    }

    /// Makes bulk items for these ids fail with a per-item error.
    pub fn reject_bulk_ids<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .lock()
            .rejected_ids
            .extend(ids.into_iter().map(Into::into));
    }

    /// Sets the `publish_address` values reported by node info.
    pub fn set_publish_addresses<I, S>(&self, addresses: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().publish_addresses = addresses.into_iter().map(Into::into).collect();
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.lock().requests.clone()
    }

    /// Counts requests whose path contains `path_fragment`.
    pub fn requests_to(&self, path_fragment: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|request| request.path_string().contains(path_fragment))
            .count()
    }

    /// Returns the number of actions in each bulk request, in order.
    pub fn bulk_batches(&self) -> Vec<usize> {
        self.state.lock().bulk_batches.clone()
    }

    /// Returns every scroll id named in a clear-scroll request.
    pub fn released_scroll_ids(&self) -> Vec<String> {
        self.state.lock().released_scrolls.clone()
    }

    /// Returns the number of scroll cursors still open.
    pub fn open_scroll_count(&self) -> usize {
        self.state.lock().scrolls.len()
    }

    /// Waits until no scroll cursor is open, up to one second.
    pub async fn wait_for_scrolls_released(&self) -> bool {
        for _ in 0..200 {
            if self.open_scroll_count() == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.open_scroll_count() == 0
    }
}

#[async_trait]
impl HttpClient for FakeCluster {
    async fn send(&self, request: HttpRequest) -> StoreResult<HttpResponse> {
        let fault = {
            let mut state = self.state.lock();
            state.requests.push(request.clone());
            state.take_fault(&request.path_string())
        };

        let mut shard_failure = false;
        match fault {
            Some(Fault::Transport) => {
                return Err(StoreError::transport_retryable(
                    "connection reset by fake cluster",
                ))
            }
            Some(Fault::Status(status)) => {
                return Ok(error_response(status, "fake_fault_exception", "injected failure"))
            }
            Some(Fault::Latency(delay)) => tokio::time::sleep(delay).await,
            Some(Fault::ShardFailure) => shard_failure = true,
            None => {}
        }

        Ok(self.state.lock().handle(&request, shard_failure))
    }
}

impl State {
    fn take_fault(&mut self, path: &str) -> Option<Fault> {
        let position = self.faults.iter().position(|rule| {
            rule.path_fragment
                .as_deref()
                .map_or(true, |fragment| path.contains(fragment))
        })?;
        let rule = &mut self.faults[position];
        let fault = rule.fault.clone();
        rule.remaining -= 1;
        if rule.remaining == 0 {
            self.faults.remove(position);
        }
        Some(fault)
    }

    fn handle(&mut self, request: &HttpRequest, shard_failure: bool) -> HttpResponse {
        let path: Vec<&str> = request.path.iter().map(String::as_str).collect();
        let method = request.wire_method();

        match (method, path.as_slice()) {
            (Method::Get, ["_nodes", "http"]) => self.nodes_info(),
            (Method::Post, ["_bulk"]) => self.bulk(request),
            (Method::Get | Method::Post, ["_search", "scroll"]) => self.scroll_next(request, shard_failure),
            (Method::Delete, ["_search", "scroll"]) => self.clear_scroll(request),
            (Method::Get | Method::Post, [index, "_search"]) => self.search(index, request, shard_failure),
            (Method::Get | Method::Post, [index, "_count"]) => self.count(index, request, shard_failure),
            (Method::Get, [index, "_doc", id]) => self.get_doc(index, id),
            (Method::Head, [index, "_doc", id]) => self.head_doc(index, id),
            (Method::Put | Method::Post, [index, "_doc", id]) => self.put_doc(index, id, request),
            (Method::Delete, [index, "_doc", id]) => self.delete_doc(index, id),
            _ => error_response(
                400,
                "illegal_argument_exception",
                &format!("no handler for {} {}", method, request.path_string()),
            ),
        }
    }

    fn nodes_info(&self) -> HttpResponse {
        let nodes: serde_json::Map<String, Value> = self
            .publish_addresses
            .iter()
            .enumerate()
            .map(|(i, address)| {
                (
                    format!("node-{}", i),
                    json!({"name": format!("node-{}", i), "http": {"publish_address": address}}),
                )
            })
            .collect();
        json_response(200, json!({ "nodes": nodes }))
    }

    fn search(&mut self, index: &str, request: &HttpRequest, shard_failure: bool) -> HttpResponse {
        let body = match request_body(request) {
            Ok(body) => body,
            Err(response) => return response,
        };
        let Some(docs) = self.indices.get(index) else {
            return index_missing(index);
        };

        let matching: Vec<String> = docs
            .iter()
            .filter(|(id, doc)| matches(&body["query"], id, doc))
            .map(|(id, _)| id.clone())
            .collect();
        let size = request
            .query_param("size")
            .and_then(|size| size.parse().ok())
            .or_else(|| body["size"].as_u64().map(|size| size as usize))
            .unwrap_or(DEFAULT_SIZE);
        let page: Vec<String> = matching.iter().take(size).cloned().collect();
        let hits = hits_json(index, docs, &page);

        let scroll_id = request.query_param("scroll").map(|_| {
            let scroll_id = self.next_scroll_id();
            self.scrolls.insert(
                scroll_id.clone(),
                ScrollContext {
                    index: index.to_owned(),
                    position: page.len(),
                    ids: matching,
                    size,
                },
            );
            scroll_id
        });

        search_response(hits, scroll_id, shard_failure)
    }

    fn scroll_next(&mut self, request: &HttpRequest, shard_failure: bool) -> HttpResponse {
        let body = match request_body(request) {
            Ok(body) => body,
            Err(response) => return response,
        };
        let Some(old_id) = body["scroll_id"].as_str() else {
            return error_response(400, "action_request_validation_exception", "scroll_id is missing");
        };
        let Some(mut context) = self.scrolls.remove(old_id) else {
            return error_response(
                404,
                "search_context_missing_exception",
                &format!("No search context found for id [{}]", old_id),
            );
        };

        let end = (context.position + context.size).min(context.ids.len());
        let page: Vec<String> = context.ids[context.position..end].to_vec();
        context.position = end;
        let hits = match self.indices.get(&context.index) {
            Some(docs) => hits_json(&context.index, docs, &page),
            None => Vec::new(),
        };

        let new_id = self.next_scroll_id();
        self.scrolls.insert(new_id.clone(), context);
        search_response(hits, Some(new_id), shard_failure)
    }

    fn clear_scroll(&mut self, request: &HttpRequest) -> HttpResponse {
        let body = match request_body(request) {
            Ok(body) => body,
            Err(response) => return response,
        };
        let ids: Vec<String> = match &body["scroll_id"] {
            Value::String(id) => vec![id.clone()],
            Value::Array(ids) => ids.iter().filter_map(|id| id.as_str().map(str::to_owned)).collect(),
            _ => Vec::new(),
        };

        let mut freed = 0;
        for id in &ids {
            if self.scrolls.remove(id).is_some() {
                freed += 1;
            }
        }
        self.released_scrolls.extend(ids);

        if freed == 0 {
            return json_response(404, json!({"succeeded": true, "num_freed": 0}));
        }
        json_response(200, json!({"succeeded": true, "num_freed": freed}))
    }

    fn count(&self, index: &str, request: &HttpRequest, shard_failure: bool) -> HttpResponse {
        let body = match request_body(request) {
            Ok(body) => body,
            Err(response) => return response,
        };
        let Some(docs) = self.indices.get(index) else {
            return index_missing(index);
        };
        let count = docs
            .iter()
            .filter(|(id, doc)| matches(&body["query"], id, doc))
            .count();
        json_response(200, json!({"count": count, "_shards": shards_json(shard_failure)}))
    }

    fn get_doc(&self, index: &str, id: &str) -> HttpResponse {
        let Some(docs) = self.indices.get(index) else {
            return index_missing(index);
        };
        match docs.get(id) {
            Some(doc) => json_response(
                200,
                json!({
                    "_index": index,
                    "_id": id,
                    "_version": doc.version,
                    "_routing": doc.routing,
                    "found": true,
                    "_source": doc.source,
                }),
            ),
            None => json_response(404, json!({"_index": index, "_id": id, "found": false})),
        }
    }

    fn head_doc(&self, index: &str, id: &str) -> HttpResponse {
        let found = self
            .indices
            .get(index)
            .is_some_and(|docs| docs.contains_key(id));
        HttpResponse::new(if found { 200 } else { 404 }, Bytes::new())
    }

    fn put_doc(&mut self, index: &str, id: &str, request: &HttpRequest) -> HttpResponse {
        let source = match request_body(request) {
            Ok(Value::Null) => {
                return error_response(400, "parse_exception", "request body is required")
            }
            Ok(source) => source,
            Err(response) => return response,
        };
        if !self.indices.contains_key(index) && !self.auto_create_index {
            return index_missing(index);
        }
        let docs = self.indices.entry(index.to_owned()).or_default();
        let routing = request.query_param("routing").map(str::to_owned);
        let (version, created) = put_doc(docs, id, routing, source);
        json_response(
            if created { 201 } else { 200 },
            json!({
                "_index": index,
                "_id": id,
                "_version": version,
                "result": if created { "created" } else { "updated" },
            }),
        )
    }

    fn delete_doc(&mut self, index: &str, id: &str) -> HttpResponse {
        let Some(docs) = self.indices.get_mut(index) else {
            return index_missing(index);
        };
        match docs.remove(id) {
            Some(_) => json_response(200, json!({"_index": index, "_id": id, "result": "deleted"})),
            None => json_response(404, json!({"_index": index, "_id": id, "result": "not_found"})),
        }
    }

    fn bulk(&mut self, request: &HttpRequest) -> HttpResponse {
        let body = request.body.clone().unwrap_or_default();
        let Ok(text) = std::str::from_utf8(&body) else {
            return error_response(400, "illegal_argument_exception", "bulk body is not UTF-8");
        };

        let mut lines = text.lines().filter(|line| !line.trim().is_empty());
        let mut items = Vec::new();
        let mut errors = false;

        while let Some(line) = lines.next() {
            let Ok(Value::Object(action)) = serde_json::from_str::<Value>(line) else {
                return error_response(400, "illegal_argument_exception", "malformed action line");
            };
            let Some((op, meta)) = action.into_iter().next() else {
                return error_response(400, "illegal_argument_exception", "empty action line");
            };
            let (Some(index), Some(id)) = (meta["_index"].as_str(), meta["_id"].as_str()) else {
                return error_response(400, "action_request_validation_exception", "_index and _id are required");
            };
            let routing = meta["routing"].as_str().map(str::to_owned);

            let source = match op.as_str() {
                "index" | "create" => {
                    let Some(source_line) = lines.next() else {
                        return error_response(400, "illegal_argument_exception", "missing source line");
                    };
                    match serde_json::from_str::<Value>(source_line) {
                        Ok(source) => Some(source),
                        Err(_) => {
                            return error_response(400, "illegal_argument_exception", "malformed source line")
                        }
                    }
                }
                "delete" => None,
                other => {
                    return error_response(
                        400,
                        "illegal_argument_exception",
                        &format!("unsupported bulk action {}", other),
                    )
                }
            };

            if self.rejected_ids.contains(id) {
                errors = true;
                items.push(json!({ (op.clone()): {
                    "_index": index,
                    "_id": id,
                    "status": 400,
                    "error": {"type": "mapper_parsing_exception", "reason": format!("document {} rejected", id)},
                }}));
                continue;
            }

            let item = match source {
                Some(source) => {
                    let docs = self.indices.entry(index.to_owned()).or_default();
                    let (version, created) = put_doc(docs, id, routing, source);
                    json!({"_index": index, "_id": id, "_version": version,
                           "status": if created { 201 } else { 200 },
                           "result": if created { "created" } else { "updated" }})
                }
                None => {
                    let removed = self
                        .indices
                        .get_mut(index)
                        .and_then(|docs| docs.remove(id))
                        .is_some();
                    json!({"_index": index, "_id": id,
                           "status": if removed { 200 } else { 404 },
                           "result": if removed { "deleted" } else { "not_found" }})
                }
            };
            items.push(json!({ (op.clone()): item }));
        }

        self.bulk_batches.push(items.len());
        json_response(200, json!({"took": 1, "errors": errors, "items": items}))
    }

    fn next_scroll_id(&mut self) -> String {
        self.scroll_seq += 1;
        format!("scroll-{}", self.scroll_seq)
    }
}

/// Stores a document, returning its new version and whether it was created.
fn put_doc(
    docs: &mut BTreeMap<String, StoredDoc>,
    id: &str,
    routing: Option<String>,
    source: Value,
) -> (i64, bool) {
    match docs.get_mut(id) {
        Some(doc) => {
            doc.version += 1;
            doc.source = source;
            doc.routing = routing;
            (doc.version, false)
        }
        None => {
            docs.insert(
                id.to_owned(),
                StoredDoc {
                    source,
                    routing,
                    version: 1,
                },
            );
            (1, true)
        }
    }
}

fn matches(query: &Value, id: &str, doc: &StoredDoc) -> bool {
    let Some((kind, params)) = query.as_object().and_then(|clause| clause.iter().next()) else {
        return true;
    };
    match kind.as_str() {
        "match_all" => true,
        "ids" => params["values"].as_array().is_some_and(|values| {
            values.iter().any(|value| match value {
                Value::String(value) => value == id,
                other => other.to_string() == id,
            })
        }),
        "term" => params
            .as_object()
            .and_then(|fields| fields.iter().next())
            .is_some_and(|(field, expected)| {
                let expected = expected.get("value").unwrap_or(expected);
                lookup(&doc.source, field) == Some(expected)
            }),
        "bool" => {
            let all = |key: &str| {
                params[key]
                    .as_array()
                    .map_or(true, |clauses| clauses.iter().all(|clause| matches(clause, id, doc)))
            };
            let none = params["must_not"]
                .as_array()
                .map_or(true, |clauses| !clauses.iter().any(|clause| matches(clause, id, doc)));
            all("must") && all("filter") && none
        }
        _ => false,
    }
}

fn lookup<'a>(source: &'a Value, field: &str) -> Option<&'a Value> {
    field.split('.').try_fold(source, |value, key| value.get(key))
}

fn hits_json(index: &str, docs: &BTreeMap<String, StoredDoc>, ids: &[String]) -> Vec<Value> {
    ids.iter()
        .filter_map(|id| docs.get(id).map(|doc| (id, doc)))
        .map(|(id, doc)| {
            json!({
                "_index": index,
                "_id": id,
                "_score": 1.0,
                "_routing": doc.routing,
                "_source": doc.source,
            })
        })
        .collect()
}

fn shards_json(shard_failure: bool) -> Value {
    if shard_failure {
        json!({
            "total": SHARDS,
            "successful": SHARDS - 1,
            "skipped": 0,
            "failed": 1,
            "failures": [{
                "shard": 0,
                "index": "fake",
                "node": "node-0",
                "reason": {"type": "node_disconnected_exception", "reason": "injected shard failure"}
            }]
        })
    } else {
        json!({"total": SHARDS, "successful": SHARDS, "skipped": 0, "failed": 0})
    }
}

fn search_response(hits: Vec<Value>, scroll_id: Option<String>, shard_failure: bool) -> HttpResponse {
    let mut body = json!({
        "took": 1,
        "timed_out": false,
        "_shards": shards_json(shard_failure),
        "hits": {"max_score": 1.0, "hits": hits},
    });
    if let Some(scroll_id) = scroll_id {
        body["_scroll_id"] = Value::String(scroll_id);
    }
    json_response(200, body)
}

fn request_body(request: &HttpRequest) -> Result<Value, HttpResponse> {
    match request.body.as_deref() {
        None | Some([]) => Ok(Value::Null),
        Some(bytes) => serde_json::from_slice(bytes)
            .map_err(|e| error_response(400, "parse_exception", &format!("invalid request body: {}", e))),
    }
}

fn json_response(status: u16, body: Value) -> HttpResponse {
    HttpResponse::new(status, body.to_string()).with_header("content-type", "application/json")
}

fn error_response(status: u16, kind: &str, reason: &str) -> HttpResponse {
    json_response(
        status,
        json!({"error": {"type": kind, "reason": reason}, "status": status}),
    )
}

fn index_missing(index: &str) -> HttpResponse {
    error_response(
        404,
        "index_not_found_exception",
        &format!("no such index [{}]", index),
    )
}
