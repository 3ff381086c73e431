//! Pooled HTTP transport over `reqwest`.
//!
//! [`PooledHttpClient`] keeps one keep-alive connection pool shared by all
//! collections of a cluster and spreads requests over the known nodes
//! round-robin. It always advertises gzip and hands back fully decompressed
//! bodies, so responses never reference pooled buffers after the call.

use crate::config::ClusterConfig;
use crate::error::{StoreError, StoreResult};
use crate::model::error_from_response;
use crate::transport::{HttpClient, HttpRequest, HttpResponse, Method};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Url;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Round-robin list of cluster nodes.
#[derive(Debug)]
pub struct NodePool {
    nodes: RwLock<Vec<Url>>,
    next: AtomicUsize,
}

impl NodePool {
    /// Creates a pool from node addresses.
    pub fn parse<S: AsRef<str>>(addresses: &[S]) -> StoreResult<Self> {
        let nodes = addresses
            .iter()
            .map(|address| parse_node_url(address.as_ref()))
            .collect::<StoreResult<Vec<_>>>()?;
        if nodes.is_empty() {
            return Err(StoreError::transport_fatal("no cluster addresses configured"));
        }
        Ok(Self {
            nodes: RwLock::new(nodes),
            next: AtomicUsize::new(0),
        })
    }

    /// Returns the next node in round-robin order.
    pub fn next(&self) -> Url {
        let nodes = self.nodes.read();
        let index = self.next.fetch_add(1, Ordering::Relaxed) % nodes.len();
        nodes[index].clone()
    }

    /// Returns the scheme of the first node without advancing the rotation.
    pub fn scheme(&self) -> String {
        self.nodes
            .read()
            .first()
            .map_or_else(|| "http".to_owned(), |url| url.scheme().to_owned())
    }

    /// Returns a snapshot of the node list.
    pub fn nodes(&self) -> Vec<Url> {
        self.nodes.read().clone()
    }

    /// Replaces the node list; an empty list is ignored.
    pub fn replace(&self, nodes: Vec<Url>) {
        if nodes.is_empty() {
            return;
        }
        *self.nodes.write() = nodes;
    }
}

fn parse_node_url(address: &str) -> StoreResult<Url> {
    let url = Url::parse(address)
        .map_err(|e| StoreError::transport_fatal(format!("invalid node address {:?}: {}", address, e)))?;
    if url.cannot_be_a_base() {
        return Err(StoreError::transport_fatal(format!(
            "node address {:?} cannot carry a path",
            address
        )));
    }
    Ok(url)
}

/// Turns a `publish_address` (`host/ip:port` or `ip:port`) into a node URL.
fn node_from_publish_address(scheme: &str, publish_address: &str) -> StoreResult<Url> {
    let address = match publish_address.split_once('/') {
        Some((host, ip_and_port)) if !host.is_empty() => {
            let port = ip_and_port.rsplit_once(':').map(|(_, port)| port).ok_or_else(|| {
                StoreError::Decode(format!("publish address {:?} has no port", publish_address))
            })?;
            format!("{}:{}", host, port)
        }
        Some((_, ip_and_port)) => ip_and_port.to_owned(),
        None => publish_address.to_owned(),
    };
    parse_node_url(&format!("{}://{}", scheme, address))
}

#[derive(Debug, Deserialize)]
struct NodesInfo {
    #[serde(default)]
    nodes: HashMap<String, NodeInfo>,
}

#[derive(Debug, Deserialize)]
struct NodeInfo {
    #[serde(default)]
    http: Option<NodeHttp>,
}

#[derive(Debug, Deserialize)]
struct NodeHttp {
    publish_address: String,
}

struct Inner {
    client: reqwest::Client,
    pool: NodePool,
    scheme: String,
}

/// Connection-pooled [`HttpClient`] for one cluster.
#[derive(Clone)]
pub struct PooledHttpClient {
    inner: Arc<Inner>,
}

impl PooledHttpClient {
    /// Builds a client from cluster configuration.
    ///
    /// Zero timeouts fall back to [`crate::DEFAULT_TIMEOUT`].
    pub fn new(config: &ClusterConfig) -> StoreResult<Self> {
        let pool = NodePool::parse(&config.address_list())?;
        let scheme = pool.scheme();

        let idle_timeout =
            (!config.max_idle_conn_duration.is_zero()).then_some(config.max_idle_conn_duration);
        let read_timeout = config.effective_read_timeout();
        let write_timeout = config.effective_write_timeout();

        // reqwest has one whole-request timeout; the write budget also bounds connecting
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.max_idle_conn_per_host)
            .pool_idle_timeout(idle_timeout)
            .connect_timeout(write_timeout)
            .timeout(read_timeout + write_timeout)
            .gzip(true)
            .build()
            .map_err(|e| StoreError::transport_fatal(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                pool,
                scheme,
            }),
        })
    }

    /// Returns the current node list.
    pub fn nodes(&self) -> Vec<Url> {
        self.inner.pool.nodes()
    }

    /// Asks the cluster for its HTTP nodes and replaces the node list.
    ///
    /// Returns the number of discovered nodes. On failure the existing list
    /// is kept.
    pub async fn discover_nodes(&self) -> StoreResult<usize> {
        discover(&self.inner).await
    }

    /// Runs discovery every `interval` until the client is dropped.
    pub fn spawn_discovery(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    debug!("http client dropped, stopping node discovery");
                    return;
                };
                if let Err(e) = discover(&inner).await {
                    warn!("node discovery failed, keeping current nodes: {}", e);
                }
            }
        })
    }
}

impl std::fmt::Debug for PooledHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledHttpClient")
            .field("nodes", &self.inner.pool.nodes())
            .finish()
    }
}

async fn discover(inner: &Inner) -> StoreResult<usize> {
    let response = send(inner, HttpRequest::new(Method::Get, ["_nodes", "http"])).await?;
    if !response.is_success() {
        return Err(error_from_response(&response));
    }
    let info: NodesInfo = response.json()?;

    let mut nodes = Vec::new();
    for (id, node) in info.nodes {
        let Some(http) = node.http else {
            debug!("node {} has no http section", id);
            continue;
        };
        match node_from_publish_address(&inner.scheme, &http.publish_address) {
            Ok(url) => nodes.push(url),
            Err(e) => warn!("skipping node {}: {}", id, e),
        }
    }
    if nodes.is_empty() {
        return Err(StoreError::Internal("node discovery found no http nodes".into()));
    }

    nodes.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    let count = nodes.len();
    info!("discovered {} cluster nodes: {:?}", count, nodes);
    inner.pool.replace(nodes);
    Ok(count)
}

fn request_url(inner: &Inner, request: &HttpRequest) -> StoreResult<Url> {
    let mut url = inner.pool.next();
    url.path_segments_mut()
        .map_err(|_| StoreError::transport_fatal("node address cannot carry a path"))?
        .pop_if_empty()
        .extend(request.path.iter());
    if !request.query.is_empty() {
        url.query_pairs_mut().extend_pairs(request.query.iter());
    }
    Ok(url)
}

async fn send(inner: &Inner, request: HttpRequest) -> StoreResult<HttpResponse> {
    let url = request_url(inner, &request)?;
    let method = match request.wire_method() {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
    };

    let mut builder = inner.client.request(method, url.clone());
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = request.body {
        builder = builder.body(body);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| StoreError::transport_retryable(format!("{} {}: {}", request.method, url, e)))?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = response
        .bytes()
        .await
        .map_err(|e| StoreError::transport_retryable(format!("reading body from {}: {}", url, e)))?;

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

#[async_trait]
impl HttpClient for PooledHttpClient {
    async fn send(&self, request: HttpRequest) -> StoreResult<HttpResponse> {
        send(&self.inner, request).await
    }
}
