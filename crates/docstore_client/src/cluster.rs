//! Named cluster connections built at startup.

use crate::collection::Connection;
use crate::config::ClusterConfigMap;
use crate::error::{StoreError, StoreResult};
use crate::http::PooledHttpClient;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Connections keyed by lowercase cluster name.
#[derive(Debug, Clone, Default)]
pub struct ClusterClients {
    connections: HashMap<String, Connection>,
}

impl ClusterClients {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one pooled connection per configured cluster.
    ///
    /// Clusters with `discoverNodesOnStart` are asked for their nodes once;
    /// a failed discovery is logged and the configured addresses are kept.
    /// A non-zero `discoverNodesInterval` starts periodic discovery.
    pub async fn initialize(configs: &ClusterConfigMap) -> StoreResult<Self> {
        let mut clients = Self::new();
        for (name, config) in configs.iter() {
            let http = PooledHttpClient::new(config)?;

            if config.discover_nodes_on_start {
                if let Err(e) = http.discover_nodes().await {
                    warn!("initial node discovery for {} failed: {}", name, e);
                }
            }
            if !config.discover_nodes_interval.is_zero() {
                http.spawn_discovery(config.discover_nodes_interval);
            }

            info!("cluster {} ready with nodes {:?}", name, http.nodes());
            clients.insert(name, Connection::new(Arc::new(http)));
        }
        Ok(clients)
    }

    /// Registers a connection under `name`.
    pub fn insert(&mut self, name: &str, connection: Connection) {
        self.connections.insert(name.to_lowercase(), connection);
    }

    /// Looks up a connection by name, ignoring case.
    pub fn get(&self, name: &str) -> StoreResult<&Connection> {
        self.connections
            .get(&name.to_lowercase())
            .ok_or_else(|| StoreError::Internal(format!("cluster {} is not configured", name)))
    }
}
