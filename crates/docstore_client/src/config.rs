//! Configuration for cluster connections, retries and bulk batching.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Timeout applied when a configured timeout is zero.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for one search cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterConfig {
    /// Comma-joined node addresses (e.g. `"http://a:9200, http://b:9200"`).
    pub addresses: String,
    /// Maximum idle pooled connections kept per host.
    pub max_idle_conn_per_host: usize,
    /// How long an idle pooled connection is kept.
    #[serde(with = "duration_format")]
    pub max_idle_conn_duration: Duration,
    /// Interval between node discovery rounds; zero disables periodic discovery.
    #[serde(with = "duration_format")]
    pub discover_nodes_interval: Duration,
    /// Whether to discover nodes once when the client starts.
    pub discover_nodes_on_start: bool,
    /// Read timeout; zero means the adapter default.
    #[serde(with = "duration_format")]
    pub read_timeout: Duration,
    /// Write timeout; zero means the adapter default.
    #[serde(with = "duration_format")]
    pub write_timeout: Duration,
}

impl ClusterConfig {
    /// Creates a configuration for the given comma-joined addresses.
    pub fn new(addresses: impl Into<String>) -> Self {
        Self {
            addresses: addresses.into(),
            ..Self::default()
        }
    }

    /// Sets the maximum idle connections per host.
    pub fn with_max_idle_conn_per_host(mut self, max: usize) -> Self {
        self.max_idle_conn_per_host = max;
        self
    }

    /// Sets the idle connection duration.
    pub fn with_max_idle_conn_duration(mut self, duration: Duration) -> Self {
        self.max_idle_conn_duration = duration;
        self
    }

    /// Sets the node discovery interval.
    pub fn with_discover_nodes_interval(mut self, interval: Duration) -> Self {
        self.discover_nodes_interval = interval;
        self
    }

    /// Enables node discovery on start.
    pub fn with_discover_nodes_on_start(mut self, enabled: bool) -> Self {
        self.discover_nodes_on_start = enabled;
        self
    }

    /// Sets the read and write timeouts.
    pub fn with_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    /// Splits the address string into individual node addresses.
    ///
    /// Whitespace is removed and empty entries are skipped.
    pub fn address_list(&self) -> Vec<String> {
        self.addresses
            .replace(' ', "")
            .split(',')
            .filter(|address| !address.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Read timeout with zero replaced by [`DEFAULT_TIMEOUT`].
    pub fn effective_read_timeout(&self) -> Duration {
        non_zero_or_default(self.read_timeout)
    }

    /// Write timeout with zero replaced by [`DEFAULT_TIMEOUT`].
    pub fn effective_write_timeout(&self) -> Duration {
        non_zero_or_default(self.write_timeout)
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            addresses: "http://localhost:9200".into(),
            max_idle_conn_per_host: 512,
            max_idle_conn_duration: Duration::from_secs(10),
            discover_nodes_interval: Duration::ZERO,
            discover_nodes_on_start: false,
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
        }
    }
}

fn non_zero_or_default(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        DEFAULT_TIMEOUT
    } else {
        timeout
    }
}

/// Cluster configurations keyed by lowercase cluster name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, ClusterConfig>")]
pub struct ClusterConfigMap {
    clusters: HashMap<String, ClusterConfig>,
}

impl ClusterConfigMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cluster configuration.
    pub fn insert(&mut self, name: &str, config: ClusterConfig) {
        self.clusters.insert(name.to_lowercase(), config);
    }

    /// Looks up a cluster configuration by name, ignoring case.
    pub fn get(&self, name: &str) -> StoreResult<&ClusterConfig> {
        self.clusters
            .get(&name.to_lowercase())
            .ok_or_else(|| StoreError::Internal(format!("{} config not found", name)))
    }

    /// Iterates over `(name, config)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClusterConfig)> {
        self.clusters.iter().map(|(name, config)| (name.as_str(), config))
    }

    /// Returns the number of configured clusters.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Returns true if no cluster is configured.
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

impl From<HashMap<String, ClusterConfig>> for ClusterConfigMap {
    fn from(raw: HashMap<String, ClusterConfig>) -> Self {
        let mut map = Self::new();
        for (name, config) in raw {
            map.insert(&name, config);
        }
        map
    }
}

/// Delay schedule between retry attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl BackoffConfig {
    /// Creates a schedule with no delay between attempts.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.add_jitter = enabled;
        self
    }

    /// Calculates the delay after the given failed attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        let total_secs = if self.add_jitter {
            // Up to 25% jitter
            delay_secs + delay_secs * 0.25 * rand::random::<f64>()
        } else {
            delay_secs
        };
        Duration::try_from_secs_f64(total_secs).unwrap_or(self.max_delay)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

/// Bounds for one bulk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkConfig {
    /// Maximum number of actions per request.
    pub max_items: usize,
    /// Maximum serialized size of a request body in bytes.
    pub max_bytes: usize,
}

impl BulkConfig {
    /// Creates bulk bounds.
    pub fn new(max_items: usize, max_bytes: usize) -> Self {
        Self {
            max_items: max_items.max(1),
            max_bytes,
        }
    }
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self::new(1000, 10 * 1024 * 1024)
    }
}

/// Parses `"250ms"`, `"10s"`, `"1.5m"`, `"2h"` or a bare number of milliseconds.
pub(crate) fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid duration: {:?}", text))?;
    let millis = match unit.trim() {
        "" | "ms" => value,
        "s" => value * 1_000.0,
        "m" => value * 60_000.0,
        "h" => value * 3_600_000.0,
        other => return Err(format!("unknown duration unit {:?} in {:?}", other, text)),
    };
    Duration::try_from_secs_f64(millis / 1_000.0)
        .map_err(|e| format!("duration {:?} out of range: {}", text, e))
}

mod duration_format {
    use super::parse_duration;
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Millis(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match RawDuration::deserialize(deserializer)? {
            RawDuration::Millis(millis) => Ok(Duration::from_millis(millis)),
            RawDuration::Text(text) => parse_duration(&text).map_err(de::Error::custom),
        }
    }
}
