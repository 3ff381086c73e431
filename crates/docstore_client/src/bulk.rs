//! Size-bounded bulk writes.
//!
//! Actions are rendered into the newline-delimited bulk format:
//!
//! ```text
//! {"index":{"_index":"adverts","_id":"1","routing":"1"}}
//! {"title":"bike"}
//! {"delete":{"_index":"adverts","_id":"2"}}
//! ```
//!
//! A batch is flushed before an action that would push it past the item or
//! byte bound, so no action is ever dropped and no batch holds more than
//! `max_items` actions. A single action larger than `max_bytes` still goes
//! out, alone in its batch.

use crate::collection::CollectionHandle;
use crate::config::BulkConfig;
use crate::context::RequestContext;
use crate::error::{StoreError, StoreResult};
use crate::transport::{HttpRequest, Method};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::sync::Arc;
use tracing::debug;

/// One write in a bulk request. Identifiers are always caller-supplied.
#[derive(Debug, Clone)]
pub enum WriteAction {
    /// Create or replace a document.
    Index {
        /// Document identifier.
        id: String,
        /// Routing key.
        routing: Option<String>,
        /// Serialized document.
        source: Box<RawValue>,
    },
    /// Remove a document.
    Delete {
        /// Document identifier.
        id: String,
        /// Routing key.
        routing: Option<String>,
    },
}

impl WriteAction {
    /// Creates an index action, serializing `source` up front.
    pub fn index<T: Serialize + ?Sized>(
        id: impl Into<String>,
        routing: Option<String>,
        source: &T,
    ) -> StoreResult<Self> {
        let source = serde_json::value::to_raw_value(source).map_err(StoreError::serialization)?;
        Ok(Self::Index {
            id: id.into(),
            routing: routing.filter(|r| !r.is_empty()),
            source,
        })
    }

    /// Creates a delete action.
    pub fn delete(id: impl Into<String>, routing: Option<String>) -> Self {
        Self::Delete {
            id: id.into(),
            routing: routing.filter(|r| !r.is_empty()),
        }
    }

    /// Returns the document identifier.
    pub fn id(&self) -> &str {
        match self {
            WriteAction::Index { id, .. } | WriteAction::Delete { id, .. } => id,
        }
    }

    /// Appends the action line (and source line for index actions) to `buf`.
    fn render(&self, collection: &str, buf: &mut Vec<u8>) -> StoreResult<()> {
        let (op, id, routing) = match self {
            WriteAction::Index { id, routing, .. } => ("index", id, routing),
            WriteAction::Delete { id, routing } => ("delete", id, routing),
        };

        buf.extend_from_slice(b"{\"");
        buf.extend_from_slice(op.as_bytes());
        buf.extend_from_slice(b"\":{\"_index\":");
        write_json_str(buf, collection)?;
        buf.extend_from_slice(b",\"_id\":");
        write_json_str(buf, id)?;
        if let Some(routing) = routing {
            buf.extend_from_slice(b",\"routing\":");
            write_json_str(buf, routing)?;
        }
        buf.extend_from_slice(b"}}\n");

        if let WriteAction::Index { source, .. } = self {
            buf.extend_from_slice(source.get().as_bytes());
            buf.push(b'\n');
        }
        Ok(())
    }
}

fn write_json_str(buf: &mut Vec<u8>, value: &str) -> StoreResult<()> {
    serde_json::to_writer(buf, value).map_err(StoreError::serialization)
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl BulkResponse {
    /// Renders every item whose operation result carries a non-null error.
    fn failure_report(&self) -> String {
        self.items
            .iter()
            .filter(|item| {
                item.values()
                    .any(|result| result.get("error").is_some_and(|e| !e.is_null()))
            })
            .map(|item| serde_json::Value::Object(item.clone()).to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Batches write actions into bulk requests for one collection.
#[derive(Debug, Clone)]
pub struct BulkWriter {
    handle: Arc<CollectionHandle>,
    config: BulkConfig,
}

impl BulkWriter {
    pub(crate) fn new(handle: Arc<CollectionHandle>, config: BulkConfig) -> Self {
        Self { handle, config }
    }

    /// Returns the batch bounds.
    pub fn config(&self) -> BulkConfig {
        self.config
    }

    /// Writes `actions` in input order, one bulk request per batch.
    ///
    /// Stops at the first failed batch; batches already submitted stay
    /// applied.
    pub async fn process_items(&self, ctx: &RequestContext, actions: &[WriteAction]) -> StoreResult<()> {
        let mut batch = Vec::new();
        let mut count = 0;
        let mut line = Vec::new();

        for action in actions {
            line.clear();
            action.render(self.handle.name(), &mut line)?;

            let over_items = count + 1 > self.config.max_items;
            let over_bytes = batch.len() + line.len() > self.config.max_bytes;
            if count > 0 && (over_items || over_bytes) {
                self.flush(ctx, &batch, count).await?;
                batch.clear();
                count = 0;
            }

            batch.extend_from_slice(&line);
            count += 1;
        }

        if count > 0 {
            self.flush(ctx, &batch, count).await?;
        }
        Ok(())
    }

    async fn flush(&self, ctx: &RequestContext, batch: &[u8], count: usize) -> StoreResult<()> {
        debug!(
            "flushing bulk batch of {} actions ({} bytes) to {}",
            count,
            batch.len(),
            self.handle.name()
        );

        let request = HttpRequest::new(Method::Post, ["_bulk"])
            .with_header("Content-Type", "application/x-ndjson")
            .with_body(batch.to_vec());
        let response = ctx.run(self.handle.send(request)).await?;

        if !response.is_success() {
            return Err(StoreError::Internal(format!(
                "[{}] bulk request to {} failed: {}",
                response.status,
                self.handle.name(),
                response.text()
            )));
        }

        let parsed: BulkResponse = response.json()?;
        if parsed.errors {
            let report = parsed.failure_report();
            if report.is_empty() {
                return Err(StoreError::Bulk(
                    "response flagged errors without failed items".into(),
                ));
            }
            return Err(StoreError::Bulk(report));
        }
        Ok(())
    }
}
