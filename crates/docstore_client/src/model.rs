//! Wire model of cluster responses.

use crate::aggregation::Aggregations;
use crate::error::{StoreError, StoreResult};
use crate::transport::HttpResponse;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tracing::error;

/// An opaque, caller-built query body.
pub type Query = serde_json::Map<String, serde_json::Value>;

/// Response of a search or scroll request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Server-side time in milliseconds.
    #[serde(default)]
    pub took: u64,
    /// Whether the search timed out.
    #[serde(default)]
    pub timed_out: bool,
    /// Shard outcome summary.
    #[serde(rename = "_shards", default)]
    pub shards: ShardsInfo,
    /// Matching hits.
    #[serde(default)]
    pub hits: SearchHits,
    /// Aggregation results, decoded on access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Aggregations>,
    /// Cursor token for scroll requests.
    #[serde(rename = "_scroll_id", default, skip_serializing_if = "Option::is_none")]
    pub scroll_id: Option<String>,
}

/// The `hits` section of a search response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchHits {
    /// Total hit count, absent when total tracking is off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<TotalHits>,
    /// Highest score among hits.
    #[serde(default)]
    pub max_score: Option<f64>,
    /// Hits in server order.
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

/// Total hit count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalHits {
    /// Count value.
    pub value: u64,
    /// `eq` for exact counts, `gte` for lower bounds.
    pub relation: String,
}

/// One document returned by search or get.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchHit {
    /// Collection the hit came from.
    #[serde(rename = "_index", default)]
    pub index: String,
    /// Document identifier.
    #[serde(rename = "_id", default)]
    pub id: String,
    /// Routing key, if the document was routed.
    #[serde(rename = "_routing", default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    /// Raw document source.
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Box<RawValue>>,
    /// Relevance score.
    #[serde(rename = "_score", default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Document version.
    #[serde(rename = "_version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    /// Set by get requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<bool>,
}

impl SearchHit {
    /// Returns the raw source text.
    pub fn raw_source(&self) -> Option<&str> {
        self.source.as_deref().map(RawValue::get)
    }

    /// Decodes the source into `T`.
    pub fn source_as<T: DeserializeOwned>(&self) -> StoreResult<T> {
        let raw = self
            .raw_source()
            .ok_or_else(|| StoreError::Decode(format!("hit {} has no _source", self.id)))?;
        serde_json::from_str(raw)
            .map_err(|err| StoreError::Decode(format!("hit {}: {}", self.id, err)))
    }
}

/// Shard outcome summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardsInfo {
    /// Shards queried.
    #[serde(default)]
    pub total: u32,
    /// Shards that answered.
    #[serde(default)]
    pub successful: u32,
    /// Shards skipped.
    #[serde(default)]
    pub skipped: u32,
    /// Shards that failed.
    #[serde(default)]
    pub failed: u32,
    /// Per-shard failure details.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ShardFailure>,
}

impl ShardsInfo {
    /// Fails when any shard failed.
    ///
    /// `detail` builds the diagnostic text only on the error path.
    pub fn ensure_complete(&self, detail: impl FnOnce() -> String) -> StoreResult<()> {
        if self.failed == 0 {
            return Ok(());
        }
        let detail = detail();
        error!(
            "{} of {} shards failed: {}",
            self.failed, self.total, detail
        );
        Err(StoreError::ShardFailure {
            failed: self.failed,
            total: self.total,
            detail,
        })
    }
}

/// One shard failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardFailure {
    /// Shard number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<i64>,
    /// Collection name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    /// Node identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    /// Failure cause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ErrorDetails>,
}

/// Response of a count request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountResponse {
    /// Matching documents.
    pub count: u64,
    /// Shard outcome summary.
    #[serde(rename = "_shards", default)]
    pub shards: ShardsInfo,
}

/// Body of a failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Error detail.
    pub error: ErrorDetails,
    /// Status echoed by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// Error detail reported by the cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Error type, e.g. `index_not_found_exception`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable reason.
    #[serde(default)]
    pub reason: String,
    /// Affected collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    /// Underlying cause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caused_by: Option<Box<ErrorDetails>>,
    /// Root causes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub root_cause: Vec<ErrorDetails>,
}

/// Converts a non-2xx response into an error using its error envelope.
pub(crate) fn error_from_response(response: &HttpResponse) -> StoreError {
    match response.json::<ErrorEnvelope>() {
        Ok(envelope) => StoreError::Internal(format!(
            "[{}] {}: {}",
            response.status, envelope.error.kind, envelope.error.reason
        )),
        Err(err) => StoreError::Decode(format!(
            "[{}] error response without error envelope: {}",
            response.status, err
        )),
    }
}

/// Decodes a search-shaped response, rejecting error statuses and shard failures.
pub(crate) fn parse_search_response(response: &HttpResponse) -> StoreResult<SearchResponse> {
    if !response.is_success() {
        return Err(error_from_response(response));
    }
    let parsed: SearchResponse = response.json()?;
    parsed.shards.ensure_complete(|| response.text())?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Doc {
        title: String,
    }

    #[test]
    fn parses_hits_and_scroll_id() {
        let body = json!({
            "took": 3,
            "timed_out": false,
            "_scroll_id": "c2Nyb2xs",
            "_shards": {"total": 2, "successful": 2, "skipped": 0, "failed": 0},
            "hits": {
                "max_score": 1.0,
                "hits": [
                    {"_index": "adverts", "_id": "1", "_routing": "1", "_score": 1.0,
                     "_source": {"title": "bike"}}
                ]
            }
        });
        let response = HttpResponse::json_body(200, &body).unwrap();
        let parsed = parse_search_response(&response).unwrap();

        assert_eq!(parsed.scroll_id.as_deref(), Some("c2Nyb2xs"));
        assert_eq!(parsed.hits.hits.len(), 1);
        let hit = &parsed.hits.hits[0];
        assert_eq!(hit.routing.as_deref(), Some("1"));
        assert_eq!(hit.source_as::<Doc>().unwrap().title, "bike");
    }

    #[test]
    fn error_envelope_becomes_internal() {
        let body = json!({
            "error": {"type": "search_phase_execution_exception", "reason": "all shards failed"},
            "status": 503
        });
        let response = HttpResponse::json_body(503, &body).unwrap();
        let err = parse_search_response(&response).unwrap_err();
        assert_eq!(
            err.to_string(),
            "internal error: [503] search_phase_execution_exception: all shards failed"
        );
    }

    #[test]
    fn non_envelope_error_is_decode_failure() {
        let response = HttpResponse::new(502, "<html>bad gateway</html>");
        let err = parse_search_response(&response).unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[test]
    fn failed_shards_reject_partial_results() {
        let body = json!({
            "_shards": {
                "total": 3, "successful": 2, "skipped": 0, "failed": 1,
                "failures": [{"shard": 1, "index": "adverts",
                              "reason": {"type": "node_disconnected", "reason": "gone"}}]
            },
            "hits": {"hits": [{"_id": "1", "_source": {"title": "kept?"}}]}
        });
        let response = HttpResponse::json_body(200, &body).unwrap();
        match parse_search_response(&response).unwrap_err() {
            StoreError::ShardFailure { failed, total, detail } => {
                assert_eq!((failed, total), (1, 3));
                assert!(detail.contains("node_disconnected"));
                assert!(detail.contains("kept?"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_source_is_decode_error() {
        let hit = SearchHit {
            id: "5".into(),
            ..SearchHit::default()
        };
        assert!(matches!(hit.source_as::<Doc>(), Err(StoreError::Decode(_))));
    }
}
