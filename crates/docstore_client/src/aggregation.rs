//! Aggregation results decoded on access.
//!
//! A search response keeps each aggregation as raw JSON. Typed accessors try
//! to decode one entry into a known shape each time they are called; a
//! missing name and a failed decode are reported separately.

use crate::error::{StoreError, StoreResult};
use crate::model::SearchHits;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::collections::HashMap;

/// Aggregation name to raw payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Aggregations(HashMap<String, Box<RawValue>>);

impl Aggregations {
    /// Returns the raw payload of an aggregation.
    pub fn raw(&self, name: &str) -> Option<&RawValue> {
        self.0.get(name).map(|raw| &**raw)
    }

    /// Returns the aggregation names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Returns the number of aggregations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no aggregations.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decodes a bucketed terms aggregation.
    ///
    /// `None` if the name is absent, `Some(Err(_))` if it has another shape.
    pub fn terms(&self, name: &str) -> Option<StoreResult<TermsAggregate>> {
        self.decode(name)
    }

    /// Decodes a top-hits aggregation.
    pub fn top_hits(&self, name: &str) -> Option<StoreResult<TopHitsAggregate>> {
        self.decode(name)
    }

    fn decode<T: DeserializeOwned + Default>(&self, name: &str) -> Option<StoreResult<T>> {
        let raw = self.0.get(name)?.get();
        if raw.trim() == "null" {
            return Some(Ok(T::default()));
        }
        Some(
            serde_json::from_str(raw)
                .map_err(|err| StoreError::Decode(format!("aggregation {:?}: {}", name, err))),
        )
    }
}

/// A bucketed terms aggregation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TermsAggregate {
    /// Upper bound of the per-bucket count error.
    #[serde(default)]
    pub doc_count_error_upper_bound: i64,
    /// Documents outside the returned buckets.
    #[serde(default)]
    pub sum_other_doc_count: i64,
    /// Buckets in server order.
    pub buckets: Vec<TermsBucket>,
}

/// One terms bucket with its nested aggregations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "HashMap<String, Box<RawValue>>")]
pub struct TermsBucket {
    /// Bucket key.
    pub key: serde_json::Value,
    /// Formatted key, for date and numeric keys.
    pub key_as_string: Option<String>,
    /// Documents in the bucket.
    pub doc_count: i64,
    /// Sub-aggregations.
    pub aggregations: Aggregations,
}

impl TryFrom<HashMap<String, Box<RawValue>>> for TermsBucket {
    type Error = serde_json::Error;

    fn try_from(mut fields: HashMap<String, Box<RawValue>>) -> Result<Self, Self::Error> {
        let key = match fields.remove("key") {
            Some(raw) => serde_json::from_str(raw.get())?,
            None => serde_json::Value::Null,
        };
        let key_as_string = match fields.remove("key_as_string") {
            Some(raw) => serde_json::from_str(raw.get())?,
            None => None,
        };
        let doc_count = match fields.remove("doc_count") {
            Some(raw) => serde_json::from_str(raw.get())?,
            None => 0,
        };
        Ok(Self {
            key,
            key_as_string,
            doc_count,
            aggregations: Aggregations(fields),
        })
    }
}

/// A top-hits aggregation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopHitsAggregate {
    /// The nested hits.
    #[serde(default)]
    pub hits: SearchHits,
}
