//! Transport abstraction between the store client and the network.
//!
//! The client layer only ever builds [`HttpRequest`] values and reads
//! [`HttpResponse`] values; the [`HttpClient`] trait decides how they travel.
//! [`crate::PooledHttpClient`] is the production implementation, and tests
//! substitute in-memory clusters.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// HTTP method of a store request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
    /// DELETE.
    Delete,
    /// HEAD.
    Head,
}

impl Method {
    /// Returns the canonical method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request addressed relative to a cluster node.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Unescaped path segments, e.g. `["adverts", "_doc", "42"]`.
    pub path: Vec<String>,
    /// Query parameters in insertion order.
    pub query: Vec<(String, String)>,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Optional request body.
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// Creates a request for the given method and path segments.
    pub fn new<I, S>(method: Method, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            path: path.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Appends a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Appends a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Sets a raw body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON body.
    pub fn with_json<T: Serialize + ?Sized>(self, value: &T) -> StoreResult<Self> {
        let body = serde_json::to_vec(value).map_err(StoreError::serialization)?;
        Ok(self
            .with_header("Content-Type", "application/json")
            .with_body(body))
    }

    /// Returns the value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the path joined with `/`, with a leading slash.
    pub fn path_string(&self) -> String {
        format!("/{}", self.path.join("/"))
    }

    /// Method actually put on the wire: GET with a body travels as POST.
    pub fn wire_method(&self) -> Method {
        match (self.method, &self.body) {
            (Method::Get, Some(body)) if !body.is_empty() => Method::Post,
            (method, _) => method,
        }
    }
}

/// A fully buffered response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers with lowercase names.
    pub headers: Vec<(String, String)>,
    /// Decoded (decompressed) body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Creates a response with the given status and body.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Creates a response with a JSON body.
    pub fn json_body<T: Serialize + ?Sized>(status: u16, value: &T) -> StoreResult<Self> {
        let body = serde_json::to_vec(value).map_err(StoreError::serialization)?;
        Ok(Self::new(status, body).with_header("content-type", "application/json"))
    }

    /// Appends a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into().to_lowercase(), value.into()));
        self
    }

    /// Returns true for 2xx status codes.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true for 404.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Returns a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> StoreResult<T> {
        serde_json::from_slice(&self.body).map_err(StoreError::decode)
    }

    /// Returns the body as lossy UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends requests to a cluster.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends one request and buffers the full response.
    ///
    /// Non-2xx statuses are returned as responses, not errors; only
    /// transport failures produce `Err`.
    async fn send(&self, request: HttpRequest) -> StoreResult<HttpResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_with_body_goes_out_as_post() {
        let request = HttpRequest::new(Method::Get, ["adverts", "_search"])
            .with_json(&json!({"query": {"match_all": {}}}))
            .unwrap();
        assert_eq!(request.wire_method(), Method::Post);

        let bare = HttpRequest::new(Method::Get, ["adverts", "_doc", "1"]);
        assert_eq!(bare.wire_method(), Method::Get);
    }

    #[test]
    fn request_builders() {
        let request = HttpRequest::new(Method::Put, ["adverts", "_doc", "7"])
            .with_query("refresh", "false")
            .with_query("routing", "7");
        assert_eq!(request.path_string(), "/adverts/_doc/7");
        assert_eq!(request.query_param("refresh"), Some("false"));
        assert_eq!(request.query_param("timeout"), None);
    }

    #[test]
    fn response_helpers() {
        let response = HttpResponse::json_body(200, &json!({"count": 3}))
            .unwrap()
            .with_header("X-Elastic-Product", "Elasticsearch");
        assert!(response.is_success());
        assert_eq!(response.header("x-elastic-product"), Some("Elasticsearch"));

        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["count"], 3);

        let broken = HttpResponse::new(200, "not json");
        assert!(matches!(
            broken.json::<serde_json::Value>(),
            Err(StoreError::Decode(_))
        ));
    }
}
