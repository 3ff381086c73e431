//! Error types for the read API and their HTTP rendering.

use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use docstore_client::{ErrorKind, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

const NOT_FOUND_TITLE: &str = "Not found";
const BAD_REQUEST_TITLE: &str = "Bad request";
const INTERNAL_TITLE: &str = "Internal Server Error";

/// Errors surfaced by the read API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Caller input is malformed.
    #[error("{0}")]
    BadRequest(String),

    /// The requested resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Anything else that went wrong while serving.
    #[error("{0}")]
    Internal(String),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// The document store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    /// Returns the HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) | ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Store(err) => {
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Returns the payload title for this error.
    pub fn title(&self) -> &'static str {
        let kind = match self {
            ApiError::BadRequest(_) => ErrorKind::BadRequest,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Internal(_) | ApiError::Config(_) => ErrorKind::Internal,
            ApiError::Store(err) => err.kind(),
        };
        match kind {
            ErrorKind::NotFound => NOT_FOUND_TITLE,
            ErrorKind::BadRequest => BAD_REQUEST_TITLE,
            ErrorKind::Internal | ErrorKind::Cancelled => INTERNAL_TITLE,
        }
    }

    /// Builds the error payload for the request that failed.
    pub fn payload(&self, method: &Method, uri: &Uri) -> ErrorPayload {
        ErrorPayload {
            title: self.title().to_owned(),
            status: self.status().as_u16(),
            detail: self.to_string(),
            request_uri: uri.to_string(),
            request_method: method.to_string(),
            instant: Utc::now(),
        }
    }

    /// Renders the error as a JSON response.
    pub fn into_response_for(self, method: &Method, uri: &Uri) -> Response {
        if self.status().is_server_error() {
            tracing::error!("{} {} failed: {}", method, uri, self);
        }
        (self.status(), Json(self.payload(method, uri))).into_response()
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Short summary of the status.
    pub title: String,
    /// HTTP status code.
    pub status: u16,
    /// Error message.
    pub detail: String,
    /// Request path and query.
    pub request_uri: String,
    /// Request method.
    pub request_method: String,
    /// When the error was produced.
    pub instant: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_their_kind() {
        let not_found = ApiError::from(StoreError::NotFound("document 1 in adverts".into()));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.title(), "Not found");

        let cancelled = ApiError::from(StoreError::Cancelled);
        assert_eq!(cancelled.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(cancelled.title(), "Internal Server Error");

        let shards = ApiError::from(StoreError::ShardFailure {
            failed: 1,
            total: 3,
            detail: String::new(),
        });
        assert_eq!(shards.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn payload_carries_request_details() {
        let uri: Uri = "/adverts/abc?x=1".parse().unwrap();
        let payload = ApiError::BadRequest("id must be number".into()).payload(&Method::GET, &uri);
        assert_eq!(payload.title, "Bad request");
        assert_eq!(payload.status, 400);
        assert_eq!(payload.detail, "id must be number");
        assert_eq!(payload.request_uri, "/adverts/abc?x=1");
        assert_eq!(payload.request_method, "GET");

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("requestUri").is_some());
        assert!(json.get("instant").is_some());
    }
}
