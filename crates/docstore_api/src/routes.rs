//! HTTP routes.

use crate::error::{ApiError, ApiResult};
use crate::handlers::{GetAdvertQuery, GetCategoryQuery, QueryHandlers};
use crate::model::{AdvertResponse, CategoryResponse};
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use docstore_client::RequestContext;
use serde::Serialize;

/// Builds the API router.
///
/// - `GET /adverts/:id`
/// - `GET /categories/:id`
/// - `GET /healthcheck`
pub fn router(handlers: QueryHandlers) -> Router {
    Router::new()
        .route("/adverts/:id", get(get_advert))
        .route("/categories/:id", get(get_category))
        .route("/healthcheck", get(health))
        .with_state(handlers)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn get_advert(
    State(handlers): State<QueryHandlers>,
    method: Method,
    uri: Uri,
    Path(id): Path<String>,
) -> Response {
    respond(find_advert(&handlers, &id).await, &method, &uri)
}

async fn find_advert(handlers: &QueryHandlers, raw_id: &str) -> ApiResult<AdvertResponse> {
    let query = GetAdvertQuery { id: parse_id(raw_id)? };
    handlers
        .get_advert
        .handle(&RequestContext::background(), &query)
        .await
}

async fn get_category(
    State(handlers): State<QueryHandlers>,
    method: Method,
    uri: Uri,
    Path(id): Path<String>,
) -> Response {
    respond(find_category(&handlers, &id).await, &method, &uri)
}

async fn find_category(handlers: &QueryHandlers, raw_id: &str) -> ApiResult<CategoryResponse> {
    let query = GetCategoryQuery { id: parse_id(raw_id)? };
    handlers
        .get_category
        .handle(&RequestContext::background(), &query)
        .await
}

fn parse_id(raw: &str) -> ApiResult<i64> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("id must be number".into()))
}

fn respond<T: Serialize>(result: ApiResult<T>, method: &Method, uri: &Uri) -> Response {
    match result {
        Ok(body) => Json(body).into_response(),
        Err(err) => err.into_response_for(method, uri),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_must_be_numbers() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert_eq!(parse_id("-1").unwrap(), -1);
        for bad in ["abc", "", "4.2", "99999999999999999999"] {
            let err = parse_id(bad).unwrap_err();
            assert_eq!(err.to_string(), "id must be number");
        }
    }
}
