//! # Advert Read API
//!
//! HTTP read API over adverts and categories kept in a search cluster.
//!
//! This crate provides:
//! - Entities and response bodies
//! - Store-backed repositories
//! - Query handlers with tracing spans
//! - `axum` routes rendering errors as JSON payloads
//! - TOML configuration and logging setup
//!
//! The `advert-read-api` binary wires these together.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod model;
pub mod repository;
pub mod routes;

pub use config::{AppConfig, LogConfig, ServerConfig, StoreConfig};
pub use error::{ApiError, ApiResult, ErrorPayload};
pub use handlers::{
    GetAdvertQuery, GetAdvertQueryHandler, GetCategoryQuery, GetCategoryQueryHandler, QueryHandler,
    QueryHandlers, TracedQueryHandler,
};
pub use model::{Advert, AdvertCategory, AdvertCategoryResponse, AdvertResponse, Category, CategoryResponse};
pub use repository::{
    AdvertRepository, CategoryRepository, Entity, StoreAdvertRepository, StoreCategoryRepository,
    StoreRepository,
};
pub use routes::router;

use docstore_client::ClusterClients;
use std::sync::Arc;
use tracing::info;

/// Connects to the configured clusters and builds the query handlers.
pub async fn initialize(config: &AppConfig) -> ApiResult<QueryHandlers> {
    let clients = ClusterClients::initialize(&config.clusters).await?;
    let store = &config.store;

    let adverts = StoreAdvertRepository::from_clients(&clients, &store.cluster, &store.advert_index)?;
    let categories =
        StoreCategoryRepository::from_clients(&clients, &store.cluster, &store.category_index)?;
    info!(
        "serving {} and {} from cluster {}",
        store.advert_index, store.category_index, store.cluster
    );

    Ok(QueryHandlers::new(Arc::new(adverts), Arc::new(categories)))
}
