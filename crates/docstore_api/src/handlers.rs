//! Query handlers behind the HTTP routes.

use crate::error::ApiResult;
use crate::model::{AdvertResponse, CategoryResponse};
use crate::repository::{AdvertRepository, CategoryRepository};
use async_trait::async_trait;
use docstore_client::RequestContext;
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};

/// Answers one kind of query.
#[async_trait]
pub trait QueryHandler<Q, R>: Send + Sync
where
    Q: Send + Sync,
{
    /// Handles `query`.
    async fn handle(&self, ctx: &RequestContext, query: &Q) -> ApiResult<R>;
}

/// Looks up an advert by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetAdvertQuery {
    /// Advert id.
    pub id: i64,
}

/// Looks up a category by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetCategoryQuery {
    /// Category id.
    pub id: i64,
}

/// Serves [`GetAdvertQuery`].
pub struct GetAdvertQueryHandler {
    repository: Arc<dyn AdvertRepository>,
}

impl GetAdvertQueryHandler {
    /// Creates the handler.
    pub fn new(repository: Arc<dyn AdvertRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl QueryHandler<GetAdvertQuery, AdvertResponse> for GetAdvertQueryHandler {
    async fn handle(&self, ctx: &RequestContext, query: &GetAdvertQuery) -> ApiResult<AdvertResponse> {
        let advert = self.repository.get_by_id(ctx, query.id).await?;
        Ok(advert.into())
    }
}

/// Serves [`GetCategoryQuery`].
pub struct GetCategoryQueryHandler {
    repository: Arc<dyn CategoryRepository>,
}

impl GetCategoryQueryHandler {
    /// Creates the handler.
    pub fn new(repository: Arc<dyn CategoryRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl QueryHandler<GetCategoryQuery, CategoryResponse> for GetCategoryQueryHandler {
    async fn handle(&self, ctx: &RequestContext, query: &GetCategoryQuery) -> ApiResult<CategoryResponse> {
        let category = self.repository.get_by_id(ctx, query.id).await?;
        Ok(category.into())
    }
}

/// Runs the wrapped handler inside a span named after it.
pub struct TracedQueryHandler<H> {
    name: &'static str,
    inner: H,
}

impl<H> TracedQueryHandler<H> {
    /// Wraps `inner`, labelling its spans with `name`.
    pub fn new(name: &'static str, inner: H) -> Self {
        Self { name, inner }
    }
}

#[async_trait]
impl<Q, R, H> QueryHandler<Q, R> for TracedQueryHandler<H>
where
    Q: Send + Sync + 'static,
    R: Send + 'static,
    H: QueryHandler<Q, R>,
{
    async fn handle(&self, ctx: &RequestContext, query: &Q) -> ApiResult<R> {
        let span = info_span!("query", handler = self.name);
        async {
            let result = self.inner.handle(ctx, query).await;
            if let Err(err) = &result {
                debug!("{} failed: {}", self.name, err);
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Every query handler the API serves.
#[derive(Clone)]
pub struct QueryHandlers {
    /// `GET /adverts/{id}`.
    pub get_advert: Arc<dyn QueryHandler<GetAdvertQuery, AdvertResponse>>,
    /// `GET /categories/{id}`.
    pub get_category: Arc<dyn QueryHandler<GetCategoryQuery, CategoryResponse>>,
}

impl QueryHandlers {
    /// Builds traced handlers over the given repositories.
    pub fn new(adverts: Arc<dyn AdvertRepository>, categories: Arc<dyn CategoryRepository>) -> Self {
        Self {
            get_advert: Arc::new(TracedQueryHandler::new(
                "GetAdvertQueryHandler",
                GetAdvertQueryHandler::new(adverts),
            )),
            get_category: Arc::new(TracedQueryHandler::new(
                "GetCategoryQueryHandler",
                GetCategoryQueryHandler::new(categories),
            )),
        }
    }
}

impl std::fmt::Debug for QueryHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHandlers").finish_non_exhaustive()
    }
}
