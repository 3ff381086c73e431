//! Advert and category repositories.
//!
//! Entities are indexed with their numeric id as both document id and
//! routing key, and read back by id without routing.

use crate::model::{Advert, Category};
use async_trait::async_trait;
use docstore_client::{
    ClusterClients, Connection, DocumentRepository, JsonMapper, RequestContext, StoreResult,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Reads and writes adverts.
#[async_trait]
pub trait AdvertRepository: Send + Sync {
    /// Fetches an advert by id.
    async fn get_by_id(&self, ctx: &RequestContext, id: i64) -> StoreResult<Advert>;

    /// Indexes an advert.
    async fn save(&self, ctx: &RequestContext, advert: &Advert) -> StoreResult<()>;
}

/// Reads and writes categories.
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Fetches a category by id.
    async fn get_by_id(&self, ctx: &RequestContext, id: i64) -> StoreResult<Category>;

    /// Indexes a category.
    async fn save(&self, ctx: &RequestContext, category: &Category) -> StoreResult<()>;
}

/// An entity keyed by a numeric id.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the entity id.
    fn id(&self) -> i64;
}

impl Entity for Advert {
    fn id(&self) -> i64 {
        self.id
    }
}

impl Entity for Category {
    fn id(&self) -> i64 {
        self.id
    }
}

/// Repository backed by one index of the document store.
pub struct StoreRepository<T: Entity> {
    documents: DocumentRepository<JsonMapper<String, T>>,
}

impl<T: Entity> StoreRepository<T> {
    /// Creates a repository over `index` of a connection.
    pub fn new(connection: &Connection, index: &str) -> Self {
        Self {
            documents: DocumentRepository::new(connection.collection(index), JsonMapper::new()),
        }
    }

    /// Creates a repository over `index` of a named cluster.
    pub fn from_clients(clients: &ClusterClients, cluster: &str, index: &str) -> StoreResult<Self> {
        Ok(Self::new(clients.get(cluster)?, index))
    }

    async fn find(&self, ctx: &RequestContext, id: i64) -> StoreResult<T> {
        self.documents.get_by_id(ctx, &id.to_string(), None).await
    }

    async fn store(&self, ctx: &RequestContext, entity: &T) -> StoreResult<()> {
        let id = entity.id().to_string();
        self.documents
            .collection()
            .index_document(ctx, &id, Some(id.as_str()), entity)
            .await
    }
}

impl<T: Entity> std::fmt::Debug for StoreRepository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRepository")
            .field("index", &self.documents.collection().name())
            .finish()
    }
}

/// Advert repository over the document store.
pub type StoreAdvertRepository = StoreRepository<Advert>;

/// Category repository over the document store.
pub type StoreCategoryRepository = StoreRepository<Category>;

#[async_trait]
impl AdvertRepository for StoreRepository<Advert> {
    async fn get_by_id(&self, ctx: &RequestContext, id: i64) -> StoreResult<Advert> {
        self.find(ctx, id).await
    }

    async fn save(&self, ctx: &RequestContext, advert: &Advert) -> StoreResult<()> {
        self.store(ctx, advert).await
    }
}

#[async_trait]
impl CategoryRepository for StoreRepository<Category> {
    async fn get_by_id(&self, ctx: &RequestContext, id: i64) -> StoreResult<Category> {
        self.find(ctx, id).await
    }

    async fn save(&self, ctx: &RequestContext, category: &Category) -> StoreResult<()> {
        self.store(ctx, category).await
    }
}
