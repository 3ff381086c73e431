//! Typed repository over a collection.
//!
//! A [`DocumentRepository`] pairs a [`CollectionClient`] with a
//! [`HitMapper`] that turns raw hits into typed entities and identifiers.
//! Every read applies the mapper to each hit and fails on the first mapping
//! error; nothing is skipped.

use crate::collection::CollectionClient;
use crate::context::RequestContext;
use crate::error::{StoreError, StoreResult};
use crate::model::{Query, SearchHit};
use crate::scroll::{open_pages, PageStream, ScrollOptions};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

/// Maps raw hits to typed identifiers and entities.
pub trait HitMapper: Send + Sync + 'static {
    /// Identifier type.
    type Id: Eq + Hash + Send + 'static;
    /// Entity type.
    type Entity: Send + 'static;

    /// Maps a hit to its identifier and entity.
    fn map_hit(&self, hit: &SearchHit) -> StoreResult<(Self::Id, Self::Entity)>;

    /// Maps a hit to its identifier only.
    fn map_id(&self, hit: &SearchHit) -> StoreResult<Self::Id>;
}

/// A [`HitMapper`] built from two closures.
pub struct ClosureMapper<I, E, F, G> {
    map_hit: F,
    map_id: G,
    _types: PhantomData<fn() -> (I, E)>,
}

impl<I, E, F, G> ClosureMapper<I, E, F, G>
where
    F: Fn(&SearchHit) -> StoreResult<(I, E)>,
    G: Fn(&SearchHit) -> StoreResult<I>,
{
    /// Creates a mapper from a hit mapping and an id mapping.
    pub fn new(map_hit: F, map_id: G) -> Self {
        Self {
            map_hit,
            map_id,
            _types: PhantomData,
        }
    }
}

impl<I, E, F, G> HitMapper for ClosureMapper<I, E, F, G>
where
    I: Eq + Hash + Send + 'static,
    E: Send + 'static,
    F: Fn(&SearchHit) -> StoreResult<(I, E)> + Send + Sync + 'static,
    G: Fn(&SearchHit) -> StoreResult<I> + Send + Sync + 'static,
{
    type Id = I;
    type Entity = E;

    fn map_hit(&self, hit: &SearchHit) -> StoreResult<(I, E)> {
        (self.map_hit)(hit)
    }

    fn map_id(&self, hit: &SearchHit) -> StoreResult<I> {
        (self.map_id)(hit)
    }
}

/// Parses the identifier from `_id` and the entity from `_source`.
pub struct JsonMapper<I, T> {
    _types: PhantomData<fn() -> (I, T)>,
}

impl<I, T> JsonMapper<I, T> {
    /// Creates the mapper.
    pub fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }
}

impl<I, T> Default for JsonMapper<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, T> HitMapper for JsonMapper<I, T>
where
    I: FromStr + Eq + Hash + Send + 'static,
    I::Err: std::fmt::Display,
    T: DeserializeOwned + Send + 'static,
{
    type Id = I;
    type Entity = T;

    fn map_hit(&self, hit: &SearchHit) -> StoreResult<(I, T)> {
        Ok((self.map_id(hit)?, hit.source_as()?))
    }

    fn map_id(&self, hit: &SearchHit) -> StoreResult<I> {
        hit.id
            .parse()
            .map_err(|e| StoreError::Decode(format!("invalid document id {:?}: {}", hit.id, e)))
    }
}

/// Typed reads over one collection.
pub struct DocumentRepository<M: HitMapper> {
    client: CollectionClient,
    mapper: Arc<M>,
}

impl<M: HitMapper> Clone for DocumentRepository<M> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            mapper: self.mapper.clone(),
        }
    }
}

impl<M: HitMapper> std::fmt::Debug for DocumentRepository<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentRepository")
            .field("collection", &self.client.name())
            .finish_non_exhaustive()
    }
}

impl<M: HitMapper> DocumentRepository<M> {
    /// Creates a repository over `client` using `mapper`.
    pub fn new(client: CollectionClient, mapper: M) -> Self {
        Self {
            client,
            mapper: Arc::new(mapper),
        }
    }

    /// Returns the underlying collection client.
    pub fn collection(&self) -> &CollectionClient {
        &self.client
    }

    /// Fetches and maps one document.
    pub async fn get_by_id(
        &self,
        ctx: &RequestContext,
        id: &str,
        routing: Option<&str>,
    ) -> StoreResult<M::Entity> {
        let hit = self.client.get_by_id(ctx, id, routing).await?;
        let (_, entity) = self.mapper.map_hit(&hit)?;
        Ok(entity)
    }

    /// Runs `query` and maps every hit. Later duplicates replace earlier ones.
    pub async fn get_search_hits(
        &self,
        ctx: &RequestContext,
        query: &Query,
    ) -> StoreResult<HashMap<M::Id, M::Entity>> {
        let response = self.client.search(ctx, query).await?;
        map_hits(self.mapper.as_ref(), &response.hits.hits)
    }

    /// As [`get_search_hits`](Self::get_search_hits) with a result-size cap.
    pub async fn get_search_hits_with_size(
        &self,
        ctx: &RequestContext,
        query: &Query,
        size: usize,
    ) -> StoreResult<HashMap<M::Id, M::Entity>> {
        let response = self.client.search_with_size(ctx, query, size).await?;
        map_hits(self.mapper.as_ref(), &response.hits.hits)
    }

    /// Runs `query` and maps every hit to its identifier, in response order.
    pub async fn get_ids(&self, ctx: &RequestContext, query: &Query) -> StoreResult<Vec<M::Id>> {
        let response = self.client.search(ctx, query).await?;
        map_ids(self.mapper.as_ref(), &response.hits.hits)
    }

    /// As [`get_ids`](Self::get_ids) with a result-size cap.
    pub async fn get_ids_with_size(
        &self,
        ctx: &RequestContext,
        query: &Query,
        size: usize,
    ) -> StoreResult<Vec<M::Id>> {
        let response = self.client.search_with_size(ctx, query, size).await?;
        map_ids(self.mapper.as_ref(), &response.hits.hits)
    }

    /// Streams mapped pages of `query` through a scroll cursor.
    pub fn search_hits_stream(
        &self,
        ctx: &RequestContext,
        query: &Query,
        options: ScrollOptions,
    ) -> StoreResult<PageStream<HashMap<M::Id, M::Entity>>> {
        let mapper = self.mapper.clone();
        open_pages(
            self.client.clone(),
            ctx.clone(),
            query.clone(),
            options,
            move |hits| map_hits(mapper.as_ref(), &hits),
        )
    }

    /// Scrolls through every hit of `query` and merges the mapped pages.
    pub async fn search_hits_using_scroll(
        &self,
        ctx: &RequestContext,
        query: &Query,
        options: ScrollOptions,
    ) -> StoreResult<HashMap<M::Id, M::Entity>> {
        let mut merged = HashMap::new();
        self.search_hits_stream(ctx, query, options)?
            .try_for_each(|page| {
                merged.extend(page);
                Ok(())
            })
            .await?;
        Ok(merged)
    }

    /// Streams identifier pages of `query` through a scroll cursor.
    pub fn ids_stream(
        &self,
        ctx: &RequestContext,
        query: &Query,
        options: ScrollOptions,
    ) -> StoreResult<PageStream<Vec<M::Id>>> {
        let mapper = self.mapper.clone();
        open_pages(
            self.client.clone(),
            ctx.clone(),
            query.clone(),
            options,
            move |hits| map_ids(mapper.as_ref(), &hits),
        )
    }

    /// Scrolls through every hit of `query` collecting identifiers in order.
    pub async fn ids_using_scroll(
        &self,
        ctx: &RequestContext,
        query: &Query,
        options: ScrollOptions,
    ) -> StoreResult<Vec<M::Id>> {
        let mut ids = Vec::new();
        self.ids_stream(ctx, query, options)?
            .try_for_each(|page| {
                ids.extend(page);
                Ok(())
            })
            .await?;
        Ok(ids)
    }
}

fn map_hits<M: HitMapper>(mapper: &M, hits: &[SearchHit]) -> StoreResult<HashMap<M::Id, M::Entity>> {
    let mut entities = HashMap::with_capacity(hits.len());
    for hit in hits {
        let (id, entity) = mapper.map_hit(hit)?;
        entities.insert(id, entity);
    }
    Ok(entities)
}

fn map_ids<M: HitMapper>(mapper: &M, hits: &[SearchHit]) -> StoreResult<Vec<M::Id>> {
    hits.iter().map(|hit| mapper.map_id(hit)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Connection;
    use crate::config::BackoffConfig;
    use crate::test_support::ScriptedClient;
    use crate::transport::HttpClient;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Listing {
        title: String,
    }

    fn repository(client: &Arc<ScriptedClient>) -> DocumentRepository<JsonMapper<i64, Listing>> {
        let http: Arc<dyn HttpClient> = client.clone();
        let collection = Connection::new(http)
            .with_backoff(BackoffConfig::immediate())
            .collection("listings");
        DocumentRepository::new(collection, JsonMapper::new())
    }

    fn hits_response(hits: serde_json::Value) -> serde_json::Value {
        json!({
            "_shards": {"total": 1, "successful": 1, "skipped": 0, "failed": 0},
            "hits": {"hits": hits}
        })
    }

    #[tokio::test]
    async fn duplicate_ids_keep_last_hit() {
        let client = ScriptedClient::new();
        client.push_json(
            200,
            hits_response(json!([
                {"_id": "1", "_source": {"title": "first"}},
                {"_id": "2", "_source": {"title": "other"}},
                {"_id": "1", "_source": {"title": "second"}}
            ])),
        );

        let found = repository(&client)
            .get_search_hits(&RequestContext::background(), &Query::new())
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[&1].title, "second");
    }

    #[tokio::test]
    async fn mapping_error_fails_whole_response() {
        let client = ScriptedClient::new();
        client.push_json(
            200,
            hits_response(json!([
                {"_id": "1", "_source": {"title": "ok"}},
                {"_id": "not-a-number", "_source": {"title": "bad"}}
            ])),
        );

        let err = repository(&client)
            .get_ids(&RequestContext::background(), &Query::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[tokio::test]
    async fn get_by_id_maps_source() {
        let client = ScriptedClient::new();
        client.push_json(200, json!({"_id": "4", "found": true, "_source": {"title": "lamp"}}));

        let listing = repository(&client)
            .get_by_id(&RequestContext::background(), "4", None)
            .await
            .unwrap();
        assert_eq!(listing, Listing { title: "lamp".into() });
    }

    #[tokio::test]
    async fn closure_mapper_uses_injected_functions() {
        let mapper = ClosureMapper::new(
            |hit: &SearchHit| Ok((hit.id.len(), hit.id.to_uppercase())),
            |hit: &SearchHit| Ok(hit.id.len()),
        );
        let hit = SearchHit {
            id: "abc".into(),
            ..SearchHit::default()
        };
        assert_eq!(mapper.map_hit(&hit).unwrap(), (3, "ABC".to_string()));
        assert_eq!(mapper.map_id(&hit).unwrap(), 3);
    }
}
