//! Scroll pagination.
//!
//! A scroll session runs as its own task. It opens a server-side cursor,
//! pushes mapped pages into a bounded channel, and reports a terminal error
//! on a second channel. A supervisor task waits for the producer to finish
//! before the error channel closes, so a consumer that sees both channels
//! closed knows production is over.
//!
//! A session stops after the first page with fewer hits than the page size,
//! after an error, or when the consumer drops its [`PageStream`]. The cursor
//! is released best-effort on every one of those paths.

use crate::collection::CollectionClient;
use crate::context::RequestContext;
use crate::error::{StoreError, StoreResult};
use crate::model::{Query, SearchHit};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

/// Page size and cursor keep-alive of a scroll session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOptions {
    /// Hits requested per page.
    pub page_size: usize,
    /// How long the server keeps the cursor between pages.
    pub keep_alive: Duration,
}

impl ScrollOptions {
    /// Creates scroll options.
    pub fn new(page_size: usize, keep_alive: Duration) -> Self {
        Self {
            page_size,
            keep_alive,
        }
    }

    fn validate(&self) -> StoreResult<()> {
        if self.page_size == 0 {
            return Err(StoreError::BadRequest("scroll page size must be positive".into()));
        }
        if self.keep_alive.as_millis() == 0 {
            return Err(StoreError::BadRequest("scroll keep-alive must be at least 1ms".into()));
        }
        Ok(())
    }
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self::new(1000, Duration::from_secs(60))
    }
}

/// Consumer side of a scroll session.
///
/// Pages arrive in server order. An error, if any, arrives after every page
/// produced before it.
#[derive(Debug)]
pub struct PageStream<P> {
    pages: mpsc::Receiver<P>,
    errors: mpsc::Receiver<StoreError>,
    pages_open: bool,
    errors_open: bool,
}

impl<P> PageStream<P> {
    fn new(pages: mpsc::Receiver<P>, errors: mpsc::Receiver<StoreError>) -> Self {
        Self {
            pages,
            errors,
            pages_open: true,
            errors_open: true,
        }
    }

    /// Returns the next page or error; `None` once both channels are closed.
    pub async fn next(&mut self) -> Option<StoreResult<P>> {
        loop {
            if !self.pages_open && !self.errors_open {
                return None;
            }
            tokio::select! {
                biased;
                page = self.pages.recv(), if self.pages_open => match page {
                    Some(page) => return Some(Ok(page)),
                    None => self.pages_open = false,
                },
                err = self.errors.recv(), if self.errors_open => match err {
                    Some(err) => return Some(Err(err)),
                    None => self.errors_open = false,
                },
            }
        }
    }

    /// Feeds every page to `f`, stopping at the first error.
    pub async fn try_for_each<F>(mut self, mut f: F) -> StoreResult<()>
    where
        F: FnMut(P) -> StoreResult<()>,
    {
        while let Some(page) = self.next().await {
            f(page?)?;
        }
        Ok(())
    }

    /// Collects every page, or returns the first error.
    pub async fn try_collect(self) -> StoreResult<Vec<P>> {
        let mut pages = Vec::new();
        self.try_for_each(|page| {
            pages.push(page);
            Ok(())
        })
        .await?;
        Ok(pages)
    }
}

/// Server-side cursor owned by one session.
struct ScrollCursor {
    client: CollectionClient,
    current: Option<String>,
    issued: Vec<String>,
}

impl ScrollCursor {
    fn new(client: CollectionClient) -> Self {
        Self {
            client,
            current: None,
            issued: Vec::new(),
        }
    }

    fn advance(&mut self, scroll_id: Option<String>) {
        if let Some(id) = scroll_id {
            if !self.issued.contains(&id) {
                self.issued.push(id.clone());
            }
            self.current = Some(id);
        }
    }

    /// Clears every token the server issued, without waiting.
    fn release(&mut self) {
        if self.issued.is_empty() {
            return;
        }
        let ids = std::mem::take(&mut self.issued);
        self.current = None;

        let Ok(runtime) = Handle::try_current() else {
            debug!("no runtime left to release {} scroll ids", ids.len());
            return;
        };
        let client = self.client.clone();
        runtime.spawn(async move {
            if let Err(e) = client.clear_scroll(&RequestContext::background(), &ids).await {
                debug!("failed to clear scroll on {}: {}", client.name(), e);
            }
        });
    }
}

impl Drop for ScrollCursor {
    fn drop(&mut self) {
        self.release();
    }
}

/// Starts a scroll session mapping each page of hits with `map_page`.
///
/// Fails with an internal error when called outside a tokio runtime.
pub(crate) fn open_pages<P, F>(
    client: CollectionClient,
    ctx: RequestContext,
    query: Query,
    options: ScrollOptions,
    map_page: F,
) -> StoreResult<PageStream<P>>
where
    P: Send + 'static,
    F: FnMut(Vec<SearchHit>) -> StoreResult<P> + Send + 'static,
{
    options.validate()?;
    let runtime = Handle::try_current()
        .map_err(|e| StoreError::Internal(format!("scroll session needs a tokio runtime: {}", e)))?;

    let (page_tx, page_rx) = mpsc::channel(1);
    let (err_tx, err_rx) = mpsc::channel(1);

    let producer = runtime.spawn(produce(
        client,
        ctx,
        query,
        options,
        map_page,
        page_tx,
        err_tx.clone(),
    ));

    runtime.spawn(async move {
        if let Err(join_err) = producer.await {
            if join_err.is_panic() {
                let _ = err_tx
                    .send(StoreError::Internal(format!("scroll producer panicked: {}", join_err)))
                    .await;
            }
        }
    });

    Ok(PageStream::new(page_rx, err_rx))
}

async fn produce<P, F>(
    client: CollectionClient,
    ctx: RequestContext,
    query: Query,
    options: ScrollOptions,
    mut map_page: F,
    page_tx: mpsc::Sender<P>,
    err_tx: mpsc::Sender<StoreError>,
) where
    F: FnMut(Vec<SearchHit>) -> StoreResult<P>,
{
    debug!(
        "opening scroll on {} with page size {}",
        client.name(),
        options.page_size
    );
    let mut cursor = ScrollCursor::new(client.clone());
    let result = drive(&client, &ctx, &query, options, &mut cursor, &mut map_page, &page_tx).await;
    cursor.release();

    match result {
        Ok(pages) => debug!("scroll on {} finished after {} pages", client.name(), pages),
        Err(err) => {
            debug!("scroll on {} failed: {}", client.name(), err);
            let _ = err_tx.send(err).await;
        }
    }
}

/// Runs the page loop; returns the number of emitted pages.
async fn drive<P, F>(
    client: &CollectionClient,
    ctx: &RequestContext,
    query: &Query,
    options: ScrollOptions,
    cursor: &mut ScrollCursor,
    map_page: &mut F,
    page_tx: &mpsc::Sender<P>,
) -> StoreResult<usize>
where
    F: FnMut(Vec<SearchHit>) -> StoreResult<P>,
{
    let mut response = client
        .scroll_search(ctx, query, options.page_size, options.keep_alive)
        .await?;
    let mut emitted = 0;

    loop {
        cursor.advance(response.scroll_id.take());
        let hits = std::mem::take(&mut response.hits.hits);
        let exhausted = hits.len() < options.page_size;
        let page = map_page(hits)?;

        tokio::select! {
            biased;
            err = ctx.done() => return Err(err),
            sent = page_tx.send(page) => {
                if sent.is_err() {
                    debug!("scroll consumer on {} went away", client.name());
                    return Ok(emitted);
                }
            }
        }
        emitted += 1;

        if exhausted {
            return Ok(emitted);
        }

        let scroll_id = cursor
            .current
            .clone()
            .ok_or_else(|| StoreError::Internal("scroll response carried no scroll id".into()))?;
        response = client.scroll_next(ctx, &scroll_id, options.keep_alive).await?;
    }
}

impl CollectionClient {
    /// Streams raw hit pages of `query` through a scroll cursor.
    pub fn scroll_pages(
        &self,
        ctx: &RequestContext,
        query: &Query,
        options: ScrollOptions,
    ) -> StoreResult<PageStream<Vec<SearchHit>>> {
        open_pages(self.clone(), ctx.clone(), query.clone(), options, Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Connection;
    use crate::config::BackoffConfig;
    use crate::test_support::ScriptedClient;
    use crate::transport::{HttpClient, Method};
    use serde_json::json;

    fn collection(client: &std::sync::Arc<ScriptedClient>) -> CollectionClient {
        let http: std::sync::Arc<dyn HttpClient> = client.clone();
        Connection::new(http)
            .with_backoff(BackoffConfig::immediate())
            .collection("adverts")
    }

    fn page(scroll_id: &str, ids: &[&str]) -> serde_json::Value {
        let hits: Vec<_> = ids.iter().map(|id| json!({"_id": id, "_source": {}})).collect();
        json!({
            "_scroll_id": scroll_id,
            "_shards": {"total": 1, "successful": 1, "skipped": 0, "failed": 0},
            "hits": {"hits": hits}
        })
    }

    async fn wait_for_requests(client: &ScriptedClient, n: usize) {
        for _ in 0..100 {
            if client.requests().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn stops_on_short_page_and_releases_cursor() {
        let client = ScriptedClient::new();
        client.push_json(200, page("s1", &["1", "2"]));
        client.push_json(200, page("s2", &["3"]));
        client.push_json(200, json!({"succeeded": true}));

        let pages = collection(&client)
            .scroll_pages(&RequestContext::background(), &Query::new(), ScrollOptions::new(2, Duration::from_secs(30)))
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(pages.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 1]);

        wait_for_requests(&client, 3).await;
        let sent = client.requests();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[2].method, Method::Delete);
        let body: serde_json::Value = serde_json::from_slice(sent[2].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["scroll_id"], json!(["s1", "s2"]));
    }

    #[tokio::test]
    async fn empty_final_page_is_still_emitted() {
        let client = ScriptedClient::new();
        client.push_json(200, page("s1", &["1"]));
        client.push_json(200, page("s1", &[]));
        client.push_json(200, json!({"succeeded": true}));

        let pages = collection(&client)
            .scroll_pages(&RequestContext::background(), &Query::new(), ScrollOptions::new(1, Duration::from_secs(30)))
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages[1].is_empty());
    }

    #[tokio::test]
    async fn error_follows_emitted_pages() {
        let client = ScriptedClient::new();
        client.push_json(200, page("s1", &["1"]));
        for _ in 0..5 {
            client.push_json(500, json!({"error": {"type": "search_context_missing_exception", "reason": "gone"}}));
        }
        client.push_json(200, json!({"succeeded": true}));

        let mut stream = collection(&client)
            .scroll_pages(&RequestContext::background(), &Query::new(), ScrollOptions::new(1, Duration::from_secs(30)))
            .unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first[0].id, "1");
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("search_context_missing_exception"));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn zero_page_size_is_rejected() {
        let client = ScriptedClient::new();
        let err = collection(&client)
            .scroll_pages(&RequestContext::background(), &Query::new(), ScrollOptions::new(0, Duration::from_secs(1)))
            .unwrap_err();
        assert!(matches!(err, StoreError::BadRequest(_)));
    }

    #[tokio::test]
    async fn mapping_error_stops_before_emitting() {
        let client = ScriptedClient::new();
        client.push_json(200, page("s1", &["1", "2"]));
        client.push_json(200, json!({"succeeded": true}));

        let stream = open_pages(
            collection(&client),
            RequestContext::background(),
            Query::new(),
            ScrollOptions::new(2, Duration::from_secs(30)),
            |_hits: Vec<SearchHit>| -> StoreResult<usize> { Err(StoreError::Decode("bad hit".into())) },
        )
        .unwrap();

        let err = stream.try_collect().await.unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }
}
