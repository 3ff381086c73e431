//! Typed repository reads against the in-memory cluster.

use docstore_client::{ClosureMapper, DocumentRepository, JsonMapper, ScrollOptions, SearchHit, StoreError};
use docstore_testkit::prelude::*;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Numbered {
    n: u64,
    group: u64,
}

fn repository(test: &TestCluster) -> DocumentRepository<JsonMapper<String, Numbered>> {
    DocumentRepository::new(test.collection("adverts"), JsonMapper::new())
}

fn options(page_size: usize) -> ScrollOptions {
    ScrollOptions::new(page_size, Duration::from_secs(30))
}

#[tokio::test]
async fn search_hits_are_keyed_by_id() {
    let test = scenarios::seeded_cluster("adverts", 9);
    let found = repository(&test)
        .get_search_hits(&background(), &term_query("group", 0))
        .await
        .unwrap();

    assert_eq!(found.len(), 3);
    assert_eq!(found[&scenarios::doc_id(6)], Numbered { n: 6, group: 0 });
}

#[tokio::test]
async fn ids_keep_response_order() {
    let test = scenarios::seeded_cluster("adverts", 20);
    let ids = repository(&test)
        .get_ids_with_size(&background(), &match_all(), 4)
        .await
        .unwrap();
    let expected: Vec<String> = (0..4).map(scenarios::doc_id).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn scroll_merges_every_page() {
    let test = scenarios::seeded_cluster("adverts", 23);
    let repo = repository(&test);

    let all = repo
        .search_hits_using_scroll(&background(), &match_all(), options(5))
        .await
        .unwrap();
    assert_eq!(all.len(), 23);

    let ids = repo
        .ids_using_scroll(&background(), &term_query("group", 1), options(2))
        .await
        .unwrap();
    let expected: Vec<String> = (0..23).filter(|i| i % 3 == 1).map(scenarios::doc_id).collect();
    assert_eq!(ids, expected);

    assert!(test.wait_for_scrolls_released().await);
}

#[tokio::test]
async fn streamed_pages_are_mapped() {
    let test = scenarios::seeded_cluster("adverts", 6);
    let pages = repository(&test)
        .search_hits_stream(&background(), &match_all(), options(4))
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let sizes: Vec<usize> = pages.iter().map(|page| page.len()).collect();
    assert_eq!(sizes, vec![4, 2]);
}

#[tokio::test]
async fn mapping_failure_mid_scroll_fails_the_call() {
    let test = TestCluster::new();
    for i in 0..6 {
        test.insert("adverts", &i.to_string(), json!({"n": i, "group": 0}));
    }
    test.insert("adverts", "7", json!({"unexpected": true}));

    let err = repository(&test)
        .search_hits_using_scroll(&background(), &match_all(), options(3))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Decode(_)));
    assert!(test.wait_for_scrolls_released().await);
}

#[tokio::test]
async fn numeric_ids_through_closure_mapper() {
    let test = TestCluster::new();
    test.insert("categories", "3", json!({"name": "bikes"}));
    test.insert("categories", "11", json!({"name": "cars"}));

    let mapper = ClosureMapper::new(
        |hit: &SearchHit| {
            let id: i64 = hit
                .id
                .parse()
                .map_err(|_| StoreError::Decode(format!("bad id {}", hit.id)))?;
            let source: serde_json::Value = hit.source_as()?;
            Ok((id, source["name"].as_str().unwrap_or_default().to_owned()))
        },
        |hit: &SearchHit| {
            hit.id
                .parse::<i64>()
                .map_err(|_| StoreError::Decode(format!("bad id {}", hit.id)))
        },
    );
    let repo = DocumentRepository::new(test.collection("categories"), mapper);

    let names = repo.get_search_hits(&background(), &match_all()).await.unwrap();
    assert_eq!(names[&11], "cars");
    assert_eq!(names[&3], "bikes");

    let name = repo.get_by_id(&background(), "3", None).await.unwrap();
    assert_eq!(name, "bikes");
}

#[tokio::test]
async fn missing_entity_is_not_found() {
    let test = TestCluster::new();
    test.create_index("adverts");
    let err = repository(&test)
        .get_by_id(&background(), "nope", None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
