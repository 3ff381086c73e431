//! Collection client behavior against the in-memory cluster.

use docstore_client::{DocumentRef, IndexDocument, Method, StoreError};
use docstore_testkit::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Listing {
    title: String,
    price: i64,
}

#[tokio::test]
async fn index_then_get_round_trips_source_and_routing() {
    let test = TestCluster::new();
    let adverts = test.collection("adverts");
    let listing = Listing {
        title: "bike".into(),
        price: 120,
    };

    adverts
        .index_document(&background(), "7", Some("7"), &listing)
        .await
        .unwrap();

    assert_eq!(test.routing_of("adverts", "7").as_deref(), Some("7"));
    let put = &test.requests()[0];
    assert_eq!(put.method, Method::Put);
    assert_eq!(put.query_param("refresh"), Some("false"));

    let hit = adverts.get_by_id(&background(), "7", Some("7")).await.unwrap();
    assert_eq!(hit.id, "7");
    assert_eq!(hit.source_as::<Listing>().unwrap(), listing);
}

#[tokio::test]
async fn missing_document_is_not_found_and_not_retried() {
    let test = TestCluster::new();
    test.create_index("adverts");
    let adverts = test.collection("adverts");

    let err = adverts.get_by_id(&background(), "404", None).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(test.requests_to("/adverts/_doc/404"), 1);

    assert!(!adverts.exists_by_id(&background(), "404", None).await.unwrap());
}

#[tokio::test]
async fn exists_sees_indexed_documents() {
    let test = TestCluster::new();
    test.insert("adverts", "1", json!({"title": "lamp"}));
    let adverts = test.collection("adverts");
    assert!(adverts.exists_by_id(&background(), "1", None).await.unwrap());
}

#[tokio::test]
async fn index_into_missing_collection_is_not_found() {
    let test = TestCluster::new();
    test.disable_auto_create_index();
    let err = test
        .collection("adverts")
        .index_document(&background(), "1", None, &json!({"title": "x"}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn delete_is_idempotent() {
    let test = TestCluster::new();
    test.insert("adverts", "1", json!({}));
    let adverts = test.collection("adverts");

    adverts.delete_by_id(&background(), "1", None).await.unwrap();
    adverts.delete_by_id(&background(), "1", None).await.unwrap();
    assert_eq!(test.document_count("adverts"), 0);

    let delete = &test.requests()[0];
    assert_eq!(delete.query_param("timeout"), Some("2s"));
}

#[tokio::test]
async fn transient_transport_failures_are_retried() {
    let test = TestCluster::new();
    test.insert("adverts", "1", json!({"title": "lamp"}));
    test.fail_times("/adverts/_doc/1", 2, Fault::Transport);

    let hit = test
        .collection("adverts")
        .get_by_id(&background(), "1", None)
        .await
        .unwrap();
    assert_eq!(hit.id, "1");
    assert_eq!(test.requests_to("/adverts/_doc/1"), 3);
}

#[tokio::test]
async fn retries_stop_after_five_attempts() {
    let test = TestCluster::new();
    test.insert("adverts", "1", json!({}));
    test.fail_times("/adverts/_doc/1", 10, Fault::Transport);

    let err = test
        .collection("adverts")
        .get_by_id(&background(), "1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Transport { .. }));
    assert_eq!(test.requests_to("/adverts/_doc/1"), 5);
}

#[tokio::test]
async fn count_retries_three_times() {
    let test = TestCluster::new();
    test.create_index("adverts");
    test.fail_times("_count", 3, Fault::Status(503));

    let err = test
        .collection("adverts")
        .count(&background(), &match_all())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Internal(_)));
    assert_eq!(test.requests_to("_count"), 3);
}

#[tokio::test]
async fn count_reports_shard_failures() {
    let test = scenarios::seeded_cluster("adverts", 4);
    test.fail_times("_count", 3, Fault::ShardFailure);

    let err = test
        .collection("adverts")
        .count(&background(), &match_all())
        .await
        .unwrap_err();
    match err {
        StoreError::ShardFailure { failed, total, .. } => {
            assert_eq!(failed, 1);
            assert_eq!(total, 5);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn search_disables_total_hits_and_caps_size() {
    let test = scenarios::seeded_cluster("adverts", 30);
    let adverts = test.collection("adverts");

    let response = adverts
        .search_with_size(&background(), &term_query("group", 1), 4)
        .await
        .unwrap();
    assert_eq!(response.hits.hits.len(), 4);
    assert!(response.hits.total.is_none());

    let request = test.requests().pop().unwrap();
    assert_eq!(request.query_param("track_total_hits"), Some("false"));
    assert_eq!(request.query_param("size"), Some("4"));
    assert_eq!(request.wire_method(), Method::Post);
}

#[tokio::test]
async fn search_against_missing_index_fails() {
    let test = TestCluster::new();
    let err = test
        .collection("missing")
        .search(&background(), &match_all())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("index_not_found_exception"));
}

#[tokio::test]
async fn search_shard_failure_is_an_error() {
    let test = scenarios::seeded_cluster("adverts", 3);
    test.fail_next(Fault::ShardFailure);
    let err = test
        .collection("adverts")
        .search(&background(), &match_all())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ShardFailure { failed: 1, .. }));
}

#[tokio::test]
async fn batch_writes_and_deletes() {
    let test = TestCluster::new();
    let adverts = test.collection("adverts");
    let docs: Vec<IndexDocument<Listing>> = (0..3)
        .map(|i| {
            IndexDocument::new(
                i.to_string(),
                Listing {
                    title: format!("item {}", i),
                    price: i,
                },
            )
            .with_routing(i.to_string())
        })
        .collect();

    adverts.index_documents(&background(), &docs).await.unwrap();
    assert_eq!(test.document_count("adverts"), 3);
    assert_eq!(test.routing_of("adverts", "2").as_deref(), Some("2"));

    adverts
        .delete_documents(&background(), &[DocumentRef::new("0"), DocumentRef::new("1")])
        .await
        .unwrap();
    assert_eq!(test.document_count("adverts"), 1);

    let empty: Vec<IndexDocument<Listing>> = Vec::new();
    adverts.index_documents(&background(), &empty).await.unwrap();
    assert_eq!(test.bulk_batches(), vec![3, 2]);
}
