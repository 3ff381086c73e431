//! End-to-end HTTP tests over the in-memory cluster.
//!
//! Starts the router on an ephemeral port and exercises it with reqwest.

use docstore_api::{
    router, Advert, AdvertCategory, AdvertRepository, AdvertResponse, Category, CategoryRepository,
    CategoryResponse, ErrorPayload, QueryHandlers, StoreAdvertRepository, StoreCategoryRepository,
};
use docstore_testkit::prelude::*;
use std::sync::Arc;

async fn start_server(test: &TestCluster) -> String {
    let adverts = StoreAdvertRepository::new(&test.connection, "adverts");
    let categories = StoreCategoryRepository::new(&test.connection, "categories");

    adverts
        .save(
            &background(),
            &Advert {
                id: 42,
                title: "Road bike".into(),
                description: "Barely used".into(),
                version: 2,
                category: AdvertCategory {
                    id: 3,
                    name: "Sports".into(),
                    ..AdvertCategory::default()
                },
                created_by: "ann".into(),
                ..Advert::default()
            },
        )
        .await
        .unwrap();
    categories
        .save(
            &background(),
            &Category {
                id: 3,
                name: "Sports".into(),
                ..Category::default()
            },
        )
        .await
        .unwrap();

    let app = router(QueryHandlers::new(Arc::new(adverts), Arc::new(categories)));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn advert_by_id() {
    let test = TestCluster::new();
    let base = start_server(&test).await;

    let resp = reqwest::get(format!("{base}/adverts/42")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: AdvertResponse = resp.json().await.unwrap();
    assert_eq!(body.id, 42);
    assert_eq!(body.title, "Road bike");
    assert_eq!(body.description, "Barely used");
    assert_eq!(body.category.id, 3);
    assert_eq!(body.category.name, "Sports");

    // saved with id as routing, read back without routing
    assert_eq!(test.routing_of("adverts", "42").as_deref(), Some("42"));
    let get = test
        .requests()
        .into_iter()
        .find(|request| request.path_string() == "/adverts/_doc/42" && request.body.is_none())
        .unwrap();
    assert_eq!(get.query_param("routing"), None);
}

#[tokio::test]
async fn category_by_id() {
    let test = TestCluster::new();
    let base = start_server(&test).await;

    let resp = reqwest::get(format!("{base}/categories/3")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: CategoryResponse = resp.json().await.unwrap();
    assert_eq!(body, CategoryResponse { id: 3, name: "Sports".into() });
}

#[tokio::test]
async fn missing_advert_is_404_with_payload() {
    let test = TestCluster::new();
    let base = start_server(&test).await;

    let resp = reqwest::get(format!("{base}/adverts/999")).await.unwrap();
    assert_eq!(resp.status(), 404);
    let payload: ErrorPayload = resp.json().await.unwrap();
    assert_eq!(payload.title, "Not found");
    assert_eq!(payload.status, 404);
    assert_eq!(payload.request_uri, "/adverts/999");
    assert_eq!(payload.request_method, "GET");
}

#[tokio::test]
async fn non_numeric_id_is_400() {
    let test = TestCluster::new();
    let base = start_server(&test).await;

    let resp = reqwest::get(format!("{base}/categories/abc")).await.unwrap();
    assert_eq!(resp.status(), 400);
    let payload: ErrorPayload = resp.json().await.unwrap();
    assert_eq!(payload.title, "Bad request");
    assert_eq!(payload.detail, "id must be number");
}

#[tokio::test]
async fn cluster_failure_is_500() {
    let test = TestCluster::new();
    let base = start_server(&test).await;
    test.fail_times("/adverts/_doc/42", 5, Fault::Status(503));

    let resp = reqwest::get(format!("{base}/adverts/42")).await.unwrap();
    assert_eq!(resp.status(), 500);
    let payload: ErrorPayload = resp.json().await.unwrap();
    assert_eq!(payload.title, "Internal Server Error");
    assert!(payload.detail.contains("503"));
}

#[tokio::test]
async fn healthcheck_is_empty_200() {
    let test = TestCluster::new();
    let base = start_server(&test).await;

    let resp = reqwest::get(format!("{base}/healthcheck")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().is_empty());
}
