/// Integration tests for the JSON query API
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use event_recorder::{config::RecorderConfig, recorder::Recorder, server::create_router};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn setup() -> (Arc<Recorder>, Router) {
    let recorder = Arc::new(Recorder::new(&RecorderConfig::default()).unwrap());
    recorder.initialize(Some("sqlite::memory:")).await.unwrap();
    let app = create_router(recorder.clone(), None);
    (recorder, app)
}

async fn call(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn seed(recorder: &Recorder) {
    recorder.cache().record_cache_miss("user:1");
    recorder
        .queries()
        .record_query("main", "select * from users", &[], Duration::from_millis(1500));
    recorder
        .queries()
        .record_query("main", "select 1", &[], Duration::from_millis(2));
    recorder.flush().await;
}

#[tokio::test]
async fn test_list_entries_with_filters() {
    let (recorder, app) = setup().await;
    seed(&recorder).await;

    let (status, body) = call(&app, Method::GET, "/entries").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);
    assert_eq!(body["limit"], 50);

    let (_, body) = call(&app, Method::GET, "/entries?type=query").await;
    assert_eq!(body["count"], 2);
    assert!(body["entries"]
        .as_array()
        .unwrap()
        .iter()
        .all(|e| e["type"] == "query"));

    let (_, body) = call(&app, Method::GET, "/entries?type=query&tag=slow").await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["entries"][0]["content"]["sql"], "select * from users");

    let (_, body) = call(&app, Method::GET, "/entries?limit=1&offset=1").await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["offset"], 1);

    let (_, body) = call(&app, Method::GET, "/entries?limit=100000").await;
    assert_eq!(body["limit"], 500);
}

#[tokio::test]
async fn test_bad_query_parameters() {
    let (_, app) = setup().await;

    let (status, body) = call(&app, Method::GET, "/entries?type=telemetry").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "bad_request");

    let (status, body) = call(&app, Method::GET, "/entries?limit=many").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "bad_request");
}

#[tokio::test]
async fn test_get_entry_by_uuid() {
    let (recorder, app) = setup().await;
    seed(&recorder).await;

    let (_, list) = call(&app, Method::GET, "/entries?type=cache").await;
    let uuid = list["entries"][0]["uuid"].as_str().unwrap().to_string();

    let (status, body) = call(&app, Method::GET, &format!("/entries/{}", uuid)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uuid"], uuid.as_str());
    assert_eq!(body["content"]["key"], "user:1");

    let (status, body) = call(&app, Method::GET, "/entries/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");
}

#[tokio::test]
async fn test_stats_and_clear() {
    let (recorder, app) = setup().await;
    seed(&recorder).await;

    let (status, body) = call(&app, Method::GET, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_entries"], 3);
    assert_eq!(body["entries_by_type"]["query"], 2);
    assert_eq!(body["entries_by_tag"]["slow"], 1);
    assert_eq!(body["retention_hours"], 24);
    assert_eq!(body["recording"], true);

    // Nothing is older than 1970
    let (status, body) = call(&app, Method::DELETE, "/entries?before=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 0);

    let (_, body) = call(&app, Method::DELETE, "/entries").await;
    assert_eq!(body["deleted"], 3);

    let (_, body) = call(&app, Method::GET, "/stats").await;
    assert_eq!(body["total_entries"], 0);
}

#[tokio::test]
async fn test_pause_and_resume() {
    let (recorder, app) = setup().await;

    let (status, body) = call(&app, Method::POST, "/pause").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recording"], false);

    recorder.cache().record_cache_miss("while-paused");
    recorder.flush().await;
    let (_, body) = call(&app, Method::GET, "/entries").await;
    assert_eq!(body["count"], 0);

    let (_, body) = call(&app, Method::POST, "/resume").await;
    assert_eq!(body["recording"], true);

    recorder.cache().record_cache_miss("after-resume");
    recorder.flush().await;
    let (_, body) = call(&app, Method::GET, "/entries").await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_watcher_switches() {
    let (recorder, app) = setup().await;

    let (status, body) = call(&app, Method::POST, "/watchers/cache/disable").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "cache");
    assert_eq!(body["enabled"], false);

    recorder.cache().record_cache_miss("skipped");
    recorder.flush().await;
    let (_, body) = call(&app, Method::GET, "/entries?type=cache").await;
    assert_eq!(body["count"], 0);

    let (_, body) = call(&app, Method::POST, "/watchers/cache/enable").await;
    assert_eq!(body["enabled"], true);

    let (status, body) = call(&app, Method::POST, "/watchers/telemetry/enable").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");

    let (_, body) = call(&app, Method::GET, "/watchers").await;
    assert_eq!(body.as_array().unwrap().len(), 9);
}

#[tokio::test]
async fn test_uninitialized_store_is_unavailable() {
    let recorder = Arc::new(Recorder::new(&RecorderConfig::default()).unwrap());
    let app = create_router(recorder, None);

    let (status, body) = call(&app, Method::GET, "/entries").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["type"], "store_unavailable");

    let (status, _) = call(&app, Method::GET, "/stats").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
