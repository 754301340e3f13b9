/// Integration tests for the framework adapters
use axum::{
    body::{to_bytes, Body},
    extract::{Path, State},
    http::{Request, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use event_recorder::{
    config::RecorderConfig,
    ingest::{dispatch_job, observe_command, observe_job, observe_query, record_requests, CommandOutcome},
    recorder::{EntryContent, EntryQuery, EntryType, Recorder},
    watchers::JobMeta,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn recorder() -> Arc<Recorder> {
    let recorder = Arc::new(Recorder::new(&RecorderConfig::default()).unwrap());
    recorder.initialize(Some("memory")).await.unwrap();
    recorder
}

async fn show_user(State(recorder): State<Arc<Recorder>>, Path(id): Path<u64>) -> Json<Value> {
    recorder
        .queries()
        .record_query("main", "select * from users where id = ?", &[json!(id)], Duration::from_millis(3));
    recorder.cache().record_cache_miss(&format!("user:{}", id));
    Json(json!({ "id": id }))
}

async fn login(Json(body): Json<Value>) -> StatusCode {
    if body["password"].is_string() {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    }
}

async fn upload(body: Body) -> (StatusCode, &'static str) {
    match to_bytes(body, usize::MAX).await {
        Ok(_) => (StatusCode::OK, "stored"),
        Err(_) => (StatusCode::BAD_GATEWAY, "upload interrupted"),
    }
}

async fn explode() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

fn app(recorder: Arc<Recorder>) -> Router {
    Router::new()
        .route("/users/:id", get(show_user))
        .route("/login", post(login))
        .route("/upload", post(upload))
        .route("/explode", get(explode))
        .layer(middleware::from_fn_with_state(recorder.clone(), record_requests))
        .with_state(recorder)
}

#[tokio::test]
async fn test_request_batch_groups_handler_entries() {
    let recorder = recorder().await;

    let response = app(recorder.clone())
        .oneshot(
            Request::get("/users/42?tab=posts")
                .header("x-forwarded-for", "203.0.113.9")
                .header("authorization", "Bearer secret-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    recorder.flush().await;
    let entries = recorder.get_entries(&EntryQuery::default()).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.batch_id() == entries[0].batch_id()));

    let request = entries
        .iter()
        .find(|e| e.entry_type() == EntryType::Request)
        .unwrap();
    assert!(request.has_tag("method:GET"));
    assert!(request.has_tag("status:2xx"));
    match request.content() {
        EntryContent::Request(content) => {
            assert_eq!(content.path, "/users/42");
            assert_eq!(content.uri, "/users/42?tab=posts");
            assert_eq!(content.ip.as_deref(), Some("203.0.113.9"));
            assert_eq!(content.headers["authorization"], "********");
            assert_eq!(content.response_status, 200);
        }
        other => panic!("unexpected content {:?}", other),
    }
}

#[tokio::test]
async fn test_request_payload_is_captured_and_masked() {
    let recorder = recorder().await;
    let body = json!({ "email": "ada@example.com", "password": "hunter2" }).to_string();

    let response = app(recorder.clone())
        .oneshot(
            Request::post("/login")
                .header("content-type", "application/json")
                .header("content-length", body.len())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    // The handler still sees the body
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    recorder.flush().await;
    let entries = recorder
        .get_entries(&EntryQuery::default().of_type(EntryType::Request))
        .await
        .unwrap();
    match entries[0].content() {
        EntryContent::Request(content) => {
            assert_eq!(content.payload["email"], "ada@example.com");
            assert_eq!(content.payload["password"], "********");
        }
        other => panic!("unexpected content {:?}", other),
    }
}

#[tokio::test]
async fn test_unreadable_body_still_reaches_handler() {
    let recorder = recorder().await;
    let chunks: Vec<Result<&'static str, std::io::Error>> = vec![
        Ok(r#"{"rows":"#),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client went away")),
    ];

    let response = app(recorder.clone())
        .oneshot(
            Request::post("/upload")
                .header("content-type", "application/json")
                .header("content-length", "64")
                .body(Body::from_stream(futures::stream::iter(chunks)))
                .unwrap(),
        )
        .await
        .unwrap();
    // The handler decided the status, not the middleware
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    recorder.flush().await;
    let entries = recorder
        .get_entries(&EntryQuery::default().of_type(EntryType::Request))
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    match entries[0].content() {
        EntryContent::Request(content) => {
            assert_eq!(content.response_status, 502);
            assert!(content.payload.is_null());
        }
        other => panic!("unexpected content {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_requests_are_tagged() {
    let recorder = recorder().await;

    app(recorder.clone())
        .oneshot(Request::get("/explode").body(Body::empty()).unwrap())
        .await
        .unwrap();

    recorder.flush().await;
    let failed = recorder
        .get_entries(&EntryQuery::default().tagged("failed"))
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].has_tag("status:5xx"));
}

#[tokio::test]
async fn test_paused_recorder_passes_requests_through() {
    let recorder = recorder().await;
    recorder.pause();

    let response = app(recorder.clone())
        .oneshot(Request::get("/users/1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    recorder.flush().await;
    assert!(recorder
        .get_entries(&EntryQuery::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_worker_and_cli_adapters() {
    let recorder = recorder().await;

    let job = JobMeta::new("job-1", "ImportCsv", "imports").with_attempts(1, 2);
    dispatch_job(&recorder, &job);
    let result: Result<(), String> = observe_job(&recorder, &job, async {
        let rows: Result<u64, std::io::Error> =
            observe_query(&recorder, "main", "insert into rows values (?)", &[json!(1)], async { Ok(1) })
                .await;
        rows.map(|_| ()).map_err(|e| e.to_string())?;
        Err::<(), String>("malformed row 2".to_string())
    })
    .await;
    assert!(result.is_err());

    let outcome = observe_command(&recorder, "import:csv", &["rows.csv".to_string()], async {
        CommandOutcome::success("imported 1 row")
    })
    .await;
    assert_eq!(outcome.exit_code, 0);

    recorder.flush().await;
    let all = recorder.get_entries(&EntryQuery::default()).await.unwrap();
    // dispatched, started, query, failed, command
    assert_eq!(all.len(), 5);

    let retrying = recorder
        .get_entries(&EntryQuery::default().tagged("will-retry"))
        .await
        .unwrap();
    assert_eq!(retrying.len(), 1);

    let query = all.iter().find(|e| e.entry_type() == EntryType::Query).unwrap();
    let started = all
        .iter()
        .find(|e| matches!(e.content(), EntryContent::Job(c) if c.status.as_str() == "started"))
        .unwrap();
    assert_eq!(query.batch_id(), started.batch_id());

    let command = all.iter().find(|e| e.entry_type() == EntryType::Command).unwrap();
    assert_ne!(command.batch_id(), started.batch_id());
}
