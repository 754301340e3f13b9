use crate::recorder::Recorder;
use crate::watchers::{RequestMeta, ResponseMeta};
use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use futures::{future, stream, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Request recording middleware
///
/// Runs the rest of the stack inside a batch, so queries, cache calls and
/// errors recorded while handling the request share its batch id.
///
/// # Example
///
/// ```ignore
/// let app = Router::new()
///     .route("/users/:id", get(show_user))
///     .layer(middleware::from_fn_with_state(recorder.clone(), record_requests));
/// ```
pub async fn record_requests(
    State(recorder): State<Arc<Recorder>>,
    req: Request,
    next: Next,
) -> Response {
    if !recorder.is_capturing() {
        return next.run(req).await;
    }

    let limit = recorder.watcher_settings().payload_limit;
    let batch_owner = recorder.clone();

    batch_owner
        .with_batch(async move {
            let started = Instant::now();

            let (parts, body) = req.into_parts();
            let mut meta = RequestMeta::new(parts.method.as_str(), parts.uri.to_string());
            meta.ip = client_ip(
                &parts.headers,
                parts.extensions.get::<ConnectInfo<SocketAddr>>(),
            );
            meta.headers = header_pairs(&parts.headers);

            let body = if json_body_within(&parts.headers, limit) {
                let (payload, body) = capture_json_body(body, limit).await;
                meta.payload = payload;
                body
            } else {
                body
            };

            let response = next.run(Request::from_parts(parts, body)).await;

            let mut response_meta = ResponseMeta::new(response.status().as_u16());
            response_meta.headers = header_pairs(response.headers());

            recorder
                .requests()
                .record_request(&meta, &response_meta, started.elapsed(), None);

            response
        })
        .await
}

/// Read up to `limit` bytes of a JSON body
///
/// Returns the parsed payload and a body equivalent to the original. A body
/// that turns out larger than `limit`, or fails mid-stream, is handed on
/// as-is (buffered prefix, then the rest or the error) without a payload.
async fn capture_json_body(body: Body, limit: usize) -> (Option<Value>, Body) {
    let mut chunks = body.into_data_stream();
    let mut buffered = Vec::new();

    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(chunk) => {
                buffered.extend_from_slice(&chunk);
                if buffered.len() > limit {
                    let head = stream::once(future::ready(Ok(Bytes::from(buffered))));
                    return (None, Body::from_stream(head.chain(chunks)));
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Request body failed while capturing payload");
                let replay = stream::iter([Ok(Bytes::from(buffered)), Err(e)]);
                return (None, Body::from_stream(replay));
            }
        }
    }

    let bytes = Bytes::from(buffered);
    (serde_json::from_slice::<Value>(&bytes).ok(), Body::from(bytes))
}

/// Forwarded address first, then the socket peer
fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// JSON body with a declared length no larger than `limit`
fn json_body_within(headers: &HeaderMap, limit: usize) -> bool {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    let length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    is_json && length.is_some_and(|len| len <= limit)
}
