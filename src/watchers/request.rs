use super::{keyed, millis, WatcherScope};
use crate::recorder::{bounded_value, family_hash, Entry, Extra, RequestContent};
use crate::redact::{redact_headers, redact_json};
use axum::http::Uri;
use serde_json::Value;
use std::time::Duration;

/// Incoming request as seen by the framework adapter
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub method: String,
    pub uri: String,
    pub ip: Option<String>,
    pub headers: Vec<(String, String)>,
    pub payload: Option<Value>,
}

impl RequestMeta {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Path component of the uri, without query string
    pub fn path(&self) -> String {
        match self.uri.parse::<Uri>() {
            Ok(uri) => uri.path().to_string(),
            Err(_) => self
                .uri
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// Outgoing response as seen by the framework adapter
#[derive(Debug, Clone, Default)]
pub struct ResponseMeta {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ResponseMeta {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

/// Records handled HTTP requests
pub struct RequestWatcher<'a> {
    scope: WatcherScope<'a>,
}

impl<'a> RequestWatcher<'a> {
    pub(crate) fn new(scope: WatcherScope<'a>) -> Self {
        Self { scope }
    }

    /// Record a finished request
    ///
    /// Credentials in headers and payload fields are masked; bodies larger
    /// than the payload limit are replaced by a summary.
    pub fn record_request(
        &self,
        request: &RequestMeta,
        response: &ResponseMeta,
        duration: Duration,
        peak_memory: Option<u64>,
    ) {
        let path = request.path();

        self.scope.capture(&path, || {
            let settings = self.scope.settings();
            let limit = settings.payload_limit;
            let method = request.method.to_ascii_uppercase();
            let slow = duration > settings.slow_request;

            let mut tags = vec![
                keyed("method", &method),
                keyed("status", format!("{}xx", response.status / 100)),
            ];
            if slow {
                tags.push("slow".to_string());
            }
            if response.status >= 500 {
                tags.push("failed".to_string());
            }

            let content = RequestContent {
                method: method.clone(),
                uri: crate::recorder::bounded_text(&request.uri, limit),
                path: path.clone(),
                ip: request.ip.clone(),
                headers: redact_headers(
                    request.headers.iter().map(|(n, v)| (n.as_str(), v.as_str())),
                    limit,
                ),
                payload: bounded_body(request.payload.as_ref(), limit),
                response_status: response.status,
                response_headers: redact_headers(
                    response.headers.iter().map(|(n, v)| (n.as_str(), v.as_str())),
                    limit,
                ),
                response: bounded_body(response.body.as_ref(), limit),
                duration_ms: millis(duration),
                memory_bytes: peak_memory,
                extra: Extra::new(),
            };

            let route = self.scope.normalizer().normalize_path(&path);

            Entry::new(content, tags, Some(family_hash(&["request", &method, &route])), true)
        });
    }
}

fn bounded_body(body: Option<&Value>, limit: usize) -> Value {
    match body {
        Some(body) => bounded_value(redact_json(body.clone()), limit),
        None => Value::Null,
    }
}
