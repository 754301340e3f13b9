//! Recorder query API handlers
//!
//! JSON endpoints for browsing entries, statistics and switches.

use crate::error::AppError;
use crate::recorder::{Entry, EntryQuery, EntryType, Recorder, Statistics};
use crate::watchers::WatcherInfo;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Largest page the API hands out
pub const MAX_LIMIT: usize = 500;

/// Shared state for the query API
pub type RecorderState = Arc<Recorder>;

/// Query parameters for entry listing
#[derive(Debug, Deserialize)]
pub struct EntriesParams {
    /// Entry type name (request, query, cache, ...)
    #[serde(rename = "type")]
    pub entry_type: Option<String>,

    /// Exact tag
    pub tag: Option<String>,

    /// Page size, capped at 500
    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    crate::recorder::store::DEFAULT_LIMIT
}

impl EntriesParams {
    fn into_query(self) -> Result<EntryQuery, AppError> {
        let mut query = EntryQuery::default()
            .limit(self.limit.min(MAX_LIMIT))
            .offset(self.offset);

        if let Some(name) = self.entry_type.filter(|t| !t.is_empty()) {
            query = query.of_type(name.parse::<EntryType>()?);
        }
        if let Some(tag) = self.tag.filter(|t| !t.is_empty()) {
            query = query.tagged(tag);
        }

        Ok(query)
    }
}

/// Query parameters for clearing entries
#[derive(Debug, Deserialize)]
pub struct ClearParams {
    /// Remove entries created before this Unix timestamp (ms)
    pub before: Option<u64>,
}

/// Response for entry listing
#[derive(Debug, Serialize)]
pub struct EntriesResponse {
    pub entries: Vec<Entry>,
    pub count: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub deleted: u64,
}

#[derive(Debug, Serialize)]
pub struct RecordingResponse {
    pub recording: bool,
}

/// GET /entries - List entries, newest first
///
/// Example: GET /entries?type=query&tag=slow&limit=20
pub async fn list_entries(
    State(recorder): State<RecorderState>,
    params: Result<Query<EntriesParams>, QueryRejection>,
) -> Result<Json<EntriesResponse>, AppError> {
    let Query(params) = params.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let query = params.into_query()?;

    let entries = recorder.get_entries(&query).await?;

    Ok(Json(EntriesResponse {
        count: entries.len(),
        entries,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// GET /entries/:uuid - Fetch one entry
pub async fn get_entry(
    State(recorder): State<RecorderState>,
    Path(uuid): Path<String>,
) -> Result<Json<Entry>, AppError> {
    recorder
        .get_entry(&uuid)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("entry '{}'", uuid)))
}

/// DELETE /entries - Clear entries
///
/// Example: DELETE /entries?before=1767863000000
pub async fn clear_entries(
    State(recorder): State<RecorderState>,
    params: Result<Query<ClearParams>, QueryRejection>,
) -> Result<Json<ClearResponse>, AppError> {
    let Query(params) = params.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let deleted = recorder.clear_entries(params.before).await?;
    Ok(Json(ClearResponse { deleted }))
}

/// GET /stats - Recorder statistics
pub async fn stats(State(recorder): State<RecorderState>) -> Result<Json<Statistics>, AppError> {
    Ok(Json(recorder.get_statistics().await?))
}

/// POST /pause
pub async fn pause(State(recorder): State<RecorderState>) -> Json<RecordingResponse> {
    recorder.pause();
    Json(RecordingResponse {
        recording: recorder.is_recording(),
    })
}

/// POST /resume
pub async fn resume(State(recorder): State<RecorderState>) -> Json<RecordingResponse> {
    recorder.resume();
    Json(RecordingResponse {
        recording: recorder.is_recording(),
    })
}

/// GET /watchers
pub async fn list_watchers(State(recorder): State<RecorderState>) -> Json<Vec<WatcherInfo>> {
    Json(recorder.watchers())
}

/// GET /watchers/:name
pub async fn get_watcher(
    State(recorder): State<RecorderState>,
    Path(name): Path<String>,
) -> Result<Json<WatcherInfo>, AppError> {
    recorder
        .get_watcher(&name)
        .map(Json)
        .ok_or_else(|| unknown_watcher(&name))
}

/// POST /watchers/:name/enable
pub async fn enable_watcher(
    State(recorder): State<RecorderState>,
    Path(name): Path<String>,
) -> Result<Json<WatcherInfo>, AppError> {
    if !recorder.enable_watcher(&name) {
        return Err(unknown_watcher(&name));
    }
    get_watcher(State(recorder), Path(name)).await
}

/// POST /watchers/:name/disable
pub async fn disable_watcher(
    State(recorder): State<RecorderState>,
    Path(name): Path<String>,
) -> Result<Json<WatcherInfo>, AppError> {
    if !recorder.disable_watcher(&name) {
        return Err(unknown_watcher(&name));
    }
    get_watcher(State(recorder), Path(name)).await
}

fn unknown_watcher(name: &str) -> AppError {
    AppError::NotFound(format!("watcher '{}'", name))
}

/// GET /health
pub async fn health(State(recorder): State<RecorderState>) -> impl IntoResponse {
    let status = if recorder.is_initialized() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if status == StatusCode::OK { "healthy" } else { "uninitialized" },
            "recording": recorder.is_recording(),
            "enabled": recorder.is_enabled(),
        })),
    )
}
