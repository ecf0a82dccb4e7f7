//! Admin HTTP API handlers (C9 ambient stack).

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::config::StreamSource;
use crate::core::PlaySource;
use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
pub struct StreamSummary {
    pub name: String,
    pub sources: Vec<String>,
    pub producers: usize,
    pub consumers: usize,
}

pub async fn list_streams(State(state): State<Arc<AppState>>) -> Json<Vec<StreamSummary>> {
    let mut out: Vec<StreamSummary> = state
        .registry
        .stream_names()
        .into_iter()
        .filter_map(|name| state.registry.get_stream(&name))
        .map(|stream| StreamSummary {
            name: stream.name().to_string(),
            sources: stream.sources().to_vec(),
            producers: stream.producer_count(),
            consumers: stream.consumer_count(),
        })
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Json(out)
}

pub async fn get_stream(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<StreamSummary>> {
    let stream = state
        .registry
        .get_stream(&name)
        .ok_or_else(|| AppError::NotFound(format!("no stream named {name}")))?;
    Ok(Json(StreamSummary {
        name: stream.name().to_string(),
        sources: stream.sources().to_vec(),
        producers: stream.producer_count(),
        consumers: stream.consumer_count(),
    }))
}

#[derive(Deserialize)]
pub struct PutStreamRequest {
    pub source: StreamSource,
}

pub async fn put_stream(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<PutStreamRequest>,
) -> Result<Json<StreamSummary>> {
    let urls = body.source.urls();
    if urls.is_empty() {
        return Err(AppError::BadRequest("at least one source URL is required".to_string()));
    }

    state
        .config
        .update(|c| {
            c.streams.insert(name.clone(), body.source.clone());
        })
        .await?;

    state.registry.remove_stream(&name);
    let stream = state.registry.add_stream(name.clone(), urls.clone());

    Ok(Json(StreamSummary {
        name,
        sources: urls,
        producers: stream.producer_count(),
        consumers: stream.consumer_count(),
    }))
}

pub async fn delete_stream(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state
        .config
        .update(|c| {
            c.streams.remove(&name);
        })
        .await?;
    state.registry.remove_stream(&name);
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
pub struct PlayRequest {
    pub src: String,
}

pub async fn play_stream(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<PlayRequest>,
) -> Result<Json<serde_json::Value>> {
    let stream = state
        .registry
        .get_stream(&name)
        .ok_or_else(|| AppError::NotFound(format!("no stream named {name}")))?;

    stream
        .play(&state.registry, PlaySource::Url(body.src))
        .await?;

    Ok(Json(serde_json::json!({ "success": true })))
}
