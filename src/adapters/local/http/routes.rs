use super::ApiError;
use crate::application::stream::StreamService;
use crate::domain::asset::{Asset, AssetId};
use crate::domain::session::SessionSummary;
use crate::ports::catalog::AssetCatalog;
use crate::ports::encoder::EncodeLauncher;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

type Service<C, E> = State<Arc<StreamService<C, E>>>;

#[derive(Debug, Serialize)]
pub struct StreamResponse {
    pub m3u8: String,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn catalog<C, E>(State(service): Service<C, E>) -> Result<Json<Vec<Asset>>, ApiError>
where
    C: AssetCatalog + 'static,
    E: EncodeLauncher + 'static,
{
    Ok(Json(service.catalog().list().await?))
}

pub async fn stream<C, E>(
    State(service): Service<C, E>,
    Path(id): Path<AssetId>,
) -> Result<Json<StreamResponse>, ApiError>
where
    C: AssetCatalog + 'static,
    E: EncodeLauncher + 'static,
{
    let m3u8 = service.start_or_resume(id).await?;
    Ok(Json(StreamResponse { m3u8 }))
}

/// Explicit teardown: cancels the encoder, keeps files on disk.
pub async fn stop<C, E>(State(service): Service<C, E>, Path(id): Path<AssetId>) -> StatusCode
where
    C: AssetCatalog + 'static,
    E: EncodeLauncher + 'static,
{
    if service.stop(id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn sessions<C, E>(State(service): Service<C, E>) -> Json<Vec<SessionSummary>>
where
    C: AssetCatalog + 'static,
    E: EncodeLauncher + 'static,
{
    Json(service.registry().list())
}
