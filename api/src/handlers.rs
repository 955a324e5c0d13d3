use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    body::Bytes,
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;

use network::ReplicaPayload;

use crate::{ApiError, ApiResult, ObjectService, PathRequest, RegisterPeerRequest, StoreRequest};

pub type AppState = Arc<dyn ObjectService>;

const METADATA_HEADER_PREFIX: &str = "x-meta-";

#[derive(serde::Deserialize)]
pub struct StoreQuery {
    path: Option<String>,
}

pub async fn health_check(State(state): State<AppState>) -> ApiResult<Response> {
    Ok(Json(state.health().await).into_response())
}

// Node-to-node routes

pub async fn get_replica(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let data = state
        .read_local(&id)
        .await?
        .ok_or_else(|| ApiError::NoSuchFile(id))?;

    Ok((
        StatusCode::OK,
        [("content-type", "application/octet-stream")],
        data,
    ).into_response())
}

pub async fn put_replica(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let payload = ReplicaPayload::decode(&body)
        .map_err(|e| ApiError::InvalidRequest(format!("malformed replica payload: {}", e)))?;

    if payload.record.id != id {
        return Err(ApiError::InvalidRequest(format!(
            "payload is for {} but was posted to {}",
            payload.record.id, id
        )));
    }

    if !payload.record.verify(&payload.data) {
        return Err(ApiError::InvalidRequest(format!("hash mismatch for {}", id)));
    }

    state.accept_replica(payload).await?;
    Ok(StatusCode::CREATED.into_response())
}

pub async fn delete_replica(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    if state.drop_replica(&id).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(ApiError::NoSuchFile(id))
    }
}

// Client routes

pub async fn store_file(
    State(state): State<AppState>,
    Query(query): Query<StoreQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let mime_type = headers
        .get("content-type")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    let mut metadata = HashMap::new();
    for (name, value) in headers.iter() {
        if let Some(meta_key) = name.as_str().strip_prefix(METADATA_HEADER_PREFIX) {
            if let Ok(meta_value) = value.to_str() {
                metadata.insert(meta_key.to_string(), meta_value.to_string());
            }
        }
    }

    let record = state
        .store(StoreRequest {
            path: query.path.unwrap_or_default(),
            data: body,
            mime_type,
            metadata,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(record)).into_response())
}

pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let record = state
        .record(&id)
        .await
        .ok_or_else(|| ApiError::NoSuchFile(id.clone()))?;

    let data = state
        .retrieve(&id)
        .await?
        .ok_or_else(|| ApiError::Unreachable(id))?;

    Ok((
        StatusCode::OK,
        [
            ("content-type", record.mime_type),
            ("etag", format!("\"{}\"", record.hash)),
        ],
        data,
    ).into_response())
}

pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let record = state.record(&id).await.ok_or_else(|| ApiError::NoSuchFile(id))?;
    Ok(Json(record).into_response())
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    if state.remove(&id).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(ApiError::NoSuchFile(id))
    }
}

pub async fn register_peer(
    State(state): State<AppState>,
    Json(request): Json<RegisterPeerRequest>,
) -> ApiResult<Response> {
    if request.node_id.trim().is_empty() || request.endpoint.trim().is_empty() {
        return Err(ApiError::InvalidRequest("node_id and endpoint are required".to_string()));
    }

    state.register_peer(&request.node_id, &request.endpoint).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Response> {
    Ok(Json(state.stats().await).into_response())
}

pub async fn backup(
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> ApiResult<Response> {
    let summary = state.backup(std::path::Path::new(&request.path)).await?;
    Ok(Json(summary).into_response())
}

pub async fn restore(
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> ApiResult<Response> {
    let summary = state.restore(std::path::Path::new(&request.path)).await?;
    Ok(Json(summary).into_response())
}

pub async fn not_found(method: Method, uri: Uri) -> ApiResult<Response> {
    Err(ApiError::NotFound(format!("No route for {} {}", method, uri.path())))
}
