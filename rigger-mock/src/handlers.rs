use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use rigger_core::client::wire::{CreateResourceRequest, ResourceDocument};
use rigger_core::{ResourceId, ResourceKind};
use serde::Serialize;
use tracing::{debug, info};

use crate::state::AppState;

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: u16,
}

impl ApiError {
    fn new(code: u16, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

// === Version ===

#[derive(Serialize)]
pub struct VersionInfo {
    pub version: String,
}

pub async fn get_version() -> Json<VersionInfo> {
    Json(VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// === Resources ===

pub async fn list_resources(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ResourceDocument>>, ApiError> {
    authorize(&state, &headers)?;
    let documents = state
        .list()
        .await
        .into_iter()
        .map(|(id, config)| ResourceDocument {
            kind: id.kind,
            name: id.name,
            config,
        })
        .collect();
    Ok(Json(documents))
}

pub async fn get_resource(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((kind, name)): Path<(String, String)>,
) -> Result<Json<ResourceDocument>, ApiError> {
    authorize(&state, &headers)?;
    let id = resource_id(&kind, name)?;
    injected_fault(&state, &id).await?;

    let config = state
        .get(&id)
        .await
        .ok_or_else(|| ApiError::new(404, format!("{} not found", id)))?;
    debug!(resource = %id, "Described");

    Ok(Json(ResourceDocument {
        kind: id.kind,
        name: id.name,
        config,
    }))
}

pub async fn create_resource(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((kind, name)): Path<(String, String)>,
    Json(req): Json<CreateResourceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;
    let id = resource_id(&kind, name)?;
    injected_fault(&state, &id).await?;

    let config = state
        .create(id.clone(), req.config)
        .await
        .ok_or_else(|| ApiError::new(409, format!("{} already exists", id)))?;

    info!(resource = %id, "Created resource");
    state.audit.resource_created(&id);

    Ok((
        StatusCode::CREATED,
        Json(ResourceDocument {
            kind: id.kind,
            name: id.name,
            config,
        }),
    ))
}

// === Helpers ===

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.token.as_deref() else {
        return Ok(());
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => Ok(()),
        Some(_) => Err(ApiError::new(403, "token is not authorized")),
        None => Err(ApiError::new(401, "missing bearer token")),
    }
}

fn resource_id(kind: &str, name: String) -> Result<ResourceId, ApiError> {
    let kind: ResourceKind = kind.parse().map_err(|e| ApiError::new(400, format!("{}", e)))?;
    Ok(ResourceId::new(kind, name))
}

async fn injected_fault(state: &AppState, id: &ResourceId) -> Result<(), ApiError> {
    match state.take_fault(id).await {
        Some(code) => {
            debug!(resource = %id, code, "Answering with injected fault");
            Err(ApiError::new(code, "injected fault"))
        }
        None => Ok(()),
    }
}
