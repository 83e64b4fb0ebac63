//! HTTP surface for the configuration panels.

use std::sync::Arc;

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use compositor::{
    ActivateOutcome, DeactivateOutcome, EngineError, InMemorySurface, OverlayEngine,
    OverlaySummary, ProviderError,
};
use credentials::CredentialError;
use layers::{OverlayConfiguration, OverlayKind};
use runtime::Notice;
use serde::Serialize;
use serde_json::json;

#[derive(Clone)]
pub struct AppState {
    pub engine: OverlayEngine,
    pub surface: Arc<InMemorySurface>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/overlays", get(list_overlays).delete(deactivate_all))
        .route(
            "/overlays/:kind",
            axum::routing::post(activate)
                .put(reconfigure)
                .delete(deactivate),
        )
        .route("/surface", get(get_surface))
        .route("/notices", get(drain_notices))
        .with_state(state)
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::Build(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Credential(CredentialError::FetchTimeout)
            | EngineError::Provider(ProviderError::FetchTimeout) => StatusCode::GATEWAY_TIMEOUT,
            EngineError::Credential(_) | EngineError::Provider(_) => StatusCode::BAD_GATEWAY,
            EngineError::NotActive(_) => StatusCode::NOT_FOUND,
            EngineError::Busy(_) => StatusCode::CONFLICT,
            EngineError::Placement(_) | EngineError::Surface(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn parse_kind(raw: &str) -> Result<OverlayKind, ApiError> {
    raw.parse().map_err(|e: layers::BuildError| ApiError::bad_request(e.to_string()))
}

async fn healthz() -> Response {
    (StatusCode::OK, "ok").into_response()
}

async fn list_overlays(State(state): State<AppState>) -> Json<Vec<OverlaySummary>> {
    Json(
        state
            .engine
            .list_active()
            .iter()
            .map(|o| o.summary())
            .collect(),
    )
}

async fn activate(
    State(state): State<AppState>,
    AxumPath(kind): AxumPath<String>,
    Json(config): Json<OverlayConfiguration>,
) -> Result<Response, ApiError> {
    let kind = parse_kind(&kind)?;
    let outcome = state.engine.activate(kind, config).await?;
    let (status, label) = match outcome {
        ActivateOutcome::Activated => (StatusCode::CREATED, "activated"),
        ActivateOutcome::AlreadyActive => (StatusCode::OK, "already_active"),
        ActivateOutcome::Cancelled => (StatusCode::CONFLICT, "cancelled"),
    };
    Ok((status, Json(json!({ "kind": kind, "outcome": label }))).into_response())
}

async fn reconfigure(
    State(state): State<AppState>,
    AxumPath(kind): AxumPath<String>,
    Json(config): Json<OverlayConfiguration>,
) -> Result<Response, ApiError> {
    let kind = parse_kind(&kind)?;
    let report = state.engine.reconfigure(kind, config)?;
    Ok(Json(json!({
        "kind": kind,
        "applied": report.applied,
        "skipped": report.skipped,
        "sourceDeferred": report.source_deferred,
    }))
    .into_response())
}

async fn deactivate(
    State(state): State<AppState>,
    AxumPath(kind): AxumPath<String>,
) -> Result<Response, ApiError> {
    let kind = parse_kind(&kind)?;
    let label = match state.engine.deactivate(kind)? {
        DeactivateOutcome::Removed => "removed",
        DeactivateOutcome::CancelledPending => "cancelled_pending",
        DeactivateOutcome::NotActive => "not_active",
    };
    Ok(Json(json!({ "kind": kind, "outcome": label })).into_response())
}

async fn deactivate_all(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = state.engine.deactivate_all()?;
    Ok(Json(json!({ "removed": removed })))
}

#[derive(Serialize)]
struct SurfaceView {
    order: Vec<String>,
    sources: Vec<String>,
}

async fn get_surface(State(state): State<AppState>) -> Json<SurfaceView> {
    Json(SurfaceView {
        order: state.surface.order(),
        sources: state.surface.source_ids(),
    })
}

async fn drain_notices(State(state): State<AppState>) -> Json<Vec<Notice>> {
    Json(state.engine.notices().drain())
}
