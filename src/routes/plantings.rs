// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Planting workflow routes.
//!
//! Each workflow lives in the registry until it is committed, cancelled, or
//! expires after sitting idle. Starting one makes sure the caller has a
//! profile to credit.
//! Requests for one workflow are serialized by its mutex.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::Coordinates;
use crate::services::{
    ensure_profile, CommitReceipt, PlantingWorkflow, WorkflowHandle, WorkflowView,
};
use crate::session::SessionContext;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/plantings", post(start_workflow))
        .route(
            "/api/plantings/{id}",
            axum::routing::get(get_workflow).delete(cancel_workflow),
        )
        .route("/api/plantings/{id}/details", put(set_details))
        .route("/api/plantings/{id}/locate", post(locate))
        .route("/api/plantings/{id}/advance", post(advance))
        .route(
            "/api/plantings/{id}/photo",
            put(attach_photo).delete(discard_photo),
        )
        .route(
            "/api/plantings/{id}/camera",
            post(start_camera).delete(stop_camera),
        )
        .route("/api/plantings/{id}/camera/capture", post(capture_frame))
        .route("/api/plantings/{id}/liveness", post(check_liveness))
        .route("/api/plantings/{id}/commit", post(commit))
}

fn lookup(state: &AppState, id: Uuid, user: &AuthUser) -> Result<WorkflowHandle> {
    state.workflows.get(id, &user.user_id)
}

async fn start_workflow(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<(StatusCode, Json<WorkflowView>)> {
    // Commit credits this profile; make sure it exists before any step
    let mut session = SessionContext::from_auth(&user);
    ensure_profile(state.backend.as_ref(), &mut session).await?;

    let workflow = PlantingWorkflow::new(user.user_id.clone());
    let view = workflow.view();
    let id = state.workflows.insert(workflow);

    tracing::info!(workflow_id = %id, user_id = %user.user_id, "Planting workflow started");
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowView>> {
    let handle = lookup(&state, id, &user)?;
    let workflow = handle.lock().await;
    Ok(Json(workflow.view()))
}

async fn cancel_workflow(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowView>> {
    let handle = lookup(&state, id, &user)?;
    let mut workflow = handle.lock().await;
    workflow.cancel()?;
    state.workflows.remove(id);
    Ok(Json(workflow.view()))
}

// ─── Details ─────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct DetailsRequest {
    #[validate(length(max = 64))]
    #[serde(default)]
    pub species: String,
    #[validate(length(max = 500))]
    #[serde(default)]
    pub location: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

async fn set_details(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<DetailsRequest>,
) -> Result<Json<WorkflowView>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let handle = lookup(&state, id, &user)?;
    let mut workflow = handle.lock().await;
    workflow.set_details(&body.species, &body.location, body.description.as_deref())?;
    Ok(Json(workflow.view()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct LocateRequest {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
}

#[derive(Serialize)]
pub struct LocateResponse {
    pub location: String,
    pub workflow: WorkflowView,
}

async fn locate(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<LocateRequest>,
) -> Result<Json<LocateResponse>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let coordinates = Coordinates::new(body.lat, body.lng)?;

    let handle = lookup(&state, id, &user)?;
    let mut workflow = handle.lock().await;
    let location = workflow.locate(state.geocoder.as_ref(), coordinates).await?;

    Ok(Json(LocateResponse {
        location,
        workflow: workflow.view(),
    }))
}

async fn advance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowView>> {
    let handle = lookup(&state, id, &user)?;
    let mut workflow = handle.lock().await;
    workflow.advance()?;
    Ok(Json(workflow.view()))
}

// ─── Photos ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PhotoRequest {
    /// `data:image/...;base64,...`
    pub data_url: String,
}

async fn attach_photo(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<PhotoRequest>,
) -> Result<Json<WorkflowView>> {
    let handle = lookup(&state, id, &user)?;
    let mut workflow = handle.lock().await;
    workflow.attach_data_url(&body.data_url)?;
    Ok(Json(workflow.view()))
}

async fn discard_photo(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowView>> {
    let handle = lookup(&state, id, &user)?;
    let mut workflow = handle.lock().await;
    workflow.discard_photo()?;
    Ok(Json(workflow.view()))
}

// ─── Camera ──────────────────────────────────────────────────

async fn start_camera(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowView>> {
    let camera = state
        .camera
        .clone()
        .ok_or_else(|| AppError::Device("No camera attached".to_string()))?;

    let handle = lookup(&state, id, &user)?;
    let mut workflow = handle.lock().await;
    workflow.start_capture(camera.as_ref()).await?;
    Ok(Json(workflow.view()))
}

async fn capture_frame(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowView>> {
    let handle = lookup(&state, id, &user)?;
    let mut workflow = handle.lock().await;
    workflow.capture_frame().await?;
    Ok(Json(workflow.view()))
}

async fn stop_camera(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowView>> {
    let handle = lookup(&state, id, &user)?;
    let mut workflow = handle.lock().await;
    workflow.stop_capture();
    Ok(Json(workflow.view()))
}

// ─── Liveness & commit ───────────────────────────────────────

async fn check_liveness(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowView>> {
    let handle = lookup(&state, id, &user)?;
    let mut workflow = handle.lock().await;
    workflow.verify_liveness(state.liveness.as_ref()).await?;
    Ok(Json(workflow.view()))
}

async fn commit(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<CommitReceipt>> {
    let handle = lookup(&state, id, &user)?;
    let mut workflow = handle.lock().await;
    let receipt = workflow
        .commit(state.backend.as_ref(), &state.accrual)
        .await?;
    state.workflows.remove(id);

    tracing::info!(
        workflow_id = %id,
        planting_id = %receipt.planting_id,
        "Planting submitted"
    );
    Ok(Json(receipt))
}
