//! GC control surface.
//!
//! Each endpoint drives exactly one phase of the pipeline (mark, process,
//! sweep, populate) so an external scheduler can sequence and retry phases
//! independently. All operations are idempotent.

use axum::Json;
use axum::extract::{Path, State};
use chrono::Duration;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::gc::{MarkService, PopulateService, ProcessService, SweepService};
use crate::models::gc::{
    MarkDevicesResponse, MarkTrailsResponse, PopulateStepsResponse, PopulateTrailsResponse,
    ProcessDevicesResponse, ProcessStepsResponse, ProcessTrailsResponse, SweepResponse,
};
use crate::state::AppState;

fn gc_durations(state: &AppState) -> Result<(Duration, Duration), AppError> {
    let grace = state
        .config
        .gc
        .grace_period()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let expiry = state
        .config
        .gc
        .unclaimed_expiry()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok((grace, expiry))
}

#[utoipa::path(
    put,
    path = "/markgarbage/device/{id}",
    tag = "Garbage Collection",
    operation_id = "markDevice",
    summary = "Mark one device garbage",
    description = "Flags the device garbage with a grace-period removal time and \
        cascades the mark to its trail, re-resolving the trail's factory state \
        references along the way.",
    params(("id" = String, Path, description = "Device id")),
    responses(
        (status = 200, description = "Device marked", body = MarkDevicesResponse),
        (status = 404, description = "No such device", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn mark_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MarkDevicesResponse>, AppError> {
    let (grace, expiry) = gc_durations(&state)?;
    let service = MarkService::new(&state.db, grace, expiry);

    let report = service
        .mark_device(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No device '{id}'")))?;

    Ok(Json(report.into()))
}

#[utoipa::path(
    put,
    path = "/markgarbage/devices/unclaimed",
    tag = "Garbage Collection",
    operation_id = "markUnclaimedDevices",
    summary = "Mark devices whose claim challenge expired",
    description = "Scans for devices that still carry an unresolved ownership-claim \
        challenge and were created longer ago than `gc.unclaimed_expiry`, and marks \
        each of them garbage with the usual trail cascade.",
    responses((status = 200, description = "Scan complete", body = MarkDevicesResponse)),
)]
#[instrument(skip(state))]
pub async fn mark_unclaimed_devices(
    State(state): State<AppState>,
) -> Result<Json<MarkDevicesResponse>, AppError> {
    let (grace, expiry) = gc_durations(&state)?;
    let service = MarkService::new(&state.db, grace, expiry);

    let report = service.mark_unclaimed_devices().await?;
    Ok(Json(report.into()))
}

#[utoipa::path(
    put,
    path = "/markgarbage/trails",
    tag = "Garbage Collection",
    operation_id = "markOrphanTrails",
    summary = "Mark trails whose device no longer exists",
    responses((status = 200, description = "Scan complete", body = MarkTrailsResponse)),
)]
#[instrument(skip(state))]
pub async fn mark_orphan_trails(
    State(state): State<AppState>,
) -> Result<Json<MarkTrailsResponse>, AppError> {
    let (grace, expiry) = gc_durations(&state)?;
    let service = MarkService::new(&state.db, grace, expiry);

    let report = service.mark_orphan_trails().await?;
    Ok(Json(report.into()))
}

#[utoipa::path(
    put,
    path = "/processgarbages/devices",
    tag = "Garbage Collection",
    operation_id = "processDevices",
    summary = "Cascade marked devices to their trails",
    responses((status = 200, description = "Pass complete", body = ProcessDevicesResponse)),
)]
#[instrument(skip(state))]
pub async fn process_devices(
    State(state): State<AppState>,
) -> Result<Json<ProcessDevicesResponse>, AppError> {
    let (grace, _) = gc_durations(&state)?;
    let service = ProcessService::new(&state.db, grace);

    let report = service.process_devices().await?;
    Ok(Json(report.into()))
}

#[utoipa::path(
    put,
    path = "/processgarbages/trails",
    tag = "Garbage Collection",
    operation_id = "processTrails",
    summary = "Cascade marked trails to steps and objects",
    description = "For each marked-but-unprocessed trail: recomputes its factory \
        state references, re-marks all child steps, and flags referenced objects \
        garbage when no live trail or step still uses them.",
    responses((status = 200, description = "Pass complete", body = ProcessTrailsResponse)),
)]
#[instrument(skip(state))]
pub async fn process_trails(
    State(state): State<AppState>,
) -> Result<Json<ProcessTrailsResponse>, AppError> {
    let (grace, _) = gc_durations(&state)?;
    let service = ProcessService::new(&state.db, grace);

    let report = service.process_trails().await?;
    Ok(Json(report.into()))
}

#[utoipa::path(
    put,
    path = "/processgarbages/steps",
    tag = "Garbage Collection",
    operation_id = "processSteps",
    summary = "Cascade marked steps to objects",
    responses((status = 200, description = "Pass complete", body = ProcessStepsResponse)),
)]
#[instrument(skip(state))]
pub async fn process_steps(
    State(state): State<AppState>,
) -> Result<Json<ProcessStepsResponse>, AppError> {
    let (grace, _) = gc_durations(&state)?;
    let service = ProcessService::new(&state.db, grace);

    let report = service.process_steps().await?;
    Ok(Json(report.into()))
}

#[utoipa::path(
    delete,
    path = "/devices",
    tag = "Garbage Collection",
    operation_id = "sweepGarbage",
    summary = "Physically remove processed garbage past its grace period",
    description = "Deletes due trails, steps, objects (backing bytes first, then \
        the row) and devices. Gated by `gc.remove_garbage`; when disabled the call \
        reports a warning and removes nothing.",
    responses((status = 200, description = "Sweep complete", body = SweepResponse)),
)]
#[instrument(skip(state))]
pub async fn sweep(State(state): State<AppState>) -> Result<Json<SweepResponse>, AppError> {
    let service = SweepService::new(&state.db, &*state.backend, state.config.gc.remove_garbage);

    let (totals, report) = service.sweep().await?;
    Ok(Json(SweepResponse::new(totals, report)))
}

#[utoipa::path(
    put,
    path = "/populate/usedobjects/trails",
    tag = "Garbage Collection",
    operation_id = "populateTrailUsedObjects",
    summary = "Recompute used_objects for every trail",
    responses((status = 200, description = "Populate complete", body = PopulateTrailsResponse)),
)]
#[instrument(skip(state))]
pub async fn populate_trails(
    State(state): State<AppState>,
) -> Result<Json<PopulateTrailsResponse>, AppError> {
    let service = PopulateService::new(&state.db);

    let report = service.populate_trails().await?;
    Ok(Json(report.into()))
}

#[utoipa::path(
    put,
    path = "/populate/usedobjects/steps",
    tag = "Garbage Collection",
    operation_id = "populateStepUsedObjects",
    summary = "Recompute used_objects for every step",
    responses((status = 200, description = "Populate complete", body = PopulateStepsResponse)),
)]
#[instrument(skip(state))]
pub async fn populate_steps(
    State(state): State<AppState>,
) -> Result<Json<PopulateStepsResponse>, AppError> {
    let service = PopulateService::new(&state.db);

    let report = service.populate_steps().await?;
    Ok(Json(report.into()))
}
