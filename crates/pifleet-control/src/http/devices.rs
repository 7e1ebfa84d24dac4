//! Registration and device metadata endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use pifleet_core::device::deserialize_vnc_update;
use pifleet_core::{DeviceId, VncAccount, VncUpdate};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::{Admin, ApiError, ApiResult, AppState};
use crate::provisioner::RegistrationRequest;
use crate::storage::{Device, DeviceUpdate};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/register", post(register))
        .route("/api/devices", get(list_devices))
        .route("/api/devices/check", post(check_device))
        .route("/api/devices/batch", post(batch_update))
        .route(
            "/api/devices/{id}",
            get(get_device).patch(update_device).delete(delete_device),
        )
        .route("/api/devices/{id}/touch", post(touch_device))
}

fn parse_id(raw: &str) -> ApiResult<DeviceId> {
    Ok(DeviceId::parse(raw.trim())?)
}

// =========================================================================
// Device-facing (password-gated)
// =========================================================================

#[derive(Deserialize)]
struct RegisterBody {
    device_id: String,
    friendly_name: Option<String>,
    location: Option<String>,
    vnc_account: Option<String>,
    #[serde(default)]
    reassign: bool,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    success: bool,
    tunnel_token: String,
    hostname: String,
    tunnel_id: String,
}

/// `POST /api/register`
#[instrument(skip_all)]
async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterBody>, JsonRejection>,
) -> ApiResult<Json<RegisterResponse>> {
    let Json(body) = payload?;
    state.provisioner.authorize(&body.password)?;

    let device_id = parse_id(&body.device_id)?;
    // Registration has no clear: an empty or sentinel value keeps the stored one.
    let vnc_account = match body.vnc_account.as_deref().map(str::trim) {
        None | Some("" | pifleet_core::device::VNC_CLEAR_SENTINEL) => None,
        Some(raw) => Some(raw.parse::<VncAccount>()?),
    };

    let registration = state
        .provisioner
        .register(RegistrationRequest {
            device_id,
            friendly_name: body.friendly_name,
            location: body.location,
            vnc_account,
            reassign: body.reassign,
        })
        .await?;

    Ok(Json(RegisterResponse {
        success: true,
        tunnel_token: registration.tunnel_token,
        hostname: registration.hostname,
        tunnel_id: registration.tunnel_id,
    }))
}

#[derive(Deserialize)]
struct CheckBody {
    device_id: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
struct CheckResponse {
    exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<Device>,
}

/// `POST /api/devices/check`
async fn check_device(
    State(state): State<AppState>,
    payload: Result<Json<CheckBody>, JsonRejection>,
) -> ApiResult<Json<CheckResponse>> {
    let Json(body) = payload?;
    state.provisioner.authorize(&body.password)?;
    let device_id = parse_id(&body.device_id)?;

    let device = state.db.find_device(device_id.as_str()).await?;
    Ok(Json(CheckResponse {
        exists: device.is_some(),
        device,
    }))
}

#[derive(Deserialize)]
struct TouchBody {
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
struct Ack {
    success: bool,
}

/// `POST /api/devices/{id}/touch` heartbeat.
async fn touch_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<TouchBody>, JsonRejection>,
) -> ApiResult<Json<Ack>> {
    let Json(body) = payload?;
    state.provisioner.authorize(&body.password)?;
    let device_id = parse_id(&id)?;

    if state.db.touch_device(device_id.as_str()).await? {
        Ok(Json(Ack { success: true }))
    } else {
        Err(ApiError::not_found(format!("Device not found: {device_id}")))
    }
}

// =========================================================================
// Dashboard
// =========================================================================

#[derive(Debug, Serialize)]
struct DeviceList {
    devices: Vec<Device>,
}

/// `GET /api/devices`
async fn list_devices(State(state): State<AppState>) -> ApiResult<Json<DeviceList>> {
    let devices = state.db.list_devices().await?;
    Ok(Json(DeviceList { devices }))
}

/// `GET /api/devices/{id}`
async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Device>> {
    let device_id = parse_id(&id)?;
    state
        .db
        .find_device(device_id.as_str())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Device not found: {device_id}")))
}

#[derive(Deserialize)]
struct UpdateBody {
    friendly_name: Option<String>,
    location: Option<String>,
    #[serde(default, deserialize_with = "deserialize_vnc_update")]
    vnc_account: VncUpdate,
}

/// `PATCH /api/devices/{id}`: only the supplied fields change.
#[instrument(skip(state, admin, payload), fields(caller = %admin.0))]
async fn update_device(
    State(state): State<AppState>,
    admin: Admin,
    Path(id): Path<String>,
    payload: Result<Json<UpdateBody>, JsonRejection>,
) -> ApiResult<Json<Device>> {
    let Json(body) = payload?;
    let device_id = parse_id(&id)?;
    let update = DeviceUpdate {
        friendly_name: body.friendly_name,
        location: body.location,
        vnc_account: body.vnc_account,
    };
    if update.is_empty() {
        return Err(ApiError::bad_request("empty_update", "No fields to update"));
    }

    let device = state
        .db
        .update_device_metadata(device_id.as_str(), &update)
        .await?;
    info!(device_id = %device_id, "Device metadata updated");
    Ok(Json(device))
}

#[derive(Deserialize)]
struct BatchBody {
    #[serde(default)]
    device_ids: Vec<String>,
    location: Option<String>,
    #[serde(default, deserialize_with = "deserialize_vnc_update")]
    vnc_account: VncUpdate,
}

#[derive(Debug, Serialize)]
struct BatchItem {
    device_id: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    results: Vec<BatchItem>,
    devices: Vec<Device>,
}

/// `POST /api/devices/batch`: one update applied to each id independently.
#[instrument(skip(state, admin, payload), fields(caller = %admin.0))]
async fn batch_update(
    State(state): State<AppState>,
    admin: Admin,
    payload: Result<Json<BatchBody>, JsonRejection>,
) -> ApiResult<Json<BatchResponse>> {
    let Json(body) = payload?;
    if body.device_ids.is_empty() {
        return Err(ApiError::bad_request("empty_update", "No device ids given"));
    }
    let update = DeviceUpdate {
        friendly_name: None,
        location: body.location,
        vnc_account: body.vnc_account,
    };
    if update.is_empty() {
        return Err(ApiError::bad_request("empty_update", "No fields to update"));
    }

    let mut results = Vec::with_capacity(body.device_ids.len());
    let mut devices = Vec::new();
    for raw in body.device_ids {
        let outcome = match DeviceId::parse(raw.trim()) {
            Ok(id) => state
                .db
                .update_device_metadata(id.as_str(), &update)
                .await
                .map_err(|e| {
                    if e.is_not_found() {
                        format!("Device not found: {id}")
                    } else {
                        warn!(device_id = %id, error = %e, "Batch update failed");
                        e.to_string()
                    }
                }),
            Err(e) => Err(e.to_string()),
        };
        match outcome {
            Ok(device) => {
                results.push(BatchItem {
                    device_id: raw,
                    success: true,
                    error: None,
                });
                devices.push(device);
            }
            Err(error) => results.push(BatchItem {
                device_id: raw,
                success: false,
                error: Some(error),
            }),
        }
    }

    Ok(Json(BatchResponse { results, devices }))
}

/// `DELETE /api/devices/{id}`: tears down DNS and tunnel, then the row.
#[instrument(skip(state, admin), fields(caller = %admin.0))]
async fn delete_device(
    State(state): State<AppState>,
    admin: Admin,
    Path(id): Path<String>,
) -> ApiResult<Json<Ack>> {
    let device_id = parse_id(&id)?;
    state.provisioner.deprovision(&device_id).await?;
    Ok(Json(Ack { success: true }))
}
