//! Per-identity dashboard preferences.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;

use super::{ApiError, ApiResult, AppState, Caller};
use crate::storage::UserPreferences;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/preferences",
        get(get_preferences).put(put_preferences),
    )
}

#[derive(Debug, Serialize)]
struct PreferencesResponse {
    email: String,
    preferences: Value,
    updated_at: Option<i64>,
}

impl From<UserPreferences> for PreferencesResponse {
    fn from(p: UserPreferences) -> Self {
        Self {
            preferences: serde_json::from_str(&p.preferences)
                .unwrap_or_else(|_| Value::Object(serde_json::Map::new())),
            email: p.email,
            updated_at: Some(p.updated_at),
        }
    }
}

/// `GET /api/preferences`
async fn get_preferences(
    State(state): State<AppState>,
    Caller(email): Caller,
) -> ApiResult<Json<PreferencesResponse>> {
    let stored = state.db.get_preferences(&email).await?;
    Ok(Json(stored.map_or_else(
        || PreferencesResponse {
            email,
            preferences: Value::Object(serde_json::Map::new()),
            updated_at: None,
        },
        PreferencesResponse::from,
    )))
}

/// `PUT /api/preferences` with a JSON object body.
async fn put_preferences(
    State(state): State<AppState>,
    Caller(email): Caller,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<PreferencesResponse>> {
    let Json(value) = payload?;
    if !value.is_object() {
        return Err(ApiError::bad_request(
            "invalid_payload",
            "preferences must be a JSON object",
        ));
    }
    let stored = state.db.put_preferences(&email, &value.to_string()).await?;
    Ok(Json(stored.into()))
}
