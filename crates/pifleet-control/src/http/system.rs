use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use super::{AppState, Caller};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/me", get(me))
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct Me {
    email: String,
    is_admin: bool,
}

/// `GET /api/me`
async fn me(State(state): State<AppState>, Caller(email): Caller) -> Json<Me> {
    let is_admin = state.admins.is_admin(&email);
    Json(Me { email, is_admin })
}
