//! ==============================================================================
//! server.rs - json api for rendering clients
//! ==============================================================================
//!
//! routes:
//!     GET  /api                          full view (cards, switches, notice)
//!     GET  /api/sensors/:key             one card with its rolling series
//!     POST /api/control/:key?value=bool  optimistic toggle
//!
//! reads come straight from the rendered view; toggles go through the
//! session so they are serialized with inbound events.
//!
//! ==============================================================================

use crate::domain::{ActuatorKey, SensorKey};
use crate::session::{MonitorView, SensorCard, SessionHandle};

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

pub fn router(session: SessionHandle) -> Router {
    Router::new()
        .route("/api", get(view_handler))
        .route("/api/sensors/:key", get(sensor_handler))
        .route("/api/control/:key", post(control_handler))
        .layer(CorsLayer::permissive())
        .with_state(session)
}

pub async fn run_server(session: SessionHandle, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("api listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(session)).await?;
    Ok(())
}

async fn view_handler(State(session): State<SessionHandle>) -> Json<MonitorView> {
    Json(session.snapshot().await)
}

async fn sensor_handler(
    State(session): State<SessionHandle>,
    Path(key): Path<String>,
) -> Result<Json<SensorCard>, (StatusCode, Json<serde_json::Value>)> {
    let key: SensorKey = key.parse().map_err(not_found)?;
    session
        .snapshot()
        .await
        .card(key)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found(format!("no card for {}", key)))
}

/// toggle params
#[derive(Deserialize)]
struct ControlParams {
    value: bool,
}

/// POST /api/control/heat_lamp?value=true
async fn control_handler(
    State(session): State<SessionHandle>,
    Path(key): Path<String>,
    Query(params): Query<ControlParams>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let key: ActuatorKey = key.parse().map_err(not_found)?;

    match session.toggle(key, params.value).await {
        Ok(state) => Ok(Json(serde_json::json!({
            "status": "ok",
            "actuator": key,
            "state": state,
        }))),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "error", "message": e.to_string()})),
        )),
    }
}

fn not_found(e: impl std::fmt::Display) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"status": "error", "message": e.to_string()})),
    )
}
