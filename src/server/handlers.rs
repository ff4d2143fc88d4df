use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::location::LocationView;

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

#[derive(Debug)]
pub(super) struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

// ─── GET /api/health ─────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ─── GET /api/location ───────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct LocationQuery {
    /// Block until the first resolution outcome exists.
    #[serde(default)]
    pub wait: bool,
}

pub async fn current_location(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LocationQuery>,
) -> Json<LocationView> {
    if params.wait {
        state.resolver.wait_until_loaded().await;
    }
    Json(state.resolver.view())
}

// ─── PUT /api/location ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct ManualLocation {
    pub city: String,
    pub region: String,
}

pub async fn set_location(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ManualLocation>,
) -> Result<Json<LocationView>, ApiError> {
    let location = state
        .resolver
        .set_manual_location(&body.city, &body.region)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    info!(city = %location.city, region = %location.region, "PUT /api/location");
    Ok(Json(state.resolver.view()))
}

// ─── DELETE /api/location ────────────────────────────────────────

pub async fn clear_location(State(state): State<Arc<AppState>>) -> StatusCode {
    state.resolver.clear_location();
    info!("DELETE /api/location");
    StatusCode::NO_CONTENT
}

// ─── POST /api/location/redetect ─────────────────────────────────

pub async fn redetect(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LocationQuery>,
) -> (StatusCode, Json<LocationView>) {
    let start = Instant::now();
    state.resolver.redetect();

    if !params.wait {
        return (StatusCode::ACCEPTED, Json(state.resolver.view()));
    }

    state.resolver.wait_until_loaded().await;
    let view = state.resolver.view();
    info!(
        source = %view.source,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "POST /api/location/redetect"
    );
    (StatusCode::OK, Json(view))
}
