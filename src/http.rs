use crate::config::TemperatureUnit;
use crate::render::summary_lines;
use crate::store::SnapshotStore;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};

const NOT_READY: &str = "no collection cycle has completed yet";

#[derive(Clone)]
pub struct HttpAppState {
    pub store: SnapshotStore,
    pub temperature_unit: TemperatureUnit,
}

pub fn build_router(store: SnapshotStore, temperature_unit: TemperatureUnit) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/snapshot", get(snapshot_handler))
        .route("/api/summary", get(summary_handler))
        .with_state(HttpAppState {
            store,
            temperature_unit,
        })
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn snapshot_handler(State(state): State<HttpAppState>) -> Response {
    match state.store.current() {
        Some(snapshot) => Json(snapshot.as_ref().clone()).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, NOT_READY).into_response(),
    }
}

async fn summary_handler(State(state): State<HttpAppState>) -> Response {
    match state.store.current() {
        Some(snapshot) => {
            let mut text = summary_lines(&snapshot, state.temperature_unit).join("\n");
            text.push('\n');
            (StatusCode::OK, text).into_response()
        }
        None => (StatusCode::SERVICE_UNAVAILABLE, NOT_READY).into_response(),
    }
}
