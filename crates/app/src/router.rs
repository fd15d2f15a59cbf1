use std::sync::Arc;

use armory_core::{CharacterService, StatisticsService};
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::BasicAuth;
use crate::error::json_response;
use crate::{characters, statistics, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    characters: Arc<CharacterService>,
    statistics: Arc<StatisticsService>,
    auth: BasicAuth,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        characters: CharacterService,
        statistics: StatisticsService,
        auth: BasicAuth,
    ) -> Self {
        Self {
            metrics,
            characters: Arc::new(characters),
            statistics: Arc::new(statistics),
            auth,
        }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn characters(&self) -> &CharacterService {
        &self.characters
    }

    pub fn statistics(&self) -> &StatisticsService {
        &self.statistics
    }

    pub fn auth(&self) -> &BasicAuth {
        &self.auth
    }
}

pub fn app_router(state: AppState, cors_enabled: bool) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/v1/characters", get(characters::get))
        .route("/retrieving/v1/character", get(characters::get_deprecated))
        .route(
            "/api/v1/statistics",
            get(statistics::get).post(statistics::post),
        )
        .route("/api/v1/statistics/:name", delete(statistics::delete))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors_enabled {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

async fn health() -> Response {
    json_response(StatusCode::OK, &json!({ "status": "OK" }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
}
