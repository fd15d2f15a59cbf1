use armory_core::{types::StatisticsRequest, DomainError};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use metrics::counter;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{json_response, ApiError};
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct StatisticsQuery {
    #[serde(default)]
    character: String,
}

fn record<T>(op: &'static str, outcome: &Result<T, DomainError>) {
    let result = match outcome {
        Ok(_) => "ok",
        Err(err) => err.kind(),
    };
    counter!("statistics_requests_total", "op" => op, "result" => result).increment(1);
    if let Err(err) = outcome {
        warn!(
            stage = "statistics",
            op,
            kind = err.kind(),
            error = %err,
            "statistics request failed"
        );
    }
}

pub async fn get(
    State(state): State<AppState>,
    Query(query): Query<StatisticsQuery>,
) -> Result<Response, ApiError> {
    let outcome = state.statistics().get_character(&query.character).await;
    record("get", &outcome);
    Ok(json_response(StatusCode::OK, &outcome?))
}

pub async fn post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    state.auth().authorize(&headers)?;

    // A `null` body is an empty batch.
    let decoded = serde_json::from_slice::<Option<Vec<StatisticsRequest>>>(&body);
    let outcome = match decoded.map(Option::unwrap_or_default) {
        Ok(requests) => {
            let count = requests.len();
            let outcome = state.statistics().parse(requests).await;
            if outcome.is_ok() {
                info!(stage = "statistics", count, "statistics accepted");
            }
            outcome
        }
        Err(err) => Err(DomainError::request(format!("malformed statistics payload: {err}"))),
    };
    record("post", &outcome);
    outcome?;

    Ok(json_response(
        StatusCode::ACCEPTED,
        &json!({ "status": "accepted" }),
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    state.auth().authorize(&headers)?;

    let outcome = state.statistics().delete_stats(&name).await;
    record("delete", &outcome);
    outcome?;

    info!(stage = "statistics", character = %name, "statistics deleted");
    Ok(json_response(StatusCode::OK, &json!({ "status": "ok" })))
}
