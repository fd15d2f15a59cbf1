use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};
use metrics::counter;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{json_response, ApiError};
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct CharacterQuery {
    #[serde(default)]
    name: String,
}

pub async fn get(
    State(state): State<AppState>,
    Query(query): Query<CharacterQuery>,
) -> Result<Response, ApiError> {
    match state.characters().parse(&query.name).await {
        Ok(lookup) => {
            counter!("character_requests_total", "source" => lookup.source.as_str()).increment(1);
            debug!(
                stage = "character",
                name = %query.name,
                source = lookup.source.as_str(),
                "character served"
            );
            Ok(json_response(StatusCode::OK, &lookup.character))
        }
        Err(err) => {
            counter!("character_requests_total", "source" => "error").increment(1);
            warn!(
                stage = "character",
                name = %query.name,
                kind = err.kind(),
                error = %err,
                "character lookup failed"
            );
            Err(err.into())
        }
    }
}

/// Older clients still call `/retrieving/v1/character`.
pub async fn get_deprecated(
    state: State<AppState>,
    query: Query<CharacterQuery>,
) -> Result<Response, ApiError> {
    debug!(stage = "http", "deprecated character route used");
    get(state, query).await
}
