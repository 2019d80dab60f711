// src/api.rs
//! Thin HTTP adapter over `Aggregator`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::error::StoreError;
use crate::model::{Item, RunLog, Source, Summary};
use crate::scheduler::TriggerResult;
use crate::service::{Aggregator, Health, RunStatus, TopicView};

const DEFAULT_ITEMS: usize = 50;
const DEFAULT_RUNS: usize = 50;

pub fn router(aggregator: Aggregator) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/topics", get(list_topics))
        .route("/topics/{name}/summary", get(topic_summary))
        .route("/topics/{name}/items", get(topic_items))
        .route("/sources", get(list_sources))
        .route("/runs", get(runs))
        .route("/status", get(run_status))
        .route("/refresh", post(refresh_all))
        .route("/refresh/{name}", post(refresh_topic))
        .layer(CorsLayer::very_permissive())
        .with_state(aggregator)
}

pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            StoreError::UnknownTopic(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct RunsQuery {
    topic: Option<String>,
    limit: Option<usize>,
}

async fn health(State(agg): State<Aggregator>) -> ApiResult<Health> {
    Ok(Json(agg.health_status()?))
}

async fn list_topics(State(agg): State<Aggregator>) -> ApiResult<Vec<TopicView>> {
    Ok(Json(agg.list_topics()?))
}

async fn topic_summary(
    State(agg): State<Aggregator>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    Ok(match agg.current_summary(&name)? {
        Some(summary) => Json::<Summary>(summary).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("no summary yet for '{name}'") })),
        )
            .into_response(),
    })
}

async fn topic_items(
    State(agg): State<Aggregator>,
    Path(name): Path<String>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<Vec<Item>> {
    Ok(Json(agg.raw_items(&name, q.limit.unwrap_or(DEFAULT_ITEMS))?))
}

async fn list_sources(State(agg): State<Aggregator>) -> ApiResult<Vec<Source>> {
    let sources = agg.list_sources()?;
    Ok(Json(sources.into_iter().map(Source::redacted).collect()))
}

async fn runs(State(agg): State<Aggregator>, Query(q): Query<RunsQuery>) -> ApiResult<Vec<RunLog>> {
    Ok(Json(agg.run_logs(
        q.topic.as_deref(),
        q.limit.unwrap_or(DEFAULT_RUNS),
    )?))
}

async fn run_status(
    State(agg): State<Aggregator>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<RunStatus> {
    Ok(Json(agg.run_status(q.limit.unwrap_or(DEFAULT_RUNS))?))
}

#[derive(Serialize)]
struct TriggerOut {
    topic: String,
    result: TriggerResult,
}

fn trigger_status(result: TriggerResult) -> StatusCode {
    match result {
        TriggerResult::Started => StatusCode::ACCEPTED,
        TriggerResult::AlreadyRunning | TriggerResult::Disabled => StatusCode::CONFLICT,
        TriggerResult::UnknownTopic => StatusCode::NOT_FOUND,
    }
}

async fn refresh_topic(
    State(agg): State<Aggregator>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let result = agg.trigger_refresh(&name)?;
    let out = TriggerOut {
        topic: name,
        result,
    };
    Ok((trigger_status(result), Json(out)).into_response())
}

async fn refresh_all(State(agg): State<Aggregator>) -> ApiResult<Vec<TriggerOut>> {
    let out = agg
        .trigger_all()?
        .into_iter()
        .map(|(topic, result)| TriggerOut { topic, result })
        .collect();
    Ok(Json(out))
}
