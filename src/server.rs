//! HTTP surface: upload page, scoring endpoints and service status

use crate::error::ScoreError;
use crate::export::{EXPORT_CONTENT_TYPE, EXPORT_FILE_NAME};
use crate::metrics::ScoringMetrics;
use crate::render;
use crate::scoring::{ScoreReport, Scorer};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Multipart field carrying the uploaded CSV
const UPLOAD_FIELD: &str = "file";

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    scorer: Arc<Scorer>,
    metrics: Arc<ScoringMetrics>,
}

impl AppState {
    pub fn new(scorer: Arc<Scorer>, metrics: Arc<ScoringMetrics>) -> Self {
        Self { scorer, metrics }
    }
}

/// Build the application router
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/score", post(score_page))
        .route("/predictions.csv", post(download_predictions))
        .route("/api/score", post(score_json))
        .route("/health", get(health))
        .route("/api/stats", get(stats))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// An uploaded file
struct Upload {
    file_name: Option<String>,
    bytes: Vec<u8>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ScoreError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ScoreError::Parse(e.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ScoreError::Parse(e.body_text()))?;
        return Ok(Upload {
            file_name,
            bytes: bytes.to_vec(),
        });
    }
    Err(ScoreError::Parse("no file was uploaded".to_string()))
}

/// Read the upload and score it on the blocking pool, recording metrics
async fn score_upload(
    state: &AppState,
    multipart: Multipart,
) -> Result<(Option<String>, ScoreReport), ScoreError> {
    let start = Instant::now();
    let result = async {
        let Upload { file_name, bytes } = read_upload(multipart).await?;
        let scorer = state.scorer.clone();
        let report = tokio::task::spawn_blocking(move || scorer.score(&bytes))
            .await
            .map_err(|e| {
                error!(error = %e, "Scoring task failed");
                ScoreError::Inference(format!("scoring task failed: {}", e))
            })??;
        Ok::<_, ScoreError>((file_name, report))
    }
    .await;

    match &result {
        Ok((file_name, report)) => {
            let elapsed = start.elapsed();
            state.metrics.record_upload(
                elapsed,
                report.table.rows.iter().map(|r| r.stockout_risk),
            );
            info!(
                file = file_name.as_deref().unwrap_or("-"),
                rows = report.rows(),
                processing_time_us = elapsed.as_micros() as u64,
                "Upload scored"
            );
        }
        Err(e) => {
            state.metrics.record_rejection(e.kind());
            warn!(kind = e.kind(), error = %e, "Upload rejected");
        }
    }
    result
}

fn error_status(err: &ScoreError) -> StatusCode {
    match err {
        ScoreError::Parse(_) => StatusCode::BAD_REQUEST,
        ScoreError::Schema(_) | ScoreError::TypeCoercion { .. } | ScoreError::Inference(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ScoreError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn index() -> Html<String> {
    Html(render::index_page())
}

async fn score_page(State(state): State<AppState>, multipart: Multipart) -> Response {
    match score_upload(&state, multipart).await {
        Ok((file_name, report)) => {
            Html(render::results_page(&report, file_name.as_deref())).into_response()
        }
        Err(e) => (error_status(&e), Html(render::error_page(&e))).into_response(),
    }
}

async fn download_predictions(State(state): State<AppState>, multipart: Multipart) -> Response {
    match score_upload(&state, multipart).await {
        Ok((_, report)) => (
            [
                (header::CONTENT_TYPE, EXPORT_CONTENT_TYPE.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME),
                ),
            ],
            report.csv,
        )
            .into_response(),
        Err(e) => (error_status(&e), e.to_string()).into_response(),
    }
}

async fn score_json(State(state): State<AppState>, multipart: Multipart) -> Response {
    match score_upload(&state, multipart).await {
        Ok((_, report)) => Json(report.summary()).into_response(),
        Err(e) => (
            error_status(&e),
            Json(json!({"error": {"kind": e.kind(), "message": e.to_string()}})),
        )
            .into_response(),
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "pipeline": state.scorer.pipeline_name(),
    }))
}

async fn stats(State(state): State<AppState>) -> Response {
    Json(state.metrics.snapshot()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaViolation;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_status(&ScoreError::Parse("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&ScoreError::Schema(SchemaViolation::MissingColumns(vec![
                "price".to_string()
            ]))),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            error_status(&ScoreError::Inference("x".to_string())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
