//! HTTP surface: shared state, router and request handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::analysis::{AnalysisClient, AnalysisModel};
use crate::cache::AnalysisCache;
use crate::config::Config;
use crate::db::{is_missing_table, Database};
use crate::deepl::{self, DeepLClient};
use crate::error::ApiError;
use crate::feedback::{FeedbackSubmission, FeedbackSummary};
use crate::metrics::ServiceMetrics;
use crate::security;
use crate::segmentation;

const DEMO_UNAVAILABLE: &str = "This feature is not available in demo usage.";

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub translator: DeepLClient,
    pub analyzer: AnalysisClient,
    pub cache: Arc<AnalysisCache>,
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    pub fn new(config: Config, db: Database) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            translator: DeepLClient::new(http.clone(), &config),
            analyzer: AnalysisClient::new(http, &config),
            cache: Arc::new(AnalysisCache::new(config.analysis_cache_capacity)),
            metrics: Arc::new(ServiceMetrics::new()),
            config: Arc::new(config),
            db,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/metrics", get(metrics))
        .route("/api/segment", post(segment))
        .route("/api/translate", post(translate))
        .route("/api/analyze", post(analyze))
        .route("/api/feedback", post(submit_feedback))
        .route("/api/feedback/get", get(list_feedback))
        .route("/api/feedback/all", get(all_feedback))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr().context("Failed to read listener address")?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// ==================== Request bodies ====================

// String fields arrive as raw JSON so a non-string value gets the same
// message as a missing one.

#[derive(Debug, Deserialize)]
struct SegmentRequest {
    text: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateRequest {
    text: Option<Value>,
    target_lang: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    sentence: Option<Value>,
    model: Option<String>,
}

fn required_string(value: Option<Value>, message: &str) -> Result<String, ApiError> {
    match value {
        Some(Value::String(s)) => Ok(s),
        _ => Err(ApiError::BadRequest(message.to_string())),
    }
}

/// Like [`required_string`], but `""` also counts as missing. Whitespace-only
/// strings pass and are rejected by the caller with a separate message.
fn non_empty_string(value: Option<Value>, message: &str) -> Result<String, ApiError> {
    required_string(value, message).and_then(|s| {
        if s.is_empty() {
            Err(ApiError::BadRequest(message.to_string()))
        } else {
            Ok(s)
        }
    })
}

// ==================== Handlers ====================

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics(State(state): State<AppState>) -> Response {
    Json(state.metrics.report()).into_response()
}

async fn segment(
    State(state): State<AppState>,
    payload: Result<Json<SegmentRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    let text = required_string(req.text, "Text is required and must be a string")?;

    let sentences = segmentation::segment(&text);
    state.metrics.record_segmented(sentences.len());

    Ok(Json(json!({ "count": sentences.len(), "sentences": sentences })).into_response())
}

async fn translate(
    State(state): State<AppState>,
    payload: Result<Json<TranslateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    let text = non_empty_string(req.text, "Text is required and must be a string")?;
    if text.trim().is_empty() {
        return Err(ApiError::BadRequest("Text cannot be empty".into()));
    }

    let target_lang =
        deepl::resolve_target_language(req.target_lang.as_deref()).ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Unsupported target language: {}",
                req.target_lang.as_deref().unwrap_or_default()
            ))
        })?;

    state.metrics.translation.record_call();
    let translation = match state.translator.translate(&text, target_lang).await {
        Ok(translation) => translation,
        Err(e) => {
            state.metrics.translation.record_failure();
            return Err(e.into());
        }
    };

    Ok(Json(json!({ "translation": translation })).into_response())
}

async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    let sentence = non_empty_string(req.sentence, "Sentence is required and must be a string")?;
    let sentence = sentence.trim();
    if sentence.is_empty() {
        return Err(ApiError::BadRequest("Sentence cannot be empty".into()));
    }

    let model = match req.model.as_deref() {
        None | Some("") => AnalysisModel::default(),
        Some(name) => name
            .parse::<AnalysisModel>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
    };
    if !model.is_available() {
        return Err(ApiError::Forbidden(DEMO_UNAVAILABLE.into()));
    }

    if let Some(cached) = state.cache.get(model, sentence) {
        state.metrics.record_cache_hit();
        return Ok(Json(cached).into_response());
    }
    state.metrics.record_cache_miss();

    state.metrics.analysis.record_call();
    let analysis = match state.analyzer.analyze(sentence).await {
        Ok(analysis) => analysis,
        Err(e) => {
            state.metrics.analysis.record_failure();
            return Err(e.into());
        }
    };

    state.cache.insert(model, sentence, analysis.clone());
    Ok(Json(analysis).into_response())
}

async fn submit_feedback(
    State(state): State<AppState>,
    payload: Result<Json<FeedbackSubmission>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(submission) = payload?;
    let feedback = submission.validate()?;

    let saved = state.db.save_feedback(&feedback).await.map_err(|e| {
        ApiError::Internal(anyhow::anyhow!("Failed to process feedback: {:#}", e))
    })?;
    state.metrics.record_feedback_saved();

    info!(
        id = saved.id,
        is_anonymous = saved.is_anonymous,
        created_at = ?saved.created_at,
        "Feedback saved"
    );

    Ok(Json(json!({
        "success": true,
        "message": "Feedback received and saved successfully",
        "id": saved.id,
    }))
    .into_response())
}

async fn list_feedback(State(state): State<AppState>) -> Result<Response, ApiError> {
    match state.db.list_feedback().await {
        Ok(entries) => Ok(Json(FeedbackSummary::from_entries(&entries)).into_response()),
        Err(e) if is_missing_table(&e) => {
            warn!("Feedback table does not exist yet");
            Ok(Json(FeedbackSummary::empty()).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

async fn all_feedback(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if state.config.api_key.is_none() {
        return Err(ApiError::NotFound("Not found".into()));
    }
    if !security::is_authorized(state.config.api_key.as_deref(), &headers) {
        warn!("Rejected feedback export with missing or invalid API key");
        return Err(ApiError::Unauthorized("Unauthorized".into()));
    }

    let entries = state.db.list_feedback().await.map_err(|e| {
        error!("Feedback export failed: {:#}", e);
        ApiError::from(e)
    })?;

    Ok(Json(json!({
        "success": true,
        "count": entries.len(),
        "feedback": entries,
    }))
    .into_response())
}
