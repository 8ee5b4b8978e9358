#![forbid(unsafe_code)]

//! HTTP surface: liveness, image analysis with best-effort auto reward, and
//! the manual claim endpoint.
//!
//! `/analyze` never fails because of the ledger: a reward attempt that errors
//! is reported as `rewarded: false` in an otherwise successful response.
//! `/claim-reward` is the opposite; its whole point is the transaction, so
//! ledger failures surface as HTTP errors.

use crate::emotion::{decode_image_payload, ClassifierError, EmotionClassifier, EmotionScore};
use crate::metrics;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use reward_core::{IssueError, IssueOutcome, RewardEngine, RewardRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RewardEngine>,
    pub classifier: Arc<dyn EmotionClassifier>,
    pub node_label: String,
    pub metrics_enabled: bool,
}

/// Error payload shared by all endpoints.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub code: StatusCode,
    pub status: &'static str,
    pub message: String,
}

impl ApiError {
    fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            status: "error",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code;
        (code, Json(self)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    /// Base64 image bytes, bare or as a `data:` URL. Optional at the serde
    /// level so a missing field maps to 400 rather than a body-rejection 422.
    #[serde(default)]
    pub image: Option<String>,
    /// Reward recipient; omitted means score-only analysis.
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AnalyzeResponse {
    pub emotion: String,
    pub score: u32,
    pub rewarded: bool,
    #[serde(rename = "txHash")]
    pub tx_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    #[serde(default)]
    pub address: Option<String>,
    /// Raw JSON so a negative or fractional value reaches the handler and
    /// maps to 400 instead of a body-rejection 422.
    #[serde(default)]
    pub score: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ClaimResponse {
    pub status: &'static str,
    #[serde(rename = "txHash", skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": state.node_label,
    }))
}

pub async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let image = decode_image_payload(req.image.as_deref().unwrap_or("")).map_err(|e| {
        metrics::ANALYZE_REQUESTS_TOTAL
            .with_label_values(&["bad_request"])
            .inc();
        ApiError::new(StatusCode::BAD_REQUEST, e)
    })?;

    let scored = match state.classifier.classify(&image).await {
        Ok(s) => s,
        // No detectable face scores as neutral/0; the reward path then
        // naturally skips itself.
        Err(ClassifierError::NoFace) => EmotionScore {
            emotion: "neutral".to_string(),
            score: 0,
        },
        Err(e) => {
            metrics::ANALYZE_REQUESTS_TOTAL
                .with_label_values(&["classifier_error"])
                .inc();
            warn!(error = %e, "emotion classification failed");
            return Err(ApiError::new(StatusCode::BAD_GATEWAY, e.to_string()));
        }
    };

    let mut rewarded = false;
    let mut tx_hash = None;
    if let Some(address) = req.address.as_deref().filter(|a| !a.trim().is_empty()) {
        let request = RewardRequest {
            subject_account: address.to_string(),
            observed_score: scored.score,
            cumulative_score: None,
        };
        // Best effort: the analysis result stands even when the reward fails.
        match state.engine.issue_reward(&request).await {
            Ok(IssueOutcome::Rewarded { tx_id }) => {
                metrics::REWARD_SUBMISSIONS_TOTAL
                    .with_label_values(&["rewarded"])
                    .inc();
                rewarded = true;
                tx_hash = Some(tx_id.0);
            }
            Ok(IssueOutcome::Ineligible { reason }) => {
                metrics::REWARD_SUBMISSIONS_TOTAL
                    .with_label_values(&["ineligible"])
                    .inc();
                info!(reason, "auto reward skipped");
            }
            Err(e) => {
                metrics::REWARD_SUBMISSIONS_TOTAL
                    .with_label_values(&[issue_error_label(&e)])
                    .inc();
                warn!(error = %e, "auto reward failed");
            }
        }
    }

    metrics::ANALYZE_REQUESTS_TOTAL
        .with_label_values(&["ok"])
        .inc();
    Ok(Json(AnalyzeResponse {
        emotion: scored.emotion,
        score: scored.score,
        rewarded,
        tx_hash,
    }))
}

pub async fn claim_reward(
    State(state): State<AppState>,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let address = req
        .address
        .as_deref()
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| claim_error(StatusCode::BAD_REQUEST, "wallet address is required"))?;
    let score = req
        .score
        .as_ref()
        .ok_or_else(|| claim_error(StatusCode::BAD_REQUEST, "score is required"))?
        .as_u64()
        .ok_or_else(|| {
            claim_error(
                StatusCode::BAD_REQUEST,
                "score must be a non-negative integer",
            )
        })?;

    let request = RewardRequest {
        subject_account: address.to_string(),
        observed_score: 0,
        cumulative_score: Some(score),
    };
    match state.engine.issue_reward(&request).await {
        Ok(IssueOutcome::Rewarded { tx_id }) => {
            metrics::REWARD_SUBMISSIONS_TOTAL
                .with_label_values(&["rewarded"])
                .inc();
            metrics::CLAIM_REQUESTS_TOTAL.with_label_values(&["ok"]).inc();
            Ok(Json(ClaimResponse {
                status: "success",
                tx_hash: Some(tx_id.0),
                message: Some("Reward successfully claimed!".to_string()),
            }))
        }
        Ok(IssueOutcome::Ineligible { reason }) => {
            metrics::REWARD_SUBMISSIONS_TOTAL
                .with_label_values(&["ineligible"])
                .inc();
            Err(claim_error(StatusCode::BAD_REQUEST, &reason))
        }
        Err(e @ IssueError::Validation(_)) => {
            metrics::REWARD_SUBMISSIONS_TOTAL
                .with_label_values(&["validation_error"])
                .inc();
            Err(claim_error(StatusCode::BAD_REQUEST, &e.to_string()))
        }
        Err(e) => {
            metrics::REWARD_SUBMISSIONS_TOTAL
                .with_label_values(&[issue_error_label(&e)])
                .inc();
            warn!(error = %e, "claim reward failed");
            Err(claim_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))
        }
    }
}

fn claim_error(code: StatusCode, message: &str) -> ApiError {
    let status = if code == StatusCode::BAD_REQUEST {
        "bad_request"
    } else {
        "error"
    };
    metrics::CLAIM_REQUESTS_TOTAL
        .with_label_values(&[status])
        .inc();
    ApiError::new(code, message)
}

fn issue_error_label(e: &IssueError) -> &'static str {
    match e {
        IssueError::Validation(_) => "validation_error",
        IssueError::Signing(_) => "signing_error",
        IssueError::Submission(_) => "submission_error",
    }
}

async fn metrics_text() -> Response {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        metrics::gather_text(),
    )
        .into_response()
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(health))
        .route("/analyze", post(analyze))
        .route("/claim-reward", post(claim_reward));
    if state.metrics_enabled {
        router = router.route("/metrics", get(metrics_text));
    }
    router.layer(CorsLayer::permissive()).with_state(state)
}

pub async fn serve(bind: &str, state: AppState) -> Result<(), String> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| format!("failed to bind {bind}: {e}"))?;
    info!(bind, "http server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("http server error: {e}"))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
