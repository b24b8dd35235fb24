// HTTP request handlers
// Author: kelexine (https://github.com/kelexine)

use super::routes::AppState;
use crate::cache::{CacheStats, RequestType};
use crate::error::GuardError;
use crate::governance::{
    sweep_once, DenialReason, GeneratedContent, GenerationRequest, GovernedResponse, SweepReport,
};
use crate::metrics::gather_metrics;
use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::debug;

pub const USER_ID_HEADER: &str = "x-user-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HashMap<String, HealthCheck>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: String,
}

/// Body of `POST /v1/generate/{request_type}`.
#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    /// Free text or a structured prompt; passed to the generator untouched.
    pub input: Value,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut checks = HashMap::new();
    let mut overall_status = HealthStatus::Healthy;

    // Check the backing store with a cheap aggregate
    let store_check = match state.service.cache().get_stats().await {
        Ok(stats) => HealthCheck {
            status: "ok".to_string(),
            message: format!("{} live cache entries", stats.entries),
        },
        Err(e) => {
            overall_status = HealthStatus::Unhealthy;
            HealthCheck {
                status: "error".to_string(),
                message: format!("Store unavailable: {}", e),
            }
        }
    };
    checks.insert("store".to_string(), store_check);

    // Check upstream credentials
    let upstream_check = if state.config.upstream.api_key.is_none() {
        if matches!(overall_status, HealthStatus::Healthy) {
            overall_status = HealthStatus::Degraded;
        }
        HealthCheck {
            status: "warning".to_string(),
            message: "No upstream API key configured".to_string(),
        }
    } else {
        HealthCheck {
            status: "ok".to_string(),
            message: format!(
                "API base: {}, model: {}",
                state.config.upstream.api_base_url, state.config.upstream.model
            ),
        }
    };
    checks.insert("upstream".to_string(), upstream_check);

    Json(HealthResponse {
        status: overall_status,
        checks,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Handler for `POST /v1/generate/{request_type}`
pub async fn generate_handler(
    State(state): State<AppState>,
    Path(request_type): Path<String>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, GuardError> {
    let request_type: RequestType = request_type.parse().map_err(GuardError::InvalidRequest)?;

    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            GuardError::InvalidRequest(format!("missing {} header", USER_ID_HEADER))
        })?
        .to_string();

    let body: GenerateBody = serde_json::from_str(&body).map_err(|e| {
        debug!("Failed to deserialize generate request: {}", e);
        GuardError::InvalidRequest(format!("JSON deserialization error: {}", e))
    })?;

    let client_ip = client_ip(
        &headers,
        connect_info.map(|ConnectInfo(addr)| addr),
        state.config.server.trust_forwarded_for,
    );

    let mut request = GenerationRequest::new(user_id, request_type, body.input);
    request.client_ip = client_ip;

    match state.service.generate(request).await? {
        GovernedResponse::Generated(content) => Ok(generated_response(content)),
        GovernedResponse::Denied(denial) => {
            let status = match denial.reason {
                DenialReason::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                DenialReason::PlanLimitReached { .. } => StatusCode::PAYMENT_REQUIRED,
            };

            let mut error = json!({
                "type": denial.reason_code(),
                "message": denial.message,
            });
            if let Some(secs) = denial.retry_after_secs {
                error["retry_after_secs"] = json!(secs);
            }

            let mut response =
                (status, Json(json!({ "type": "error", "error": error }))).into_response();
            if let Some(secs) = denial.retry_after_secs {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
            }
            Ok(response)
        }
    }
}

fn generated_response(content: GeneratedContent) -> Response {
    let remaining = content.rate_limit.remaining;
    let reset = content.rate_limit.reset_at.timestamp();
    let cache_status = if content.metadata.cached { "hit" } else { "miss" };

    let mut response = Json(&content).into_response();
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(reset));
    headers.insert("x-cache", HeaderValue::from_static(cache_status));
    response
}

/// First `X-Forwarded-For` hop when trusted, else the socket peer.
fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> Option<String> {
    let forwarded = trust_forwarded_for
        .then(|| headers.get(FORWARDED_FOR_HEADER))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    forwarded.or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// Handler for `GET /v1/cache/stats`
pub async fn cache_stats_handler(
    State(state): State<AppState>,
) -> Result<Json<CacheStats>, GuardError> {
    Ok(Json(state.service.cache().get_stats().await?))
}

/// Handler for `POST /v1/maintenance/sweep`
pub async fn sweep_handler(State(state): State<AppState>) -> Result<Json<SweepReport>, GuardError> {
    Ok(Json(sweep_once(&state.service).await?))
}

/// Handler for `GET /metrics` (Prometheus text format)
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}
