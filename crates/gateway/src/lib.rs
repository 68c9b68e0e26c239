//! HTTP gateway for TaxMate.
//!
//! Exposes the governance service as JSON endpoints: starting runs per
//! variant, resuming suspended runs, thread state, and the ledger log and
//! audit. Built on Axum.

pub mod rate_limit;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use taxmate_config::GatewayConfig;
use taxmate_core::{ActorRole, Anomaly, LogEntry, RunOutcome, SAMPLE_INVOICE, ThreadError, Variant};
use taxmate_engine::{GovernanceService, RunReport, ServiceError, StateReport};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

use rate_limit::{FixedWindowLimiter, rate_limit_middleware};

type SharedState = Arc<GovernanceService>;

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            thread_id: None,
        }),
    )
}

/// Build the router with every route and the security layers:
/// - fixed-window rate limiting on `/run/*`
/// - CORS for the local dashboard origins
/// - request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(service: SharedState, config: &GatewayConfig) -> Router {
    let limiter = Arc::new(FixedWindowLimiter::new(
        config.rate_limit_requests,
        Duration::from_secs(config.rate_limit_window_secs),
    ));

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([
            HeaderValue::from_static("http://localhost:8501"),
            HeaderValue::from_static("http://127.0.0.1:8501"),
        ]))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route("/run/{variant}", post(run_handler))
        .route("/resume", post(resume_handler))
        .route("/state/{thread_id}", get(state_handler))
        .route("/reset", post(reset_handler))
        .route("/logs", get(logs_handler))
        .route("/audit", get(audit_handler))
        .with_state(service)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(middleware::from_fn(move |req, next| {
            rate_limit_middleware(limiter.clone(), req, next)
        }))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: taxmate_config::AppConfig) -> taxmate_core::Result<()> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let collaborators = taxmate_providers::build_from_config(&config)?;
    let service = Arc::new(GovernanceService::new(
        &config,
        collaborators.proposer,
        collaborators.judge,
    )?);

    let app = build_router(service, &config.gateway);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Body of `POST /run/{variant}`. Both fields are optional, and so is the body.
#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub invoice_text: Option<String>,
    #[serde(default)]
    pub role: Option<ActorRole>,
}

#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    pub thread_id: String,
    pub approved: bool,
}

async fn run_handler(
    State(service): State<SharedState>,
    Path(variant): Path<String>,
    body: Bytes,
) -> Result<Json<RunReport>, ApiError> {
    let variant: Variant = variant
        .parse()
        .map_err(|e: String| api_error(StatusCode::NOT_FOUND, e))?;

    let request = if body.iter().all(u8::is_ascii_whitespace) {
        RunRequest::default()
    } else {
        serde_json::from_slice::<RunRequest>(&body)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid request body: {e}")))?
    };

    let invoice_text = request.invoice_text.as_deref().unwrap_or(SAMPLE_INVOICE);
    let role = request.role.unwrap_or_default();

    let report = service.start_run(invoice_text, role, variant).await;
    report_response(report)
}

async fn resume_handler(
    State(service): State<SharedState>,
    Json(request): Json<ResumeRequest>,
) -> Result<Json<RunReport>, ApiError> {
    let report = service
        .resume_run(&request.thread_id, request.approved)
        .await
        .map_err(service_error)?;
    report_response(report)
}

async fn state_handler(
    State(service): State<SharedState>,
    Path(thread_id): Path<String>,
) -> Result<Json<StateReport>, ApiError> {
    service
        .get_state(&thread_id)
        .await
        .map(Json)
        .map_err(service_error)
}

#[derive(Serialize)]
struct ResetResponse {
    status: &'static str,
}

async fn reset_handler(State(service): State<SharedState>) -> Json<ResetResponse> {
    service.reset();
    Json(ResetResponse {
        status: "Ledger reset",
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    pub logs: Vec<LogEntry>,
}

async fn logs_handler(State(service): State<SharedState>) -> Json<LogsResponse> {
    Json(LogsResponse {
        logs: service.get_logs(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditResponse {
    pub anomalies: Vec<Anomaly>,
}

async fn audit_handler(State(service): State<SharedState>) -> Json<AuditResponse> {
    Json(AuditResponse {
        anomalies: service.audit(),
    })
}

/// A failed agent call is the one pipeline outcome surfaced as an HTTP error.
fn report_response(report: RunReport) -> Result<Json<RunReport>, ApiError> {
    match &report.outcome {
        Some(RunOutcome::AgentFailed { cause }) => {
            warn!(thread_id = %report.thread_id, cause = %cause, "Agent call failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: cause.clone(),
                    thread_id: Some(report.thread_id),
                }),
            ))
        }
        _ => Ok(Json(report)),
    }
}

fn service_error(e: ServiceError) -> ApiError {
    match e {
        ServiceError::Thread(ThreadError::NotFound(_)) => api_error(StatusCode::NOT_FOUND, e.to_string()),
        ServiceError::Thread(ThreadError::NotSuspended { .. }) => {
            api_error(StatusCode::CONFLICT, e.to_string())
        }
        other => {
            error!(error = %other, "Unexpected service error");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}
