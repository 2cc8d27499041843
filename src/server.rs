//! The extraction gateway: the only server-side boundary.
//!
//! ```text
//! POST /api/analyze   { "image": "<data URI or base64>" } → BillData JSON
//! GET  /api/health    → { status, timestamp, api_key_present }
//! ```
//!
//! Status mapping for `/api/analyze`:
//!
//! | Condition                         | Status |
//! |-----------------------------------|--------|
//! | extraction succeeded              | 200    |
//! | no `image` field, or empty        | 400    |
//! | any method other than POST        | 405    |
//! | body over the configured limit    | 413    |
//! | model answered with no text       | 502    |
//! | provider failure, bad JSON, schema violation | 500 |
//!
//! Error bodies are plain text carrying the error message. Requests are
//! independent: the handler holds no state besides the shared provider
//! client, and each request makes at most one upstream call.

use crate::config::GatewayConfig;
use crate::error::BillError;
use crate::pipeline::data_uri::ImagePayload;
use crate::pipeline::extract::extract_bill;
use crate::provider::{resolve_provider, ExtractionProvider};
use crate::schema::{verify_against_bill_data, BILL_SCHEMA};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// State shared by gateway routes.
#[derive(Clone)]
pub struct AppState {
    provider: Arc<dyn ExtractionProvider>,
    config: Arc<GatewayConfig>,
}

impl AppState {
    /// Resolve the provider once and check the schema against the bill type.
    ///
    /// Fails when the credential is missing or the schema is out of sync, so
    /// a misconfigured gateway never starts accepting requests.
    pub fn new(config: GatewayConfig) -> Result<Self, BillError> {
        verify_against_bill_data(&BILL_SCHEMA)?;
        let provider = resolve_provider(&config)?;
        info!(
            "Gateway using provider '{}' with model '{}'",
            provider.name(),
            config.model
        );
        Ok(Self {
            provider,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    let limit = state.config.body_limit_bytes;
    Router::new()
        .route("/api/analyze", any(analyze))
        .route("/api/health", get(health))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

/// Bind `config.bind` and serve until Ctrl-C.
pub async fn serve(config: GatewayConfig) -> Result<(), BillError> {
    let addr = config.bind;
    let state = AppState::new(config)?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| BillError::BindFailed {
            addr: addr.to_string(),
            source,
        })?;
    run(listener, state, shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn run(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), BillError> {
    let addr = listener
        .local_addr()
        .map_err(|e| BillError::Internal(e.to_string()))?;
    info!("Gateway listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| BillError::Internal(format!("server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down gateway");
}

// ── Handlers ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    image: Option<String>,
}

/// Handler for `/api/analyze` (all methods; only POST is accepted).
async fn analyze(
    State(state): State<AppState>,
    method: Method,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    info!(method = %method, body_bytes = body.len(), "analyze request");

    if method != Method::POST {
        warn!(method = %method, "analyze: method not allowed");
        return Err(ApiError::MethodNotAllowed);
    }

    // An unparseable body is treated like a body without an image.
    let image = serde_json::from_slice::<AnalyzeRequest>(&body)
        .ok()
        .and_then(|r| r.image)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            warn!("analyze: missing image in body");
            ApiError::Bill(BillError::MissingImage)
        })?;

    let payload = ImagePayload::parse(&image);
    info!(
        image_len = image.len(),
        mime_type = %payload.mime_type,
        "analyze: calling provider"
    );

    let extraction = extract_bill(state.provider.as_ref(), payload, &state.config).await?;
    info!(
        duration_ms = extraction.duration_ms,
        input_tokens = extraction.input_tokens,
        output_tokens = extraction.output_tokens,
        "analyze: response parsed successfully"
    );

    Ok(Json(extraction.value))
}

/// Health report; reveals whether a credential is configured, never its value.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub api_key_present: bool,
}

/// Handler for `GET /api/health`.
async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok".into(),
        timestamp: Utc::now(),
        api_key_present: state.config.has_credential(),
    })
}

// ── Errors ───────────────────────────────────────────────────────────────

/// Failure of a gateway request, rendered as status + plain-text message.
#[derive(Debug)]
pub enum ApiError {
    MethodNotAllowed,
    Bill(BillError),
}

impl From<BillError> for ApiError {
    fn from(e: BillError) -> Self {
        ApiError::Bill(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Bill(BillError::MissingImage) => StatusCode::BAD_REQUEST,
            ApiError::Bill(BillError::EmptyResponse) => StatusCode::BAD_GATEWAY,
            ApiError::Bill(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::MethodNotAllowed => (
                status,
                [(header::ALLOW, "POST")],
                "Method Not Allowed",
            )
                .into_response(),
            ApiError::Bill(e) => {
                if status.is_server_error() {
                    error!(
                        status = status.as_u16(),
                        upstream = e.is_upstream(),
                        "analyze failed: {}",
                        e
                    );
                }
                (status, e.to_string()).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::MethodNotAllowed.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            ApiError::from(BillError::MissingImage).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(BillError::EmptyResponse).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(BillError::MalformedResponse {
                detail: "eof".into()
            })
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(BillError::Upstream {
                message: "boom".into()
            })
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn state_requires_credential() {
        let config = GatewayConfig {
            api_key: None,
            ..GatewayConfig::default()
        };
        assert!(matches!(
            AppState::new(config),
            Err(BillError::ProviderNotConfigured { .. })
        ));
    }
}
