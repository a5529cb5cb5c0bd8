// crates/trunkline-server/src/server.rs
// ============================================================================
// Module: Webhook HTTP Server
// Description: axum transport for the three carrier webhook endpoints.
// Purpose: Accept carrier posts and always answer with a well-formed body.
// Dependencies: axum, tokio, crate::{auth, pipeline, webhook}
// ============================================================================

//! ## Overview
//! Three POST routes, one discipline: the carrier always receives 200 with a
//! body it can act on. The initial call request answers CCML
//! (`application/xml`); validation or engine failure answers the clean
//! hangup document. Lifecycle and CDR endpoints answer `"OK"` even on
//! failure — the carrier treats non-2xx as retryable and the idempotency
//! ledger already guarantees a real retry is safe, so a noisy 5xx buys
//! nothing but carrier-side backoff.
//!
//! Each request runs under the configured deadline (10 s by default); a
//! timeout is handled exactly like an engine failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use trunkline_core::Tenant;
use trunkline_core::TenantDirectory;

use crate::auth;
use crate::pipeline::WebhookPipeline;
use crate::webhook;
use crate::webhook::ApplicationRequestPayload;
use crate::webhook::CdrCallbackPayload;
use crate::webhook::SessionUpdatePayload;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// The clean-close body every failed initial request receives.
const HANGUP_BODY: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Hangup/></Response>";
/// The acknowledgment body for lifecycle and CDR endpoints.
const OK_BODY: &str = "OK";

// ============================================================================
// SECTION: Server State
// ============================================================================

/// Shared state for the webhook handlers.
#[derive(Clone)]
pub struct ServerState {
    /// Webhook ingestion pipeline.
    pub pipeline: Arc<WebhookPipeline>,
    /// Tenant resolution for header auth.
    pub tenants: Arc<dyn TenantDirectory>,
    /// Maximum accepted body size.
    pub max_body_bytes: usize,
    /// Per-request deadline.
    pub request_timeout: Duration,
}

/// Builds the webhook router.
#[must_use]
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/voice/application/{domain}", post(handle_application))
        .route("/voice/session/update/{domain}", post(handle_session_update))
        .route("/voice/session/cdr/{domain}", post(handle_cdr))
        .with_state(Arc::new(state))
}

/// Serves the router until the listener fails.
///
/// # Errors
///
/// Returns an error string when binding or serving fails.
pub async fn serve(bind: SocketAddr, state: ServerState) -> Result<(), String> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| format!("webhook bind failed: {err}"))?;
    tracing::info!(%bind, "webhook server listening");
    axum::serve(listener, app)
        .await
        .map_err(|err| format!("webhook server failed: {err}"))
}

// ============================================================================
// SECTION: Request Plumbing
// ============================================================================

/// Collects headers into the lowercased pairs the auth and audit layers use.
fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

/// Shared pre-processing: size cap, auth, body decode.
fn admit_request(
    state: &ServerState,
    domain: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<(Tenant, serde_json::Value, std::collections::BTreeMap<String, String>), String> {
    if body.len() > state.max_body_bytes {
        return Err(format!("body of {} bytes exceeds the cap", body.len()));
    }
    let pairs = header_pairs(headers);
    let mut lowercased = std::collections::BTreeMap::new();
    for (name, value) in &pairs {
        lowercased.insert(name.to_ascii_lowercase(), value.clone());
    }
    let tenant = auth::authenticate(&*state.tenants, domain, &lowercased)
        .map_err(|err| format!("auth rejected: {err}"))?;
    let content_type = lowercased.get(CONTENT_TYPE.as_str()).map(String::as_str);
    let raw = webhook::decode_body(content_type, body).map_err(|err| err.to_string())?;
    let audited = webhook::capture_headers(&pairs);
    Ok((tenant, raw, audited))
}

/// Builds the CCML response for the initial call endpoint.
fn ccml_response(body: String) -> Response {
    ([(CONTENT_TYPE, "application/xml")], body).into_response()
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Handles `POST /voice/application/{domain}`.
async fn handle_application(
    State(state): State<Arc<ServerState>>,
    Path(domain): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let work = async {
        let (tenant, raw, audited) = match admit_request(&state, &domain, &headers, &body) {
            Ok(admitted) => admitted,
            Err(reason) => {
                tracing::warn!(domain = %domain, reason = %reason, "initial call request rejected");
                return ccml_response(HANGUP_BODY.to_string());
            }
        };
        let payload = match ApplicationRequestPayload::from_value(&raw) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(domain = %domain, %error, "initial call payload invalid");
                return ccml_response(HANGUP_BODY.to_string());
            }
        };
        match state
            .pipeline
            .handle_application_request(&tenant, &payload, &raw, &audited)
        {
            Ok(ccml) => ccml_response(ccml),
            Err(error) => {
                tracing::error!(domain = %domain, %error, "initial call processing failed");
                ccml_response(HANGUP_BODY.to_string())
            }
        }
    };
    match tokio::time::timeout(state.request_timeout, work).await {
        Ok(response) => response,
        Err(_) => {
            tracing::error!(domain = %domain, "initial call request timed out");
            ccml_response(HANGUP_BODY.to_string())
        }
    }
}

/// Handles `POST /voice/session/update/{domain}`.
async fn handle_session_update(
    State(state): State<Arc<ServerState>>,
    Path(domain): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let work = async {
        let (tenant, raw, audited) = match admit_request(&state, &domain, &headers, &body) {
            Ok(admitted) => admitted,
            Err(reason) => {
                tracing::warn!(domain = %domain, reason = %reason, "session update rejected");
                return (StatusCode::OK, OK_BODY).into_response();
            }
        };
        let payload = match SessionUpdatePayload::from_value(&raw) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(domain = %domain, %error, "session update payload invalid");
                return (StatusCode::OK, OK_BODY).into_response();
            }
        };
        if let Err(error) =
            state.pipeline.handle_session_update(&tenant, &payload, &raw, &audited)
        {
            tracing::error!(domain = %domain, %error, "session update processing failed");
        }
        (StatusCode::OK, OK_BODY).into_response()
    };
    match tokio::time::timeout(state.request_timeout, work).await {
        Ok(response) => response,
        Err(_) => {
            tracing::error!(domain = %domain, "session update timed out");
            (StatusCode::OK, OK_BODY).into_response()
        }
    }
}

/// Handles `POST /voice/session/cdr/{domain}`.
async fn handle_cdr(
    State(state): State<Arc<ServerState>>,
    Path(domain): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let work = async {
        let (tenant, raw, audited) = match admit_request(&state, &domain, &headers, &body) {
            Ok(admitted) => admitted,
            Err(reason) => {
                tracing::warn!(domain = %domain, reason = %reason, "cdr callback rejected");
                return (StatusCode::OK, OK_BODY).into_response();
            }
        };
        let payload = match CdrCallbackPayload::from_value(&raw) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(domain = %domain, %error, "cdr payload invalid");
                return (StatusCode::OK, OK_BODY).into_response();
            }
        };
        if let Err(error) = state.pipeline.handle_cdr(&tenant, &payload, &raw, &audited) {
            tracing::error!(domain = %domain, %error, "cdr processing failed");
        }
        (StatusCode::OK, OK_BODY).into_response()
    };
    match tokio::time::timeout(state.request_timeout, work).await {
        Ok(response) => response,
        Err(_) => {
            tracing::error!(domain = %domain, "cdr callback timed out");
            (StatusCode::OK, OK_BODY).into_response()
        }
    }
}
