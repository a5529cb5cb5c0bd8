// crates/trunkline-server/src/pipeline.rs
// ============================================================================
// Module: Webhook Pipeline
// Description: Validation, idempotency, state advancement, and CCML synthesis.
// Purpose: Apply each carrier webhook exactly once and answer it safely.
// Dependencies: trunkline-core, trunkline-engine, crate::{telemetry, webhook}
// ============================================================================

//! ## Overview
//! Three entry points, one shape: validate the payload, claim the event in
//! the idempotency ledger, advance the session's state machine, persist,
//! publish, answer. Every path is wrapped so a retried delivery is skipped,
//! a failed delivery stays retryable, and an illegal transition is dropped
//! with a warning while the carrier still gets its 200.
//!
//! The initial call request additionally runs the routing decision and
//! replies with CCML; a duplicate initial request re-synthesizes the reply
//! from the recorded assignment instead of re-running the strategies, so
//! selection accounting stays at-most-once too.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use trunkline_core::CallEvent;
use trunkline_core::CallSession;
use trunkline_core::CallSid;
use trunkline_core::CallState;
use trunkline_core::CorrelationId;
use trunkline_core::EngineError;
use trunkline_core::EventId;
use trunkline_core::ProcessingOutcome;
use trunkline_core::RoutingDirectory;
use trunkline_core::SessionRepository;
use trunkline_core::SessionToken;
use trunkline_core::Tenant;
use trunkline_core::Timestamp;
use trunkline_core::WebhookKind;
use trunkline_core::map_carrier_status;
use trunkline_core::runtime::ProjectionApplied;
use trunkline_core::runtime::apply_projection;
use trunkline_core::runtime::transition;
use trunkline_engine::CdrFinalization;
use trunkline_engine::CdrFinalizer;
use trunkline_engine::CredentialVault;
use trunkline_engine::EventName;
use trunkline_engine::EventPublisher;
use trunkline_engine::ExecutionOutcome;
use trunkline_engine::IdempotencyLedger;
use trunkline_engine::RoutingEngine;
use trunkline_engine::RoutingRequest;
use trunkline_engine::SessionStateCache;
use trunkline_engine::ccml;
use trunkline_engine::derive_event_id;
use uuid::Uuid;

use crate::telemetry::WebhookMetricEvent;
use crate::telemetry::WebhookMetrics;
use crate::telemetry::WebhookOutcome;
use crate::webhook::ApplicationRequestPayload;
use crate::webhook::CdrCallbackPayload;
use crate::webhook::SessionUpdatePayload;

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// The webhook ingestion pipeline.
#[derive(Clone)]
pub struct WebhookPipeline {
    /// Durable persistence authority.
    repository: Arc<dyn SessionRepository>,
    /// Routing configuration reads.
    directory: Arc<dyn RoutingDirectory>,
    /// Routing decision engine.
    engine: RoutingEngine,
    /// Webhook deduplication ledger.
    ledger: IdempotencyLedger,
    /// Dashboard event publisher.
    publisher: EventPublisher,
    /// Final call-record writer.
    finalizer: CdrFinalizer,
    /// Shared-store session snapshot cache.
    cache: SessionStateCache,
    /// Credential decryption seam (duplicate-reply synthesis).
    vault: Arc<dyn CredentialVault>,
    /// Telemetry sink.
    metrics: Arc<dyn WebhookMetrics>,
}

impl WebhookPipeline {
    /// Assembles the pipeline from its collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments, reason = "One collaborator per seam.")]
    pub fn new(
        repository: Arc<dyn SessionRepository>,
        directory: Arc<dyn RoutingDirectory>,
        engine: RoutingEngine,
        ledger: IdempotencyLedger,
        publisher: EventPublisher,
        finalizer: CdrFinalizer,
        cache: SessionStateCache,
        vault: Arc<dyn CredentialVault>,
        metrics: Arc<dyn WebhookMetrics>,
    ) -> Self {
        Self {
            repository,
            directory,
            engine,
            ledger,
            publisher,
            finalizer,
            cache,
            vault,
            metrics,
        }
    }

    /// Records one telemetry event.
    fn observe(&self, kind: WebhookKind, outcome: WebhookOutcome, started: Instant) {
        self.metrics.record(&WebhookMetricEvent {
            kind,
            outcome,
            latency: started.elapsed(),
        });
    }

    // ------------------------------------------------------------------
    // Application request
    // ------------------------------------------------------------------

    /// Handles the initial call request and returns the CCML reply body.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when processing fails; the transport layer
    /// answers with a clean hangup and the event stays retryable.
    pub fn handle_application_request(
        &self,
        tenant: &Tenant,
        payload: &ApplicationRequestPayload,
        raw: &serde_json::Value,
        headers: &BTreeMap<String, String>,
    ) -> Result<String, EngineError> {
        let started = Instant::now();
        let kind = WebhookKind::ApplicationRequest;
        let correlation = CorrelationId::new(Uuid::new_v4().to_string());
        let token = SessionToken::new(&payload.session);
        let subset = serde_json::json!({
            "call_sid": payload.call_sid,
            "from": payload.from,
            "to": payload.to,
        });
        let event_id = derive_event_id(kind, &token, &subset)
            .map_err(|err| EngineError::Internal(err.to_string()))?;
        let key = self.ledger.key(tenant.id, kind, &token, &event_id);
        let executed = self.ledger.execute_once(&key, || {
            self.apply_application_request(
                tenant,
                payload,
                raw,
                headers,
                &token,
                &event_id,
                &correlation,
            )
        });
        match executed {
            Ok(ExecutionOutcome::Executed(ccml)) => {
                self.observe(kind, WebhookOutcome::Applied, started);
                Ok(ccml)
            }
            Ok(ExecutionOutcome::Skipped) => {
                self.observe(kind, WebhookOutcome::Duplicate, started);
                self.replay_application_request(tenant, &token, &correlation)
            }
            Err(error) => {
                self.observe(kind, WebhookOutcome::Error, started);
                Err(error)
            }
        }
    }

    /// First-delivery body of the initial call request.
    #[allow(clippy::too_many_arguments, reason = "Claimed-event context travels together.")]
    fn apply_application_request(
        &self,
        tenant: &Tenant,
        payload: &ApplicationRequestPayload,
        raw: &serde_json::Value,
        headers: &BTreeMap<String, String>,
        token: &SessionToken,
        event_id: &EventId,
        correlation: &CorrelationId,
    ) -> Result<String, EngineError> {
        let now = Timestamp::now();
        let mut session = match self.repository.load_session(tenant.id, token)? {
            Some(existing) => existing,
            None => CallSession::open(
                tenant.id,
                token.clone(),
                CallSid::new(&payload.call_sid),
                payload.direction,
                &payload.from,
                &payload.to,
                now,
            ),
        };
        if session.state == CallState::Received {
            transition(&mut session, CallState::Queued, None, now)?;
        }
        let request = RoutingRequest {
            tenant_id: tenant.id,
            token,
            caller_id: &payload.from,
            destination: &payload.to,
            correlation_id: correlation,
        };
        let outcome = self.engine.decide(&request);
        session.assigned_agent = outcome.selected_agent.or(session.assigned_agent);
        session.assigned_group = outcome.selected_group.or(session.assigned_group);
        if !payload.extra.is_empty() {
            session.merge_metadata(serde_json::Value::Object(payload.extra.clone()));
        }
        session.merge_metadata(serde_json::json!({
            "routing_kind": outcome.kind.as_str(),
            "routing": outcome.metadata,
        }));
        if session.state == CallState::Queued {
            transition(&mut session, CallState::Routing, None, now)?;
            let settled = if outcome.success {
                CallState::Connecting
            } else {
                // Nothing to bridge: park the session terminally instead of
                // leaving it open after the carrier was told to hang up.
                CallState::Failed
            };
            transition(
                &mut session,
                settled,
                Some(serde_json::json!({ "routing_kind": outcome.kind.as_str() })),
                now,
            )?;
        }
        self.repository.save_session(&session)?;
        if let Err(error) = self.cache.save(&session) {
            tracing::warn!(token = token.as_str(), %error, "session snapshot write failed");
        }
        self.repository.append_event(&CallEvent {
            tenant_id: tenant.id,
            token: token.clone(),
            event_id: event_id.clone(),
            kind: WebhookKind::ApplicationRequest,
            payload: raw.clone(),
            headers: headers.clone(),
            occurred_at: now,
            outcome: ProcessingOutcome::Applied,
        })?;
        self.publisher.publish(
            tenant.id,
            EventName::CallCreated,
            &serde_json::json!({
                "token": token.as_str(),
                "call_sid": payload.call_sid,
                "state": session.state.as_str(),
                "caller_id": payload.from,
                "destination": payload.to,
                "routing_kind": outcome.kind.as_str(),
                "target": outcome.target,
            }),
            now,
        );
        Ok(outcome.ccml)
    }

    /// Duplicate-delivery reply: re-synthesize from the recorded assignment.
    fn replay_application_request(
        &self,
        tenant: &Tenant,
        token: &SessionToken,
        correlation: &CorrelationId,
    ) -> Result<String, EngineError> {
        let session = self.repository.load_session(tenant.id, token)?;
        let Some(session) = session else {
            tracing::warn!(
                correlation = correlation.as_str(),
                token = token.as_str(),
                "duplicate initial request for an unknown session"
            );
            return Ok(ccml::hangup().render());
        };
        let Some(agent_id) = session.assigned_agent else {
            return Ok(ccml::hangup().render());
        };
        let Some(agent) = self.directory.agent(tenant.id, agent_id)? else {
            return Ok(ccml::hangup().render());
        };
        let document = ccml::dial_voice_agent(&agent, Some(&session.caller_id), &*self.vault)
            .map_err(|error| EngineError::Internal(error.to_string()))?;
        Ok(document.render())
    }

    // ------------------------------------------------------------------
    // Session update
    // ------------------------------------------------------------------

    /// Handles a lifecycle status update.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when processing fails; illegal transitions
    /// are not errors — they drop with a warning and the carrier gets 200.
    pub fn handle_session_update(
        &self,
        tenant: &Tenant,
        payload: &SessionUpdatePayload,
        raw: &serde_json::Value,
        headers: &BTreeMap<String, String>,
    ) -> Result<(), EngineError> {
        let started = Instant::now();
        let kind = WebhookKind::SessionUpdate;
        if payload.domain != tenant.domain {
            self.observe(kind, WebhookOutcome::Error, started);
            return Err(EngineError::Validation(
                "payload domain does not match the authenticated tenant".to_string(),
            ));
        }
        let token = SessionToken::new(&payload.token);
        let event_id = EventId::new(&payload.id);
        let key = self.ledger.key(tenant.id, kind, &token, &event_id);
        let executed = self.ledger.execute_once(&key, || {
            self.apply_session_update(tenant, payload, raw, headers, &token, &event_id)
        });
        match executed {
            Ok(ExecutionOutcome::Executed(applied)) => {
                let outcome = if applied {
                    WebhookOutcome::Applied
                } else {
                    WebhookOutcome::Rejected
                };
                self.observe(kind, outcome, started);
                Ok(())
            }
            Ok(ExecutionOutcome::Skipped) => {
                self.observe(kind, WebhookOutcome::Duplicate, started);
                Ok(())
            }
            Err(error) => {
                self.observe(kind, WebhookOutcome::Error, started);
                Err(error)
            }
        }
    }

    /// First-delivery body of a session update; returns whether the mapped
    /// transition was applied (false when dropped as illegal).
    fn apply_session_update(
        &self,
        tenant: &Tenant,
        payload: &SessionUpdatePayload,
        raw: &serde_json::Value,
        headers: &BTreeMap<String, String>,
        token: &SessionToken,
        event_id: &EventId,
    ) -> Result<bool, EngineError> {
        let cached = match self.cache.load(tenant.id, token) {
            Ok(cached) => cached,
            Err(error) => {
                tracing::warn!(token = token.as_str(), %error, "session snapshot read failed");
                None
            }
        };
        let mut session = match self.repository.load_session(tenant.id, token)? {
            Some(existing) => existing,
            None => {
                // First sighting via an update: open the session from the
                // carrier's own timing so ordering gaps stay observable.
                let direction = payload
                    .direction
                    .as_deref()
                    .and_then(trunkline_core::CallDirection::parse)
                    .unwrap_or(trunkline_core::CallDirection::Inbound);
                CallSession::open(
                    tenant.id,
                    token.clone(),
                    CallSid::new(&payload.id),
                    direction,
                    &payload.caller_id,
                    &payload.destination,
                    payload.call_start_time,
                )
            }
        };
        self.cache.reconcile(&session, cached.as_ref());
        let target = map_carrier_status(&payload.status);
        let projection = apply_projection(
            &mut session,
            target,
            Some(serde_json::json!({ "status": payload.status })),
            payload.modified_at,
        );
        let (applied, event_outcome) = match projection {
            Ok(applied) => {
                if let Some(answer_time) = payload.answer_time {
                    session.answered_at = Some(answer_time);
                    session.duration_secs =
                        Some(payload.modified_at.seconds_since(answer_time));
                }
                session.merge_metadata(serde_json::json!({
                    "last_status": payload.status,
                    "vapp_server": payload.vapp_server,
                }));
                self.repository.save_session(&session)?;
                if let Err(error) = self.cache.save(&session) {
                    tracing::warn!(token = token.as_str(), %error, "snapshot write failed");
                }
                (Some(applied), ProcessingOutcome::Applied)
            }
            Err(error) => {
                tracing::warn!(
                    token = token.as_str(),
                    status = payload.status.as_str(),
                    %error,
                    "status update dropped: illegal transition"
                );
                (None, ProcessingOutcome::RejectedTransition)
            }
        };
        self.repository.append_event(&CallEvent {
            tenant_id: tenant.id,
            token: token.clone(),
            event_id: event_id.clone(),
            kind: WebhookKind::SessionUpdate,
            payload: raw.clone(),
            headers: headers.clone(),
            occurred_at: payload.modified_at,
            outcome: event_outcome,
        })?;
        if applied == Some(ProjectionApplied::Advanced) {
            self.publisher.publish(
                tenant.id,
                EventName::CallUpdated,
                &serde_json::json!({
                    "token": token.as_str(),
                    "state": session.state.as_str(),
                    "status": payload.status,
                }),
                payload.modified_at,
            );
        }
        Ok(applied.is_some())
    }

    // ------------------------------------------------------------------
    // CDR callback
    // ------------------------------------------------------------------

    /// Handles the terminal CDR callback.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when processing fails; the event stays
    /// retryable through the ledger.
    pub fn handle_cdr(
        &self,
        tenant: &Tenant,
        payload: &CdrCallbackPayload,
        raw: &serde_json::Value,
        headers: &BTreeMap<String, String>,
    ) -> Result<(), EngineError> {
        let started = Instant::now();
        let kind = WebhookKind::CdrCallback;
        if payload.domain != tenant.domain {
            self.observe(kind, WebhookOutcome::Error, started);
            return Err(EngineError::Validation(
                "payload domain does not match the authenticated tenant".to_string(),
            ));
        }
        let token = payload
            .session
            .token
            .clone()
            .map_or_else(|| SessionToken::new(&payload.call_id), SessionToken::new);
        let subset = serde_json::json!({
            "call_id": payload.call_id,
            "disposition": payload.disposition,
            "duration": payload.duration,
        });
        let event_id = derive_event_id(kind, &token, &subset)
            .map_err(|err| EngineError::Internal(err.to_string()))?;
        let key = self.ledger.key(tenant.id, kind, &token, &event_id);
        let executed = self.ledger.execute_once(&key, || {
            self.apply_cdr(tenant, payload, raw, headers, &token, &event_id)
        });
        match executed {
            Ok(ExecutionOutcome::Executed(())) => {
                self.observe(kind, WebhookOutcome::Applied, started);
                Ok(())
            }
            Ok(ExecutionOutcome::Skipped) => {
                self.observe(kind, WebhookOutcome::Duplicate, started);
                Ok(())
            }
            Err(error) => {
                self.observe(kind, WebhookOutcome::Error, started);
                Err(error)
            }
        }
    }

    /// First-delivery body of the CDR callback.
    fn apply_cdr(
        &self,
        tenant: &Tenant,
        payload: &CdrCallbackPayload,
        raw: &serde_json::Value,
        headers: &BTreeMap<String, String>,
        token: &SessionToken,
        event_id: &EventId,
    ) -> Result<(), EngineError> {
        let now = Timestamp::now();
        let input = CdrFinalization {
            call_sid: CallSid::new(&payload.call_id),
            token: token.clone(),
            from_number: payload.from.clone(),
            to_number: payload.to.clone(),
            disposition: payload.disposition.clone(),
            direction: payload.direction.clone(),
            billed_seconds: payload.billsec.unwrap_or(payload.duration),
            started_at: CdrCallbackPayload::timing(payload.session.call_start_time.as_ref()),
            answered_at: CdrCallbackPayload::timing(payload.session.answer_time.as_ref()),
            ended_at: CdrCallbackPayload::timing(payload.session.end_time.as_ref()),
            raw_payload: raw.clone(),
        };
        let record = self.finalizer.finalize(tenant.id, input)?;
        self.repository.append_event(&CallEvent {
            tenant_id: tenant.id,
            token: token.clone(),
            event_id: event_id.clone(),
            kind: WebhookKind::CdrCallback,
            payload: raw.clone(),
            headers: headers.clone(),
            occurred_at: now,
            outcome: ProcessingOutcome::Applied,
        })?;
        self.publisher.publish(
            tenant.id,
            EventName::AnalyticsUpdated,
            &serde_json::json!({
                "call_sid": record.call_sid.as_str(),
                "disposition": record.disposition.as_str(),
                "billed_seconds": record.billed_seconds,
            }),
            now,
        );
        Ok(())
    }
}
