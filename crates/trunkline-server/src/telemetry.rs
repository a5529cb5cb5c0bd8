// crates/trunkline-server/src/telemetry.rs
// ============================================================================
// Module: Webhook Telemetry
// Description: Observability hooks for webhook ingestion.
// Purpose: Provide metric events and latency buckets without hard deps.
// Dependencies: trunkline-core
// ============================================================================

//! ## Overview
//! This module exposes a thin metrics interface for webhook counters and
//! latency histograms. It is intentionally dependency-light so deployments
//! can plug in Prometheus or OpenTelemetry without redesign. Labels must
//! never carry tokens, numbers, or credentials.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use trunkline_core::WebhookKind;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for webhook histograms.
pub const WEBHOOK_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000];

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// Webhook outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum WebhookOutcome {
    /// Processed and applied.
    Applied,
    /// Deduplicated by the idempotency ledger.
    Duplicate,
    /// Dropped on an illegal transition.
    Rejected,
    /// Failed; the carrier may retry.
    Error,
}

impl WebhookOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Duplicate => "duplicate",
            Self::Rejected => "rejected",
            Self::Error => "error",
        }
    }
}

/// Webhook metric event payload.
#[derive(Debug, Clone)]
pub struct WebhookMetricEvent {
    /// Webhook kind.
    pub kind: WebhookKind,
    /// Processing outcome.
    pub outcome: WebhookOutcome,
    /// End-to-end handler latency.
    pub latency: Duration,
}

// ============================================================================
// SECTION: Metrics Interface
// ============================================================================

/// Metrics sink for webhook ingestion.
pub trait WebhookMetrics: Send + Sync {
    /// Records one webhook metric event.
    fn record(&self, event: &WebhookMetricEvent);
}

/// Metrics sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl WebhookMetrics for NoopMetrics {
    fn record(&self, _event: &WebhookMetricEvent) {}
}
