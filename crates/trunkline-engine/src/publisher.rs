// crates/trunkline-engine/src/publisher.rs
// ============================================================================
// Module: Event Publisher
// Description: Tenant-scoped broadcast of lifecycle events to dashboards.
// Purpose: Emit stable, additive JSON messages without impacting webhooks.
// Dependencies: trunkline-core, trunkline-store
// ============================================================================

//! ## Overview
//! Dashboards subscribe to three channels per tenant — calls, agents,
//! analytics — and receive `{type, data, timestamp}` JSON messages with
//! stable event names. Publication is fire-and-forget: a serialization
//! failure or an empty channel logs at warn level and webhook processing
//! never notices.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;
use trunkline_core::TenantId;
use trunkline_core::Timestamp;
use trunkline_store::EventBus;

use crate::keys;

// ============================================================================
// SECTION: Event Names
// ============================================================================

/// Stable event names on the bus. Additive changes only; no versioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventName {
    /// A session was created from an initial webhook.
    CallCreated,
    /// A session advanced through a lifecycle update.
    CallUpdated,
    /// An agent's availability changed.
    AgentStatusUpdated,
    /// Aggregates behind the analytics view changed.
    AnalyticsUpdated,
}

impl EventName {
    /// Returns the stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CallCreated => "call.created",
            Self::CallUpdated => "call.updated",
            Self::AgentStatusUpdated => "agent.status.updated",
            Self::AnalyticsUpdated => "analytics.updated",
        }
    }

    /// Returns the channel family the event publishes on.
    const fn channel(self, tenant_id: TenantId) -> ChannelFamily {
        match self {
            Self::CallCreated | Self::CallUpdated => ChannelFamily::Calls(tenant_id),
            Self::AgentStatusUpdated => ChannelFamily::Agents(tenant_id),
            Self::AnalyticsUpdated => ChannelFamily::Analytics(tenant_id),
        }
    }
}

/// Tenant-scoped channel family.
#[derive(Debug, Clone, Copy)]
enum ChannelFamily {
    /// `tenant.{id}.calls`
    Calls(TenantId),
    /// `tenant.{id}.agents`
    Agents(TenantId),
    /// `tenant.{id}.analytics`
    Analytics(TenantId),
}

impl ChannelFamily {
    /// Returns the channel name.
    fn name(self) -> String {
        match self {
            Self::Calls(tenant_id) => keys::calls_channel(tenant_id),
            Self::Agents(tenant_id) => keys::agents_channel(tenant_id),
            Self::Analytics(tenant_id) => keys::analytics_channel(tenant_id),
        }
    }
}

// ============================================================================
// SECTION: Message Shape
// ============================================================================

/// The stable message envelope.
#[derive(Debug, Clone, Serialize)]
struct EventMessage<'data> {
    /// Stable event name.
    #[serde(rename = "type")]
    event_type: &'static str,
    /// Event payload.
    data: &'data serde_json::Value,
    /// Publication time in unix milliseconds.
    timestamp: i64,
}

// ============================================================================
// SECTION: Publisher
// ============================================================================

/// Fire-and-forget publisher over the event bus.
#[derive(Clone)]
pub struct EventPublisher {
    /// Shared broadcast bus.
    bus: Arc<EventBus>,
}

impl EventPublisher {
    /// Creates a publisher over the given bus.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
        }
    }

    /// Publishes one event; failures are logged and swallowed.
    pub fn publish(
        &self,
        tenant_id: TenantId,
        event: EventName,
        data: &serde_json::Value,
        at: Timestamp,
    ) {
        let message = EventMessage {
            event_type: event.as_str(),
            data,
            timestamp: at.as_unix_millis(),
        };
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(
                    tenant = %tenant_id,
                    event = event.as_str(),
                    %error,
                    "event serialization failed, message dropped"
                );
                return;
            }
        };
        let channel = event.channel(tenant_id).name();
        let delivered = self.bus.publish(&channel, payload);
        tracing::trace!(channel, delivered, "event published");
    }
}
