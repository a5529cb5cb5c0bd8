// crates/trunkline-store/src/pubsub.rs
// ============================================================================
// Module: Event Bus
// Description: Named broadcast channels for tenant-scoped dashboard events.
// Purpose: Deliver fire-and-forget JSON messages to live subscribers.
// Dependencies: tokio, tracing
// ============================================================================

//! ## Overview
//! The event bus is a map of named broadcast channels. Publication is
//! fire-and-forget: a channel with no subscribers drops the message, a
//! lagging subscriber loses the oldest messages, and neither case ever
//! surfaces as an error to webhook processing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use tokio::sync::broadcast;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Event bus configuration.
///
/// # Invariants
/// - `channel_capacity` is at least 1.
#[derive(Debug, Clone, Copy)]
pub struct EventBusConfig {
    /// Buffered messages per channel before lagging subscribers lose data.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

// ============================================================================
// SECTION: Bus
// ============================================================================

/// Named broadcast channels keyed by channel name.
///
/// # Invariants
/// - Channels are created on first use (publish or subscribe).
/// - Publishing never fails; delivery is best effort.
#[derive(Debug)]
pub struct EventBus {
    /// Channel senders by name.
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    /// Per-channel buffer capacity.
    capacity: usize,
}

impl EventBus {
    /// Creates a bus with the given configuration.
    #[must_use]
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: config.channel_capacity.max(1),
        }
    }

    /// Returns the sender for a channel, creating it when missing.
    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        let mut guard = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publishes a message; returns how many subscribers received it.
    ///
    /// A channel with no subscribers returns zero. This is the normal idle
    /// case, not a failure.
    pub fn publish(&self, channel: &str, payload: String) -> usize {
        let sender = self.sender(channel);
        match sender.send(payload) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::trace!(channel, "no subscribers on channel");
                0
            }
        }
    }

    /// Subscribes to a channel, creating it when missing.
    #[must_use]
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.sender(channel).subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}
