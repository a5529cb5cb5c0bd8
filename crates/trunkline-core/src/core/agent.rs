// crates/trunkline-core/src/core/agent.rs
// ============================================================================
// Module: Trunkline Voice Agents
// Description: AI voice agent endpoints and their provider catalog.
// Purpose: Model the dialable endpoints the carrier bridges calls to.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A voice agent is one AI endpoint reachable through the carrier's
//! `<Service>` verb. The provider tag is a closed catalog; the service value
//! is opaque and provider-defined (an assistant id, a URL, or a UUID).
//! A closed subset of providers requires credential attributes on the wire.
//!
//! Security posture: credentials are stored as ciphertext produced by an
//! external primitive; this crate never sees or logs cleartext.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AgentId;
use crate::core::identifiers::TenantId;

// ============================================================================
// SECTION: Provider Catalog
// ============================================================================

/// Closed catalog of AI voice platform providers.
///
/// # Invariants
/// - Wire labels are stable snake_case strings.
/// - [`AgentProvider::requires_auth`] is the authoritative set of providers
///   whose `<Service>` element carries `username`/`password` attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentProvider {
    /// Vapi assistants (service value is an assistant id).
    Vapi,
    /// Retell agents.
    Retell,
    /// Bland pathways.
    Bland,
    /// Synthflow assistants.
    Synthflow,
    /// ElevenLabs conversational agents.
    Elevenlabs,
    /// `Play.ai` agents.
    PlayAi,
    /// Ultravox agents.
    Ultravox,
    /// Deepgram voice agents.
    Deepgram,
    /// OpenAI realtime endpoints.
    OpenaiRealtime,
    /// Azure voice endpoints (authenticated SIP service).
    AzureVoice,
    /// Sindarin personas.
    Sindarin,
    /// `PolyAI` assistants (authenticated SIP service).
    PolyAi,
    /// Parloa agents (authenticated SIP service).
    Parloa,
    /// Cognigy voice gateways (authenticated SIP service).
    Cognigy,
    /// Voiceflow runtime endpoints.
    Voiceflow,
    /// Dasha conversational endpoints.
    Dasha,
    /// Vocode agents.
    Vocode,
    /// Customer-managed SIP endpoint (authenticated).
    Custom,
}

impl AgentProvider {
    /// Every provider in catalog order.
    pub const ALL: [Self; 18] = [
        Self::Vapi,
        Self::Retell,
        Self::Bland,
        Self::Synthflow,
        Self::Elevenlabs,
        Self::PlayAi,
        Self::Ultravox,
        Self::Deepgram,
        Self::OpenaiRealtime,
        Self::AzureVoice,
        Self::Sindarin,
        Self::PolyAi,
        Self::Parloa,
        Self::Cognigy,
        Self::Voiceflow,
        Self::Dasha,
        Self::Vocode,
        Self::Custom,
    ];

    /// Returns the stable wire label for the provider.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vapi => "vapi",
            Self::Retell => "retell",
            Self::Bland => "bland",
            Self::Synthflow => "synthflow",
            Self::Elevenlabs => "elevenlabs",
            Self::PlayAi => "play_ai",
            Self::Ultravox => "ultravox",
            Self::Deepgram => "deepgram",
            Self::OpenaiRealtime => "openai_realtime",
            Self::AzureVoice => "azure_voice",
            Self::Sindarin => "sindarin",
            Self::PolyAi => "poly_ai",
            Self::Parloa => "parloa",
            Self::Cognigy => "cognigy",
            Self::Voiceflow => "voiceflow",
            Self::Dasha => "dasha",
            Self::Vocode => "vocode",
            Self::Custom => "custom",
        }
    }

    /// Parses a stable wire label (exact match only).
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|provider| provider.as_str() == label)
    }

    /// Returns true when the provider's `<Service>` element requires
    /// `username`/`password` attributes.
    #[must_use]
    pub const fn requires_auth(self) -> bool {
        matches!(
            self,
            Self::AzureVoice | Self::PolyAi | Self::Parloa | Self::Cognigy | Self::Custom
        )
    }
}

// ============================================================================
// SECTION: Credentials
// ============================================================================

/// Encrypted credential pair attached to an agent.
///
/// # Invariants
/// - Both fields hold ciphertext from the external encryption primitive.
/// - Values are opaque here; decryption happens only at synthesis time by the
///   caller that owns the primitive.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCredentials {
    /// Encrypted username.
    pub username: String,
    /// Encrypted password.
    pub password: String,
}

impl std::fmt::Debug for AgentCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Redacted so derive(Debug) on containing types cannot leak material.
        f.debug_struct("AgentCredentials")
            .field("username", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// SECTION: Voice Agent
// ============================================================================

/// One AI voice agent endpoint owned by a tenant.
///
/// # Invariants
/// - `name` is unique within the tenant.
/// - `service_value` semantics depend on `provider` and are never interpreted here.
/// - Destruction is legal only when no group membership references the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceAgent {
    /// Agent identifier.
    pub id: AgentId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Human-readable name, unique within the tenant.
    pub name: String,
    /// Provider tag from the closed catalog.
    pub provider: AgentProvider,
    /// Opaque provider-defined service value.
    pub service_value: String,
    /// Optional encrypted credential pair.
    pub credentials: Option<AgentCredentials>,
    /// Whether the agent is eligible for routing.
    pub enabled: bool,
    /// Free-form operator metadata.
    pub metadata: serde_json::Value,
}

impl VoiceAgent {
    /// Returns true when the agent can receive calls.
    #[must_use]
    pub const fn is_routable(&self) -> bool {
        self.enabled
    }
}
