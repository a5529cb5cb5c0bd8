// crates/trunkline-server/src/webhook.rs
// ============================================================================
// Module: Webhook Payloads
// Description: Carrier payload parsing for the three webhook entry points.
// Purpose: Turn form or JSON bodies into validated, typed payloads.
// Dependencies: serde, serde_json, serde_urlencoded, trunkline-core
// ============================================================================

//! ## Overview
//! The carrier posts `application/x-www-form-urlencoded` or
//! `application/json` bodies. Both decode into one raw JSON value first (the
//! verbatim copy stored on call events), then into the typed payload for the
//! entry point. Validation is fail-closed: required fields must be present
//! and non-empty, and the direction label must be one the data model knows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;
use trunkline_core::CallDirection;
use trunkline_core::Timestamp;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Payload parsing or validation failure.
///
/// # Invariants
/// - Messages name fields, never field values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// The body is neither valid JSON nor a valid form.
    #[error("body decode failed: {0}")]
    Decode(String),
    /// A required field is missing or empty.
    #[error("required field {0} is missing or empty")]
    MissingField(&'static str),
    /// A field value is outside its domain.
    #[error("field {0} is invalid")]
    InvalidField(&'static str),
}

// ============================================================================
// SECTION: Body Decoding
// ============================================================================

/// Decodes a webhook body into a JSON value by content type.
///
/// Form bodies become a flat string-valued object; JSON bodies must be an
/// object at the top level.
///
/// # Errors
///
/// Returns [`PayloadError::Decode`] when the body does not decode.
pub fn decode_body(content_type: Option<&str>, body: &[u8]) -> Result<serde_json::Value, PayloadError> {
    let is_json = content_type
        .is_some_and(|value| value.to_ascii_lowercase().contains("application/json"));
    if is_json {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|err| PayloadError::Decode(err.to_string()))?;
        if !value.is_object() {
            return Err(PayloadError::Decode("top-level JSON must be an object".to_string()));
        }
        return Ok(value);
    }
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
        .map_err(|err| PayloadError::Decode(err.to_string()))?;
    let mut object = serde_json::Map::new();
    for (key, value) in pairs {
        object.insert(key, serde_json::Value::String(value));
    }
    Ok(serde_json::Value::Object(object))
}

/// Reads a required non-empty string field from a decoded body.
fn required_str<'body>(
    body: &'body serde_json::Value,
    field: &'static str,
) -> Result<&'body str, PayloadError> {
    match body.get(field).and_then(serde_json::Value::as_str) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(PayloadError::MissingField(field)),
    }
}

/// Reads an optional string field from a decoded body.
fn optional_str(body: &serde_json::Value, field: &str) -> Option<String> {
    body.get(field)
        .and_then(serde_json::Value::as_str)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Reads a numeric field that form bodies deliver as a string.
fn lenient_u64(body: &serde_json::Value, field: &str) -> Option<u64> {
    match body.get(field) {
        Some(serde_json::Value::Number(number)) => number.as_u64(),
        Some(serde_json::Value::String(text)) => text.parse().ok(),
        _ => None,
    }
}

/// Reads a millisecond timestamp that form bodies deliver as a string.
fn lenient_millis(body: &serde_json::Value, field: &str) -> Option<i64> {
    match body.get(field) {
        Some(serde_json::Value::Number(number)) => number.as_i64(),
        Some(serde_json::Value::String(text)) => text.parse().ok(),
        _ => None,
    }
}

// ============================================================================
// SECTION: Application Request
// ============================================================================

/// Parsed initial call-setup payload.
#[derive(Debug, Clone)]
pub struct ApplicationRequestPayload {
    /// Carrier call identifier.
    pub call_sid: String,
    /// Calling party number.
    pub from: String,
    /// Called party number.
    pub to: String,
    /// Carrier direction.
    pub direction: CallDirection,
    /// Session token.
    pub session: String,
    /// Fields beyond the required set, preserved for session metadata.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ApplicationRequestPayload {
    /// Required field names, excluded from `extra`.
    const REQUIRED: [&'static str; 5] = ["CallSid", "From", "To", "Direction", "Session"];

    /// Extracts and validates the payload from a decoded body.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] on missing fields or an unknown direction.
    pub fn from_value(body: &serde_json::Value) -> Result<Self, PayloadError> {
        let call_sid = required_str(body, "CallSid")?.to_string();
        let from = required_str(body, "From")?.to_string();
        let to = required_str(body, "To")?.to_string();
        let direction = CallDirection::parse(required_str(body, "Direction")?)
            .ok_or(PayloadError::InvalidField("Direction"))?;
        let session = required_str(body, "Session")?.to_string();
        let mut extra = serde_json::Map::new();
        if let Some(object) = body.as_object() {
            for (key, value) in object {
                if !Self::REQUIRED.contains(&key.as_str()) {
                    extra.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(Self {
            call_sid,
            from,
            to,
            direction,
            session,
            extra,
        })
    }
}

// ============================================================================
// SECTION: Session Update
// ============================================================================

/// Parsed lifecycle-update payload.
#[derive(Debug, Clone)]
pub struct SessionUpdatePayload {
    /// Carrier update identifier (the event id for deduplication).
    pub id: String,
    /// Session token.
    pub token: String,
    /// Carrier domain echo.
    pub domain: String,
    /// Calling party number.
    pub caller_id: String,
    /// Called party number.
    pub destination: String,
    /// Carrier status label, unmapped.
    pub status: String,
    /// Call start time.
    pub call_start_time: Timestamp,
    /// Update time.
    pub modified_at: Timestamp,
    /// Answer time, when the call was answered.
    pub answer_time: Option<Timestamp>,
    /// Carrier direction label, when present.
    pub direction: Option<String>,
    /// Serving media server, when reported.
    pub vapp_server: Option<String>,
}

impl SessionUpdatePayload {
    /// Extracts and validates the payload from a decoded body.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] on missing fields or unparsable timestamps.
    pub fn from_value(body: &serde_json::Value) -> Result<Self, PayloadError> {
        let id = required_str(body, "id")?.to_string();
        let token = required_str(body, "token")?.to_string();
        let domain = required_str(body, "domain")?.to_string();
        let caller_id = required_str(body, "callerId")?.to_string();
        let destination = required_str(body, "destination")?.to_string();
        let status = required_str(body, "status")?.to_string();
        let call_start_time = lenient_millis(body, "callStartTime")
            .map(Timestamp::from_unix_millis)
            .ok_or(PayloadError::MissingField("callStartTime"))?;
        let modified_at = Timestamp::parse_rfc3339(required_str(body, "modifiedAt")?)
            .map_err(|_| PayloadError::InvalidField("modifiedAt"))?;
        let answer_time = lenient_millis(body, "answerTime").map(Timestamp::from_unix_millis);
        Ok(Self {
            id,
            token,
            domain,
            caller_id,
            destination,
            status,
            call_start_time,
            modified_at,
            answer_time,
            direction: optional_str(body, "direction"),
            vapp_server: optional_str(body, "vappServer"),
        })
    }
}

// ============================================================================
// SECTION: CDR Callback
// ============================================================================

/// Timing sub-object of a CDR callback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CdrSessionInfo {
    /// Session token.
    pub token: Option<String>,
    /// Call start time (milliseconds or RFC 3339).
    #[serde(rename = "callStartTime")]
    pub call_start_time: Option<serde_json::Value>,
    /// Answer time (milliseconds or RFC 3339).
    #[serde(rename = "answerTime")]
    pub answer_time: Option<serde_json::Value>,
    /// End time (milliseconds or RFC 3339).
    #[serde(rename = "endTime")]
    pub end_time: Option<serde_json::Value>,
}

/// Parsed CDR finalization payload.
#[derive(Debug, Clone)]
pub struct CdrCallbackPayload {
    /// Carrier call identifier.
    pub call_id: String,
    /// Calling party number.
    pub from: String,
    /// Called party number.
    pub to: String,
    /// Carrier domain echo.
    pub domain: String,
    /// Carrier disposition label, unmapped.
    pub disposition: String,
    /// Total call duration in seconds.
    pub duration: u64,
    /// Billable seconds, when reported separately.
    pub billsec: Option<u64>,
    /// Session timing sub-object, when present.
    pub session: CdrSessionInfo,
    /// Carrier direction label, when present.
    pub direction: Option<String>,
}

impl CdrCallbackPayload {
    /// Extracts and validates the payload from a decoded body.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] on missing fields.
    pub fn from_value(body: &serde_json::Value) -> Result<Self, PayloadError> {
        let call_id = required_str(body, "call_id")?.to_string();
        let from = required_str(body, "from")?.to_string();
        let to = required_str(body, "to")?.to_string();
        let domain = required_str(body, "domain")?.to_string();
        let disposition = required_str(body, "disposition")?.to_string();
        let duration =
            lenient_u64(body, "duration").ok_or(PayloadError::MissingField("duration"))?;
        let session = body
            .get("session")
            .cloned()
            .map(serde_json::from_value::<CdrSessionInfo>)
            .transpose()
            .map_err(|_| PayloadError::InvalidField("session"))?
            .unwrap_or_default();
        Ok(Self {
            call_id,
            from,
            to,
            domain,
            disposition,
            duration,
            billsec: lenient_u64(body, "billsec"),
            session,
            direction: optional_str(body, "direction"),
        })
    }

    /// Parses an optional carrier timing field.
    #[must_use]
    pub fn timing(value: Option<&serde_json::Value>) -> Option<Timestamp> {
        value.and_then(|value| Timestamp::parse_carrier(value).ok())
    }
}

// ============================================================================
// SECTION: Header Capture
// ============================================================================

/// Lowercases and captures the headers worth auditing on call events.
#[must_use]
pub fn capture_headers(pairs: &[(String, String)]) -> BTreeMap<String, String> {
    let mut captured = BTreeMap::new();
    for (name, value) in pairs {
        let name = name.to_ascii_lowercase();
        // The shared secret never lands in the audit trail.
        if name == crate::auth::API_KEY_HEADER {
            continue;
        }
        captured.insert(name, value.clone());
    }
    captured
}
