//! Wire envelope (JSON text frames).
//!
//! Every frame is `{ "type": ..., "data": {...}, "timestamp": <epoch ms> }`.
//! The `type`/`data` pair is a tagged union: payloads are validated against
//! their per-type schema at the deserialization boundary, so a frame that
//! parses is fully typed before it reaches any dispatch logic.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// One unit in transit between a client and the relay. Immutable once
/// constructed; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub payload: EventPayload,
    /// Creation instant, integer epoch milliseconds.
    pub timestamp: i64,
}

impl Envelope {
    pub fn new(payload: EventPayload, timestamp: i64) -> Self {
        Self { payload, timestamp }
    }

    /// Build an envelope stamped with the current instant.
    pub fn now(payload: EventPayload) -> Self {
        Self {
            payload,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Type-specific payload, discriminated by the wire `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    Message(MessageData),
    UserOnline(PresenceData),
    UserOffline(PresenceData),
    Typing(TypingData),
    CallRequest(CallRequestData),
    CallResponse(CallResponseData),
}

impl EventPayload {
    /// Wire name of the discriminant, for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::Message(_) => "message",
            EventPayload::UserOnline(_) => "user_online",
            EventPayload::UserOffline(_) => "user_offline",
            EventPayload::Typing(_) => "typing",
            EventPayload::CallRequest(_) => "call_request",
            EventPayload::CallResponse(_) => "call_response",
        }
    }
}

/// Chat message relayed between conversation participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MessageData {
    pub conversation_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub sender_id: String,
}

/// Presence announcement (`user_online` / `user_offline`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PresenceData {
    pub user_id: String,
}

/// Typing indicator for a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TypingData {
    pub conversation_id: i64,
    pub is_typing: bool,
    pub user_id: String,
}

/// Call signaling: invitation, routed to exactly one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CallRequestData {
    pub target_user_id: String,
    pub call_type: CallType,
    pub caller_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Voice,
    Video,
}

/// Call signaling: accept/decline answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CallResponseData {
    pub call_id: String,
    pub accept: bool,
    pub user_id: String,
}

/// Parse a text frame into an envelope. Schema mismatches (unknown `type`,
/// missing or extra `data` fields) are rejected here, before dispatch.
pub fn decode(text: &str) -> Result<Envelope> {
    serde_json::from_str(text).map_err(|e| RelayError::Malformed(e.to_string()))
}

/// Serialize an envelope for the wire.
pub fn encode(env: &Envelope) -> Result<String> {
    serde_json::to_string(env).map_err(|e| RelayError::Internal(format!("json encode failed: {e}")))
}
