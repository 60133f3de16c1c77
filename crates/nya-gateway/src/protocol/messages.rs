//! Gateway frame envelope
//!
//! Every frame is a JSON object `{op, d, s, t}`.

use super::{
    HelloPayload, IdentifyPayload, OpCode, PresenceUpdate, ReadyPayload, RequestGuildMembers,
    ResumePayload,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayload {
    /// Operation code
    pub op: OpCode,

    /// Event data; `null` when the op carries none
    #[serde(default)]
    pub d: Value,

    /// Sequence number (dispatches only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event name (dispatches only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayPayload {
    fn outbound(op: OpCode, d: Value) -> Self {
        Self { op, d, s: None, t: None }
    }

    // === Client Frames ===

    /// Heartbeat (op 1) carrying the last sequence number, or `null`
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self::outbound(OpCode::Heartbeat, last_sequence.map_or(Value::Null, Value::from))
    }

    /// Identify (op 2)
    pub fn identify(payload: &IdentifyPayload) -> Result<Self, serde_json::Error> {
        Ok(Self::outbound(OpCode::Identify, serde_json::to_value(payload)?))
    }

    /// Resume (op 6)
    pub fn resume(payload: &ResumePayload) -> Result<Self, serde_json::Error> {
        Ok(Self::outbound(OpCode::Resume, serde_json::to_value(payload)?))
    }

    /// Presence Update (op 3)
    pub fn presence_update(payload: &PresenceUpdate) -> Result<Self, serde_json::Error> {
        Ok(Self::outbound(OpCode::PresenceUpdate, serde_json::to_value(payload)?))
    }

    /// Request Guild Members (op 8)
    pub fn request_guild_members(payload: &RequestGuildMembers) -> Result<Self, serde_json::Error> {
        Ok(Self::outbound(OpCode::RequestGuildMembers, serde_json::to_value(payload)?))
    }

    // === Parsing Remote Frames ===

    /// Parse the Hello payload (op 10)
    pub fn as_hello(&self) -> Option<HelloPayload> {
        if self.op != OpCode::Hello {
            return None;
        }
        serde_json::from_value(self.d.clone()).ok()
    }

    /// Whether an Invalid Session (op 9) allows resuming
    pub fn as_invalid_session(&self) -> Option<bool> {
        if self.op != OpCode::InvalidSession {
            return None;
        }
        Some(self.d.as_bool().unwrap_or(false))
    }

    /// Parse the READY dispatch
    pub fn as_ready(&self) -> Option<ReadyPayload> {
        if self.op != OpCode::Dispatch || self.t.as_deref() != Some("READY") {
            return None;
        }
        serde_json::from_value(self.d.clone()).ok()
    }

    // === Utilities ===

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayPayload(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayPayload(op={})", self.op)
        }
    }
}
