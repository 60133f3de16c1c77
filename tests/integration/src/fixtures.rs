//! Test fixtures
//!
//! Canned gateway frames and client configurations.

use nya_common::{GatewayConfig, RestConfig, Token};
use nya_core::Intents;
use serde_json::{json, Value};
use std::time::Duration;

pub const TEST_TOKEN: &str = "test-token";

/// Hello (op 10)
pub fn hello(heartbeat_interval_ms: u64) -> Value {
    json!({"op": 10, "d": {"heartbeat_interval": heartbeat_interval_ms}})
}

/// Heartbeat ack (op 11)
pub fn heartbeat_ack() -> Value {
    json!({"op": 11})
}

/// Dispatch (op 0)
pub fn dispatch(event_type: &str, sequence: u64, data: Value) -> Value {
    json!({"op": 0, "t": event_type, "s": sequence, "d": data})
}

/// READY dispatch
pub fn ready(sequence: u64, session_id: &str, resume_url: &str, guild_ids: &[u64]) -> Value {
    let guilds: Vec<Value> = guild_ids
        .iter()
        .map(|id| json!({"id": id.to_string(), "unavailable": true}))
        .collect();

    dispatch(
        "READY",
        sequence,
        json!({
            "v": 10,
            "session_id": session_id,
            "resume_gateway_url": resume_url,
            "user": {"id": "1", "username": "nya"},
            "guilds": guilds
        }),
    )
}

/// Invalid session (op 9)
pub fn invalid_session(resumable: bool) -> Value {
    json!({"op": 9, "d": resumable})
}

/// Gateway config pointed at a local server with a short reconnect delay
pub fn gateway_config(url: &str) -> GatewayConfig {
    GatewayConfig::new(Token::new(TEST_TOKEN), Intents::GUILDS | Intents::GUILD_MESSAGES)
        .with_url(url)
        .with_reconnect_delay(Duration::from_millis(50))
}

/// REST config pointed at a mock server
pub fn rest_config(base_url: &str) -> RestConfig {
    RestConfig::new(Token::new(TEST_TOKEN)).with_base_url(base_url)
}
