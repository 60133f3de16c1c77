//! Control messages

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Worker → supervisor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Session established (or resumed)
    Ready { guild_count: usize },
    /// Periodic health report, sent on every heartbeat ack
    Stats { ping_ms: u64, guild_count: usize },
    /// Socket lost
    Disconnect,
    /// Something went wrong that the worker could not recover from itself
    Error { detail: String },
    EvalResult { id: Uuid, value: Value },
    EvalError { id: Uuid, error: String },
    /// Worker finished; 0 means a requested shutdown
    Exit { code: i32 },
}

/// Supervisor → worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SupervisorMessage {
    /// Close the connection cleanly and exit with code 0
    Shutdown,
    /// Application-defined payload, republished by the worker
    Payload { data: Value },
    /// Evaluate an introspection expression
    Eval { id: Uuid, expr: String },
}

/// A [`WorkerMessage`] tagged with its sender
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub shard_id: u32,
    /// Which incarnation of the shard sent it
    pub generation: u64,
    pub message: WorkerMessage,
}
