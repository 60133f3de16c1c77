//! Events published by the sharding layer

use nya_gateway::GatewayEvent;
use serde_json::Value;

/// Fleet lifecycle, published by the [`ShardSupervisor`](crate::ShardSupervisor)
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    ShardSpawn { shard_id: u32 },
    ShardReady { shard_id: u32, guild_count: usize },
    ShardDisconnect { shard_id: u32 },
    ShardError { shard_id: u32, detail: String },
    ShardDeath { shard_id: u32, code: i32 },
    /// Every shard has been created
    AllReady { total_shards: u32 },
}

impl SupervisorEvent {
    pub fn shard_id(&self) -> Option<u32> {
        match self {
            Self::ShardSpawn { shard_id }
            | Self::ShardReady { shard_id, .. }
            | Self::ShardDisconnect { shard_id }
            | Self::ShardError { shard_id, .. }
            | Self::ShardDeath { shard_id, .. } => Some(*shard_id),
            Self::AllReady { .. } => None,
        }
    }
}

/// Application event from one shard
#[derive(Debug, Clone)]
pub struct ShardEvent {
    pub shard_id: u32,
    pub kind: ShardEventKind,
}

#[derive(Debug, Clone)]
pub enum ShardEventKind {
    /// Republished gateway event
    Gateway(GatewayEvent),
    /// Payload sent through the supervisor with `broadcast` or `send`
    Payload(Value),
}
