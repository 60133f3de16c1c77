//! Shard identity and guild routing

use crate::Snowflake;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one gateway connection within a fleet
///
/// Serialized as the `[id, total]` pair the Identify payload expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct ShardInfo {
    id: u32,
    total: u32,
}

impl ShardInfo {
    /// Create shard info; `total` is clamped to at least 1
    pub const fn new(id: u32, total: u32) -> Self {
        Self {
            id,
            total: if total == 0 { 1 } else { total },
        }
    }

    /// The single-shard configuration
    pub const fn single() -> Self {
        Self::new(0, 1)
    }

    pub const fn id(&self) -> u32 {
        self.id
    }

    pub const fn total(&self) -> u32 {
        self.total
    }

    /// Whether a guild's events are delivered to this shard
    pub const fn handles_guild(&self, guild_id: Snowflake) -> bool {
        guild_id.shard_id(self.total) == self.id
    }
}

impl From<[u32; 2]> for ShardInfo {
    fn from([id, total]: [u32; 2]) -> Self {
        Self::new(id, total)
    }
}

impl From<ShardInfo> for [u32; 2] {
    fn from(info: ShardInfo) -> Self {
        [info.id, info.total]
    }
}

impl fmt::Display for ShardInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}]", self.id, self.total)
    }
}

/// Shard responsible for a guild: `(guild_id >> 22) % total_shards`
///
/// Matches the platform's own assignment bit-for-bit.
pub const fn shard_for_guild(guild_id: Snowflake, total_shards: u32) -> u32 {
    guild_id.shard_id(total_shards)
}
