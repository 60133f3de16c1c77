//! Introspection expressions a worker can answer

use std::fmt;
use std::str::FromStr;

/// Supported `broadcast_eval` expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalExpr {
    ShardId,
    ShardTotal,
    /// Number of guilds served
    Guilds,
    /// Last heartbeat round trip in milliseconds
    Ping,
    /// Milliseconds since the worker started
    Uptime,
    /// Last gateway sequence number
    Sequence,
    /// Connection state name
    Status,
}

impl EvalExpr {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShardId => "shard.id",
            Self::ShardTotal => "shard.total",
            Self::Guilds => "guilds",
            Self::Ping => "ping",
            Self::Uptime => "uptime",
            Self::Sequence => "sequence",
            Self::Status => "status",
        }
    }
}

impl FromStr for EvalExpr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "shard.id" => Ok(Self::ShardId),
            "shard.total" => Ok(Self::ShardTotal),
            "guilds" => Ok(Self::Guilds),
            "ping" => Ok(Self::Ping),
            "uptime" => Ok(Self::Uptime),
            "sequence" => Ok(Self::Sequence),
            "status" => Ok(Self::Status),
            other => Err(format!("Unsupported expression: {other}")),
        }
    }
}

impl fmt::Display for EvalExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
