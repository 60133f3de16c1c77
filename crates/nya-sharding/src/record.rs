//! Per-shard bookkeeping held by the supervisor

use crate::spawner::WorkerTask;
use crate::protocol::SupervisorMessage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;

/// Shard lifecycle as seen by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardStatus {
    Spawning,
    Ready,
    Disconnected,
    Dead,
}

impl fmt::Display for ShardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Spawning => "spawning",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
            Self::Dead => "dead",
        })
    }
}

/// Supervisor-side view of one worker
#[derive(Debug)]
pub struct ShardRecord {
    pub id: u32,
    pub status: ShardStatus,
    pub ready: bool,
    pub guild_count: usize,
    pub ping_ms: Option<u64>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub generation: u64,
    pub(crate) control: mpsc::UnboundedSender<SupervisorMessage>,
    pub(crate) task: WorkerTask,
}

impl ShardRecord {
    pub(crate) fn new(
        id: u32,
        generation: u64,
        control: mpsc::UnboundedSender<SupervisorMessage>,
        task: WorkerTask,
    ) -> Self {
        Self {
            id,
            status: ShardStatus::Spawning,
            ready: false,
            guild_count: 0,
            ping_ms: None,
            last_heartbeat_at: None,
            generation,
            control,
            task,
        }
    }

    /// Queue a message for the worker; false if it is gone
    pub(crate) fn send(&self, message: SupervisorMessage) -> bool {
        self.control.send(message).is_ok()
    }

    pub fn stats(&self) -> ShardStats {
        ShardStats {
            id: self.id,
            status: self.status,
            ready: self.ready,
            guild_count: self.guild_count,
            ping_ms: self.ping_ms,
            last_heartbeat_at: self.last_heartbeat_at,
        }
    }
}

/// Snapshot of one shard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShardStats {
    pub id: u32,
    pub status: ShardStatus,
    pub ready: bool,
    pub guild_count: usize,
    pub ping_ms: Option<u64>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

/// Fleet-wide aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupervisorStats {
    pub total_shards: u32,
    pub ready_shards: usize,
    pub total_guilds: usize,
    /// Mean ping over ready shards that have reported one, rounded
    pub average_ping: Option<u64>,
    pub shards: Vec<ShardStats>,
}

impl SupervisorStats {
    pub fn from_shards(total_shards: u32, mut shards: Vec<ShardStats>) -> Self {
        shards.sort_by_key(|s| s.id);

        let ready: Vec<&ShardStats> = shards.iter().filter(|s| s.ready).collect();
        let pings: Vec<u64> = ready.iter().filter_map(|s| s.ping_ms).collect();
        let average_ping = if pings.is_empty() {
            None
        } else {
            let sum: u64 = pings.iter().sum();
            Some((sum as f64 / pings.len() as f64).round() as u64)
        };

        Self {
            total_shards,
            ready_shards: ready.len(),
            total_guilds: shards.iter().map(|s| s.guild_count).sum(),
            average_ping,
            shards,
        }
    }
}
