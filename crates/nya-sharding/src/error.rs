//! Sharding error types

use thiserror::Error;

/// Sharding error type
#[derive(Debug, Error)]
pub enum ShardingError {
    /// A worker could not be started
    #[error("Failed to spawn shard {shard_id}: {reason}")]
    Spawn { shard_id: u32, reason: String },

    /// No record for this shard id
    #[error("Unknown shard: {0}")]
    UnknownShard(u32),

    /// The worker's control channel is closed
    #[error("Shard {0} worker is gone")]
    WorkerGone(u32),

    /// A shard failed to answer an eval request
    #[error("Eval failed on shard {shard_id}: {message}")]
    Eval { shard_id: u32, message: String },

    /// The supervisor has been shut down and starts no more workers
    #[error("Shard supervisor is shutting down")]
    ShuttingDown,
}

/// Sharding result type
pub type ShardingResult<T> = Result<T, ShardingError>;
