//! # nya-sharding
//!
//! Runs a fleet of gateway connections. The [`ShardSupervisor`] creates one worker per
//! shard, staggers their identifies, collects their reports over a message channel and
//! respawns the ones that crash. Workers share nothing with each other or with the
//! supervisor beyond that channel.

pub mod error;
pub mod events;
pub mod protocol;
pub mod record;
pub mod spawner;
pub mod supervisor;
pub mod worker;

pub use error::{ShardingError, ShardingResult};
pub use events::{ShardEvent, ShardEventKind, SupervisorEvent};
pub use protocol::{EvalExpr, SupervisorMessage, WorkerMessage, WorkerReport};
pub use record::{ShardRecord, ShardStats, ShardStatus, SupervisorStats};
pub use spawner::{GatewayWorkerSpawner, WorkerContext, WorkerReporter, WorkerSpawner, WorkerTask};
pub use supervisor::ShardSupervisor;
pub use worker::ShardWorker;

pub use nya_core::shard_for_guild;
