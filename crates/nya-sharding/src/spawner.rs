//! Worker spawning
//!
//! [`WorkerSpawner`] is the seam between the supervisor and whatever actually runs a
//! shard. The gateway spawner runs a [`ShardWorker`] either as a task on the current
//! runtime or on its own OS thread with a private runtime.

use crate::error::{ShardingError, ShardingResult};
use crate::events::ShardEvent;
use crate::protocol::{SupervisorMessage, WorkerMessage, WorkerReport};
use crate::worker::ShardWorker;
use nya_common::{GatewayConfig, ShardingMode};
use nya_core::ShardInfo;
use nya_gateway::EventBus;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything a new worker is given
#[derive(Debug)]
pub struct WorkerContext {
    pub shard: ShardInfo,
    pub generation: u64,
    pub control: mpsc::UnboundedReceiver<SupervisorMessage>,
    pub reporter: WorkerReporter,
}

/// Sending half of the worker → supervisor channel, stamped with the worker's identity
#[derive(Debug, Clone)]
pub struct WorkerReporter {
    shard_id: u32,
    generation: u64,
    tx: mpsc::UnboundedSender<WorkerReport>,
}

impl WorkerReporter {
    pub fn new(shard_id: u32, generation: u64, tx: mpsc::UnboundedSender<WorkerReport>) -> Self {
        Self {
            shard_id,
            generation,
            tx,
        }
    }

    pub fn shard_id(&self) -> u32 {
        self.shard_id
    }

    /// Send a report; false once the supervisor is gone
    pub fn report(&self, message: WorkerMessage) -> bool {
        self.tx
            .send(WorkerReport {
                shard_id: self.shard_id,
                generation: self.generation,
                message,
            })
            .is_ok()
    }
}

/// How to stop a worker that ignored `shutdown`
#[derive(Debug)]
pub enum WorkerTask {
    /// Task on the supervisor's runtime; can be aborted
    Task(tokio::task::AbortHandle),
    /// OS thread; can only be detached
    Thread(std::thread::JoinHandle<()>),
    /// Not owned by the supervisor
    Detached,
}

impl WorkerTask {
    /// Stop the worker without its cooperation
    pub fn force_stop(self, shard_id: u32) {
        match self {
            Self::Task(abort) => {
                tracing::warn!(shard_id, "Aborting shard worker task");
                abort.abort();
            }
            Self::Thread(thread) => {
                if !thread.is_finished() {
                    // Threads cannot be killed; it exits on its own once its socket drops
                    tracing::warn!(shard_id, "Detaching unresponsive shard worker thread");
                }
            }
            Self::Detached => {}
        }
    }
}

/// Starts shard workers
pub trait WorkerSpawner: Send + Sync + 'static {
    /// Start a worker for `ctx.shard`
    ///
    /// The worker must report `WorkerMessage::Exit` through `ctx.reporter` when it ends.
    fn spawn(&self, ctx: WorkerContext) -> ShardingResult<WorkerTask>;
}

/// Spawns [`ShardWorker`]s connected to the real gateway
#[derive(Debug, Clone)]
pub struct GatewayWorkerSpawner {
    config: Arc<GatewayConfig>,
    mode: ShardingMode,
    events: EventBus<ShardEvent>,
}

impl GatewayWorkerSpawner {
    pub fn new(config: GatewayConfig, mode: ShardingMode, events: EventBus<ShardEvent>) -> Self {
        Self {
            config: Arc::new(config),
            mode,
            events,
        }
    }

    fn spawn_task(&self, worker: ShardWorker, ctx: WorkerContext) -> ShardingResult<WorkerTask> {
        let shard_id = ctx.shard.id();
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| ShardingError::Spawn {
            shard_id,
            reason: e.to_string(),
        })?;

        let reporter = ctx.reporter.clone();
        let task = runtime.spawn(worker.run(ctx));
        let abort = task.abort_handle();

        runtime.spawn(async move {
            let code = match task.await {
                Ok(code) => code,
                // Forced stop; the supervisor already dropped this worker
                Err(e) if e.is_cancelled() => return,
                Err(e) => {
                    tracing::error!(shard_id, error = %e, "Shard worker panicked");
                    1
                }
            };
            reporter.report(WorkerMessage::Exit { code });
        });

        Ok(WorkerTask::Task(abort))
    }

    fn spawn_thread(&self, worker: ShardWorker, ctx: WorkerContext) -> ShardingResult<WorkerTask> {
        let shard_id = ctx.shard.id();
        let reporter = ctx.reporter.clone();

        let thread = std::thread::Builder::new()
            .name(format!("shard-{shard_id}"))
            .spawn(move || {
                let code = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => {
                        std::panic::catch_unwind(AssertUnwindSafe(|| runtime.block_on(worker.run(ctx))))
                            .unwrap_or_else(|_| {
                                tracing::error!(shard_id, "Shard worker panicked");
                                1
                            })
                    }
                    Err(e) => {
                        tracing::error!(shard_id, error = %e, "Failed to build worker runtime");
                        1
                    }
                };
                reporter.report(WorkerMessage::Exit { code });
            })
            .map_err(|e| ShardingError::Spawn {
                shard_id,
                reason: e.to_string(),
            })?;

        Ok(WorkerTask::Thread(thread))
    }
}

impl WorkerSpawner for GatewayWorkerSpawner {
    fn spawn(&self, ctx: WorkerContext) -> ShardingResult<WorkerTask> {
        let worker = ShardWorker::new(Arc::clone(&self.config), self.events.clone());

        tracing::debug!(shard = %ctx.shard, generation = ctx.generation, mode = ?self.mode, "Spawning shard worker");

        match self.mode {
            ShardingMode::Process => self.spawn_task(worker, ctx),
            ShardingMode::Worker => self.spawn_thread(worker, ctx),
        }
    }
}
