//! Shard supervisor
//!
//! Owns the fleet: decides the shard count, creates workers one at a time, tracks what
//! they report and respawns the ones that crash.

use crate::error::{ShardingError, ShardingResult};
use crate::events::SupervisorEvent;
use crate::protocol::{SupervisorMessage, WorkerMessage, WorkerReport};
use crate::record::{ShardRecord, ShardStatus, SupervisorStats};
use crate::spawner::{WorkerContext, WorkerReporter, WorkerSpawner, WorkerTask};
use chrono::Utc;
use dashmap::DashMap;
use nya_common::{ShardCount, ShardingConfig};
use nya_core::{shard_for_guild, ShardInfo, Snowflake};
use nya_gateway::EventBus;
use nya_rest::RestClient;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How long `broadcast_eval` waits for every shard to answer
const EVAL_TIMEOUT: Duration = Duration::from_secs(10);

type EvalReply = (u32, Result<Value, String>);

/// Supervises every shard worker
///
/// Cheap to clone; clones share the same fleet.
#[derive(Clone)]
pub struct ShardSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    config: ShardingConfig,
    rest: RestClient,
    spawner: Box<dyn WorkerSpawner>,
    records: DashMap<u32, ShardRecord>,
    /// Replaced workers by generation, until they exit or are forced down
    retiring: DashMap<u64, (u32, WorkerTask)>,
    total_shards: AtomicU32,
    generation: AtomicU64,
    ready: AtomicBool,
    shutting_down: AtomicBool,
    events: EventBus<SupervisorEvent>,
    reports_tx: mpsc::UnboundedSender<WorkerReport>,
    reports_rx: Mutex<Option<mpsc::UnboundedReceiver<WorkerReport>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    pending_evals: DashMap<Uuid, mpsc::UnboundedSender<EvalReply>>,
    exited: Notify,
}

impl ShardSupervisor {
    pub fn new(config: ShardingConfig, rest: RestClient, spawner: impl WorkerSpawner) -> Self {
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(Inner {
                config,
                rest,
                spawner: Box::new(spawner),
                records: DashMap::new(),
                retiring: DashMap::new(),
                total_shards: AtomicU32::new(0),
                generation: AtomicU64::new(0),
                ready: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                events: EventBus::new(),
                reports_tx,
                reports_rx: Mutex::new(Some(reports_rx)),
                monitor: Mutex::new(None),
                pending_evals: DashMap::new(),
                exited: Notify::new(),
            }),
        }
    }

    // === Accessors ===

    /// Fleet lifecycle events
    pub fn events(&self) -> &EventBus<SupervisorEvent> {
        &self.inner.events
    }

    pub fn total_shards(&self) -> u32 {
        self.inner.total_shards.load(Ordering::Acquire)
    }

    /// Whether every shard has been created
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    pub fn status(&self, shard_id: u32) -> Option<ShardStatus> {
        self.inner.records.get(&shard_id).map(|r| r.status)
    }

    pub fn shard_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.inner.records.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Shard serving `guild_id` under the current shard count
    pub fn get_shard_for_guild(&self, guild_id: Snowflake) -> u32 {
        shard_for_guild(guild_id, self.total_shards())
    }

    // === Lifecycle ===

    /// Create the whole fleet
    ///
    /// Shards are created in ascending order with the configured stagger between them;
    /// the remote limits how many identifies may run at once. Returns the shard count.
    pub async fn spawn(&self) -> ShardingResult<u32> {
        self.ensure_monitor();

        let total = self.resolve_shard_count().await;
        self.inner.total_shards.store(total, Ordering::Release);

        tracing::info!(total_shards = total, "Spawning shards");

        for id in 0..total {
            if id > 0 {
                tokio::time::sleep(self.inner.config.spawn_delay).await;
            }
            if self.inner.shutting_down.load(Ordering::Acquire) {
                tracing::info!("Shutdown requested, stopping spawn");
                return Ok(total);
            }
            self.create_shard(id)?;
        }

        self.inner.ready.store(true, Ordering::Release);
        self.inner.events.publish(SupervisorEvent::AllReady { total_shards: total });
        tracing::info!(total_shards = total, "All shards spawned");

        Ok(total)
    }

    /// Replace a shard's worker with a fresh one
    ///
    /// Nothing carries over, so the new worker identifies from scratch. The old worker
    /// is asked to shut down and forced down if it has not exited within the grace period.
    pub fn respawn_shard(&self, shard_id: u32) -> ShardingResult<()> {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            return Err(ShardingError::ShuttingDown);
        }
        if shard_id >= self.total_shards() {
            return Err(ShardingError::UnknownShard(shard_id));
        }
        self.ensure_monitor();
        self.create_shard(shard_id)
    }

    /// Respawn every shard in order, with the usual stagger
    pub async fn respawn_all(&self) -> ShardingResult<()> {
        let total = self.total_shards();
        tracing::info!(total_shards = total, "Respawning all shards");

        for id in 0..total {
            if id > 0 {
                tokio::time::sleep(self.inner.config.spawn_delay).await;
            }
            self.respawn_shard(id)?;
        }
        Ok(())
    }

    /// Stop every worker
    ///
    /// Workers get `shutdown` and the grace period to close their sockets; any still
    /// running after that are forced down. The supervisor cannot be spawned again.
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::Release);
        self.inner.ready.store(false, Ordering::Release);

        tracing::info!(shards = self.inner.records.len(), "Shutting down shards");

        for record in &self.inner.records {
            record.send(SupervisorMessage::Shutdown);
        }

        let grace = self.inner.config.shutdown_grace;
        if tokio::time::timeout(grace, self.wait_for_exits()).await.is_err() {
            tracing::warn!(grace_ms = grace.as_millis() as u64, "Shards did not exit in time");
        }

        let ids = self.shard_ids();
        for id in ids {
            if let Some((_, record)) = self.inner.records.remove(&id) {
                if record.status != ShardStatus::Dead {
                    record.task.force_stop(id);
                }
            }
        }

        let retired: Vec<u64> = self.inner.retiring.iter().map(|r| *r.key()).collect();
        for generation in retired {
            if let Some((_, (shard_id, task))) = self.inner.retiring.remove(&generation) {
                task.force_stop(shard_id);
            }
        }

        if let Some(monitor) = self.inner.monitor.lock().take() {
            monitor.abort();
        }
        self.inner.pending_evals.clear();

        tracing::info!("All shards stopped");
    }

    /// Alias of [`shutdown`](Self::shutdown)
    pub async fn destroy(&self) {
        self.shutdown().await;
    }

    // === Messaging ===

    /// Deliver a payload to every shard
    pub fn broadcast(&self, payload: Value) {
        for record in &self.inner.records {
            if !record.send(SupervisorMessage::Payload {
                data: payload.clone(),
            }) {
                tracing::warn!(shard_id = record.id, "Broadcast to a gone worker");
            }
        }
    }

    /// Deliver a payload to one shard
    pub fn send(&self, shard_id: u32, payload: Value) -> ShardingResult<()> {
        let record = self
            .inner
            .records
            .get(&shard_id)
            .ok_or(ShardingError::UnknownShard(shard_id))?;

        if record.send(SupervisorMessage::Payload { data: payload }) {
            Ok(())
        } else {
            Err(ShardingError::WorkerGone(shard_id))
        }
    }

    /// Evaluate an introspection expression on every shard
    ///
    /// Results are ordered by shard id. Fails on the first shard that errors or does not
    /// answer in time.
    pub async fn broadcast_eval(&self, expr: &str) -> ShardingResult<Vec<Value>> {
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.inner.pending_evals.insert(id, tx);

        let mut expected = Vec::new();
        for record in &self.inner.records {
            if record.send(SupervisorMessage::Eval {
                id,
                expr: expr.to_string(),
            }) {
                expected.push(record.id);
            }
        }

        let mut results = BTreeMap::new();
        let collected = tokio::time::timeout(EVAL_TIMEOUT, async {
            while results.len() < expected.len() {
                match rx.recv().await {
                    Some((shard_id, Ok(value))) => {
                        results.insert(shard_id, value);
                    }
                    Some((shard_id, Err(message))) => {
                        return Err(ShardingError::Eval { shard_id, message });
                    }
                    None => break,
                }
            }
            Ok(())
        })
        .await;

        self.inner.pending_evals.remove(&id);

        match collected {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {}
        }

        if let Some(missing) = expected.iter().find(|shard_id| !results.contains_key(*shard_id)) {
            return Err(ShardingError::Eval {
                shard_id: *missing,
                message: "no answer".to_string(),
            });
        }

        Ok(results.into_values().collect())
    }

    /// Aggregate health of the fleet
    pub fn stats(&self) -> SupervisorStats {
        let shards = self.inner.records.iter().map(|r| r.stats()).collect();
        SupervisorStats::from_shards(self.total_shards(), shards)
    }

    // === Internals ===

    async fn resolve_shard_count(&self) -> u32 {
        match self.inner.config.total_shards {
            ShardCount::Fixed(n) => n,
            ShardCount::Auto => match self.inner.rest.get_gateway_bot().await {
                Ok(info) => {
                    tracing::info!(recommended = info.shards, "Using recommended shard count");
                    info.shards.max(1)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to fetch recommended shard count, using 1");
                    1
                }
            },
        }
    }

    fn create_shard(&self, shard_id: u32) -> ShardingResult<()> {
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let ctx = WorkerContext {
            shard: ShardInfo::new(shard_id, self.total_shards()),
            generation,
            control: control_rx,
            reporter: WorkerReporter::new(shard_id, generation, self.inner.reports_tx.clone()),
        };

        if let Some((_, old)) = self.inner.records.remove(&shard_id) {
            self.retire(old);
        }

        let task = self.inner.spawner.spawn(ctx)?;
        self.inner
            .records
            .insert(shard_id, ShardRecord::new(shard_id, generation, control_tx, task));

        tracing::info!(shard_id, generation, "Shard spawned");
        self.inner.events.publish(SupervisorEvent::ShardSpawn { shard_id });
        Ok(())
    }

    fn ensure_monitor(&self) {
        let Some(mut reports) = self.inner.reports_rx.lock().take() else {
            return;
        };

        let supervisor = self.clone();
        let monitor = tokio::spawn(async move {
            while let Some(report) = reports.recv().await {
                supervisor.on_report(report);
            }
        });
        *self.inner.monitor.lock() = Some(monitor);
    }

    /// Ask a replaced worker to stop and force it down after the grace period
    fn retire(&self, record: ShardRecord) {
        let ShardRecord {
            id: shard_id,
            generation,
            status,
            control,
            task,
            ..
        } = record;

        if status == ShardStatus::Dead {
            return;
        }

        tracing::info!(shard_id, generation, "Terminating shard worker");
        let _ = control.send(SupervisorMessage::Shutdown);
        self.inner.retiring.insert(generation, (shard_id, task));

        let supervisor = self.clone();
        let grace = self.inner.config.shutdown_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some((_, (shard_id, task))) = supervisor.inner.retiring.remove(&generation) {
                tracing::warn!(shard_id, generation, "Replaced worker did not exit in time");
                task.force_stop(shard_id);
            }
        });
    }

    async fn wait_for_exits(&self) {
        loop {
            let notified = self.inner.exited.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.retiring.is_empty()
                && self
                    .inner
                    .records
                    .iter()
                    .all(|r| r.status == ShardStatus::Dead)
            {
                return;
            }
            notified.await;
        }
    }

    fn on_report(&self, report: WorkerReport) {
        let WorkerReport {
            shard_id,
            generation,
            message,
        } = report;

        // Eval answers are matched by request id, not by worker
        match message {
            WorkerMessage::EvalResult { id, value } => {
                if let Some(tx) = self.inner.pending_evals.get(&id) {
                    let _ = tx.send((shard_id, Ok(value)));
                }
                return;
            }
            WorkerMessage::EvalError { id, error } => {
                if let Some(tx) = self.inner.pending_evals.get(&id) {
                    let _ = tx.send((shard_id, Err(error)));
                }
                return;
            }
            _ => {}
        }

        if let WorkerMessage::Exit { code } = message {
            if self.inner.retiring.remove(&generation).is_some() {
                tracing::debug!(shard_id, generation, code, "Replaced worker exited");
                self.inner.exited.notify_waiters();
                return;
            }
        }

        let event = {
            let Some(mut record) = self.inner.records.get_mut(&shard_id) else {
                tracing::debug!(shard_id, generation, "Report from an unknown shard");
                return;
            };
            if record.generation != generation {
                tracing::debug!(
                    shard_id,
                    generation,
                    current = record.generation,
                    "Ignoring report from a replaced worker"
                );
                return;
            }

            match message {
                WorkerMessage::Ready { guild_count } => {
                    record.status = ShardStatus::Ready;
                    record.ready = true;
                    record.guild_count = guild_count;
                    tracing::info!(shard_id, guild_count, "Shard ready");
                    SupervisorEvent::ShardReady {
                        shard_id,
                        guild_count,
                    }
                }
                WorkerMessage::Stats {
                    ping_ms,
                    guild_count,
                } => {
                    record.ping_ms = Some(ping_ms);
                    record.guild_count = guild_count;
                    record.last_heartbeat_at = Some(Utc::now());
                    return;
                }
                WorkerMessage::Disconnect => {
                    record.status = ShardStatus::Disconnected;
                    record.ready = false;
                    tracing::warn!(shard_id, "Shard disconnected");
                    SupervisorEvent::ShardDisconnect { shard_id }
                }
                WorkerMessage::Error { detail } => {
                    tracing::error!(shard_id, detail = %detail, "Shard error");
                    SupervisorEvent::ShardError { shard_id, detail }
                }
                WorkerMessage::Exit { code } => {
                    record.status = ShardStatus::Dead;
                    record.ready = false;
                    if code == 0 {
                        tracing::info!(shard_id, "Shard exited");
                    } else {
                        tracing::error!(shard_id, code, "Shard died");
                    }
                    SupervisorEvent::ShardDeath { shard_id, code }
                }
                WorkerMessage::EvalResult { .. } | WorkerMessage::EvalError { .. } => return,
            }
        };

        if let SupervisorEvent::ShardDeath { code, .. } = event {
            self.inner.exited.notify_waiters();
            self.schedule_respawn(shard_id, generation, code);
        }

        self.inner.events.publish(event);
    }

    /// Respawn a crashed shard after the fixed delay
    fn schedule_respawn(&self, shard_id: u32, generation: u64, code: i32) {
        let policy = self.inner.config.respawn;
        if !policy.enabled || code == 0 || self.inner.shutting_down.load(Ordering::Acquire) {
            return;
        }

        tracing::info!(
            shard_id,
            delay_ms = policy.delay.as_millis() as u64,
            "Scheduling shard respawn"
        );

        let supervisor = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(policy.delay).await;

            if supervisor.inner.shutting_down.load(Ordering::Acquire) {
                return;
            }
            // Someone else already replaced it
            let current = supervisor.inner.records.get(&shard_id).map(|r| r.generation);
            if current != Some(generation) {
                return;
            }
            if let Err(e) = supervisor.respawn_shard(shard_id) {
                tracing::error!(shard_id, error = %e, "Failed to respawn shard");
            }
        });
    }
}

impl std::fmt::Debug for ShardSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardSupervisor")
            .field("total_shards", &self.total_shards())
            .field("shards", &self.inner.records.len())
            .field("ready", &self.is_ready())
            .finish()
    }
}
