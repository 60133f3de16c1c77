//! Shard worker
//!
//! Runs one [`ConnectionSupervisor`] and bridges it to the supervisor's control channel.

use crate::events::{ShardEvent, ShardEventKind};
use crate::protocol::{EvalExpr, SupervisorMessage, WorkerMessage};
use crate::spawner::{WorkerContext, WorkerReporter};
use nya_common::GatewayConfig;
use nya_core::{ShardInfo, Snowflake};
use nya_gateway::{
    ConnectionSupervisor, DispatchEvent, EventBus, EventType, GatewayEvent, SessionSnapshot,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

/// One shard's worker
pub struct ShardWorker {
    config: Arc<GatewayConfig>,
    events: EventBus<ShardEvent>,
}

impl ShardWorker {
    pub fn new(config: Arc<GatewayConfig>, events: EventBus<ShardEvent>) -> Self {
        Self { config, events }
    }

    /// Run until told to shut down; returns the exit code
    ///
    /// A fatal close is reported and the worker then idles until shutdown, so the shard
    /// is not respawned into the same failure.
    pub async fn run(self, ctx: WorkerContext) -> i32 {
        let WorkerContext {
            shard,
            mut control,
            reporter,
            ..
        } = ctx;

        let gateway_events = EventBus::new();
        let mut gateway_rx = gateway_events.subscribe();
        let (connection, handle) =
            ConnectionSupervisor::new(self.config, shard, gateway_events.clone());
        let connection = connection.run();
        tokio::pin!(connection);

        let mut state = WorkerState::new(shard, self.events);
        let mut connection_live = true;

        tracing::info!(shard = %shard, "Shard worker started");

        loop {
            tokio::select! {
                result = &mut connection, if connection_live => {
                    connection_live = false;
                    match result {
                        Ok(()) => break,
                        Err(e) => {
                            tracing::error!(shard = %shard, error = %e, "Shard connection failed permanently");
                            reporter.report(WorkerMessage::Error { detail: e.to_string() });
                        }
                    }
                }
                event = gateway_rx.recv() => match event {
                    Ok(event) => state.on_gateway_event(event, &reporter),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(shard = %shard, skipped, "Worker fell behind gateway events");
                    }
                    // The worker holds a sender, so the bus never closes
                    Err(RecvError::Closed) => {}
                },
                message = control.recv() => match message {
                    Some(SupervisorMessage::Shutdown) | None => {
                        tracing::info!(shard = %shard, "Shard worker shutting down");
                        handle.shutdown();
                        if connection_live {
                            if let Err(e) = (&mut connection).await {
                                tracing::debug!(shard = %shard, error = %e, "Connection ended with error during shutdown");
                            }
                        }
                        break;
                    }
                    Some(SupervisorMessage::Payload { data }) => state.on_payload(data),
                    Some(SupervisorMessage::Eval { id, expr }) => {
                        let message = match state.eval(&expr, &handle.snapshot()) {
                            Ok(value) => WorkerMessage::EvalResult { id, value },
                            Err(error) => WorkerMessage::EvalError { id, error },
                        };
                        reporter.report(message);
                    }
                },
            }
        }

        tracing::info!(shard = %shard, "Shard worker stopped");
        0
    }
}

/// What a worker knows about its own shard
struct WorkerState {
    shard: ShardInfo,
    events: EventBus<ShardEvent>,
    guilds: HashSet<Snowflake>,
    ping: Option<Duration>,
    started: Instant,
}

impl WorkerState {
    fn new(shard: ShardInfo, events: EventBus<ShardEvent>) -> Self {
        Self {
            shard,
            events,
            guilds: HashSet::new(),
            ping: None,
            started: Instant::now(),
        }
    }

    fn on_gateway_event(&mut self, event: GatewayEvent, reporter: &WorkerReporter) {
        match &event {
            GatewayEvent::Ready { guilds, .. } => {
                self.guilds = guilds.iter().copied().collect();
                reporter.report(WorkerMessage::Ready {
                    guild_count: self.guilds.len(),
                });
            }
            GatewayEvent::Resumed => {
                reporter.report(WorkerMessage::Ready {
                    guild_count: self.guilds.len(),
                });
            }
            GatewayEvent::Dispatch(dispatch) => self.track_guilds(dispatch),
            GatewayEvent::HeartbeatAck { latency } => {
                self.ping = Some(*latency);
                reporter.report(WorkerMessage::Stats {
                    ping_ms: latency.as_millis() as u64,
                    guild_count: self.guilds.len(),
                });
            }
            GatewayEvent::Disconnected { .. } => {
                reporter.report(WorkerMessage::Disconnect);
            }
            GatewayEvent::Connected | GatewayEvent::InvalidSession { .. } => {}
        }

        self.events.publish(ShardEvent {
            shard_id: self.shard.id(),
            kind: ShardEventKind::Gateway(event),
        });
    }

    fn track_guilds(&mut self, dispatch: &DispatchEvent) {
        let Some(kind) = dispatch.kind().filter(|k| k.affects_guild_set()) else {
            return;
        };
        let Some(guild_id) = dispatch
            .data
            .get("id")
            .and_then(|id| Snowflake::deserialize(id).ok())
        else {
            return;
        };

        if kind == EventType::GuildCreate {
            self.guilds.insert(guild_id);
        } else if !dispatch.data["unavailable"].as_bool().unwrap_or(false) {
            // An unavailable guild is an outage, not a removal
            self.guilds.remove(&guild_id);
        }
    }

    fn on_payload(&self, data: Value) {
        self.events.publish(ShardEvent {
            shard_id: self.shard.id(),
            kind: ShardEventKind::Payload(data),
        });
    }

    fn eval(&self, expr: &str, snapshot: &SessionSnapshot) -> Result<Value, String> {
        let value = match expr.parse::<EvalExpr>()? {
            EvalExpr::ShardId => json!(self.shard.id()),
            EvalExpr::ShardTotal => json!(self.shard.total()),
            EvalExpr::Guilds => json!(self.guilds.len()),
            EvalExpr::Ping => json!(self.ping.map(|p| p.as_millis() as u64)),
            EvalExpr::Uptime => json!(self.started.elapsed().as_millis() as u64),
            EvalExpr::Sequence => json!(snapshot.sequence),
            EvalExpr::Status => json!(snapshot.state.as_str()),
        };
        Ok(value)
    }
}
