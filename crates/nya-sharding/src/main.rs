//! nya-bot entry point
//!
//! Run with:
//! ```bash
//! BOT_TOKEN=... cargo run -p nya-sharding --bin nya-bot
//! ```
//!
//! Configuration is loaded from environment variables.

use nya_common::{try_init_tracing_with_config, BotConfig, Environment, TracingConfig};
use nya_gateway::{EventBus, GatewayEvent};
use nya_rest::RestClient;
use nya_sharding::{
    GatewayWorkerSpawner, ShardEvent, ShardEventKind, ShardSupervisor, SupervisorEvent,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let env = std::env::var("APP_ENV")
        .ok()
        .and_then(|s| s.parse::<Environment>().ok())
        .unwrap_or_default();

    // Initialize tracing
    if let Err(e) = try_init_tracing_with_config(&TracingConfig::for_environment(env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run().await {
        error!(error = %e, "Bot failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting nya-bot...");

    // Load configuration
    let config = BotConfig::from_env().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        env = ?config.app.env,
        shards = ?config.sharding.total_shards,
        mode = ?config.sharding.mode,
        intents = config.gateway.intents.bits(),
        "Configuration loaded"
    );

    let rest = RestClient::new(config.rest.clone())?;

    let app_events: EventBus<ShardEvent> = EventBus::new();
    let spawner =
        GatewayWorkerSpawner::new(config.gateway.clone(), config.sharding.mode, app_events.clone());
    let supervisor = ShardSupervisor::new(config.sharding.clone(), rest, spawner);

    let supervisor_log = tokio::spawn(log_supervisor_events(supervisor.events().subscribe()));
    let app_log = tokio::spawn(log_shard_events(app_events.subscribe()));

    tokio::select! {
        result = supervisor.spawn() => {
            result?;
            tokio::signal::ctrl_c().await?;
        }
        signal = tokio::signal::ctrl_c() => signal?,
    }

    info!("Shutdown signal received");
    supervisor.shutdown().await;

    supervisor_log.abort();
    app_log.abort();

    info!("nya-bot stopped");
    Ok(())
}

async fn log_supervisor_events(mut rx: tokio::sync::broadcast::Receiver<SupervisorEvent>) {
    loop {
        match rx.recv().await {
            Ok(SupervisorEvent::AllReady { total_shards }) => {
                info!(total_shards, "All shards spawned");
            }
            Ok(SupervisorEvent::ShardDeath { shard_id, code }) if code != 0 => {
                warn!(shard_id, code, "Shard crashed");
            }
            Ok(event) => tracing::debug!(?event, "Supervisor event"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Supervisor event log fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn log_shard_events(mut rx: tokio::sync::broadcast::Receiver<ShardEvent>) {
    loop {
        match rx.recv().await {
            Ok(ShardEvent {
                shard_id,
                kind: ShardEventKind::Gateway(GatewayEvent::Dispatch(dispatch)),
            }) => {
                tracing::debug!(
                    shard_id,
                    event = %dispatch.event_type,
                    sequence = ?dispatch.sequence,
                    "Dispatch"
                );
            }
            Ok(ShardEvent {
                shard_id,
                kind: ShardEventKind::Gateway(GatewayEvent::Ready { user, guilds, .. }),
            }) => {
                info!(
                    shard_id,
                    user = %user["username"].as_str().unwrap_or("unknown"),
                    guilds = guilds.len(),
                    "Logged in"
                );
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Shard event log fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}
