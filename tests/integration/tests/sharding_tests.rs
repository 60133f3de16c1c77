//! Shard supervisor tests
//!
//! Shard count resolution against wiremock, and whole workers against the mock gateway.
//!
//! Run with: cargo test -p integration-tests --test sharding_tests

use integration_tests::*;
use nya_common::{RespawnPolicy, ShardCount, ShardingConfig, ShardingMode};
use nya_core::{ShardInfo, Snowflake};
use nya_gateway::{EventBus, GatewayEvent};
use nya_rest::RestClient;
use nya_sharding::{
    GatewayWorkerSpawner, ShardEvent, ShardEventKind, ShardStatus, ShardSupervisor,
    ShardingResult, SupervisorEvent, WorkerContext, WorkerSpawner, WorkerTask,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Records which shards were started and keeps their channels open
#[derive(Clone, Default)]
struct RecordingSpawner {
    started: Arc<Mutex<Vec<WorkerContext>>>,
}

impl RecordingSpawner {
    fn shards(&self) -> Vec<ShardInfo> {
        self.started.lock().iter().map(|ctx| ctx.shard).collect()
    }
}

impl WorkerSpawner for RecordingSpawner {
    fn spawn(&self, ctx: WorkerContext) -> ShardingResult<WorkerTask> {
        self.started.lock().push(ctx);
        Ok(WorkerTask::Detached)
    }
}

fn sharding_config(total_shards: ShardCount) -> ShardingConfig {
    ShardingConfig {
        total_shards,
        respawn: RespawnPolicy {
            enabled: true,
            delay: Duration::from_millis(100),
        },
        spawn_delay: Duration::from_millis(10),
        shutdown_grace: Duration::from_secs(2),
        ..ShardingConfig::default()
    }
}

async fn wait_for_supervisor_event<F>(
    events: &mut broadcast::Receiver<SupervisorEvent>,
    predicate: F,
) -> SupervisorEvent
where
    F: Fn(&SupervisorEvent) -> bool,
{
    tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("supervisor events closed"),
            }
        }
    })
    .await
    .expect("supervisor event not received in time")
}

#[tokio::test]
async fn test_auto_shard_count_uses_recommendation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gateway/bot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "wss://gateway.example",
            "shards": 2,
            "session_start_limit": {"total": 1000, "remaining": 1000, "reset_after": 0, "max_concurrency": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let spawner = RecordingSpawner::default();
    let rest = RestClient::new(rest_config(&server.uri())).unwrap();
    let supervisor = ShardSupervisor::new(sharding_config(ShardCount::Auto), rest, spawner.clone());

    assert_eq!(supervisor.spawn().await.unwrap(), 2);
    assert_eq!(spawner.shards(), vec![ShardInfo::new(0, 2), ShardInfo::new(1, 2)]);
    assert_eq!(supervisor.total_shards(), 2);
    assert_eq!(
        supervisor.get_shard_for_guild(Snowflake::new(175_928_847_299_117_063)),
        0
    );

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_auto_shard_count_falls_back_to_one() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gateway/bot"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let spawner = RecordingSpawner::default();
    let rest = RestClient::new(rest_config(&server.uri())).unwrap();
    let supervisor = ShardSupervisor::new(sharding_config(ShardCount::Auto), rest, spawner.clone());

    assert_eq!(supervisor.spawn().await.unwrap(), 1);
    assert_eq!(spawner.shards(), vec![ShardInfo::single()]);

    supervisor.shutdown().await;
}

async fn run_worker_round_trip(mode: ShardingMode) {
    let mut gateway = MockGateway::start().await.unwrap();
    let app_events = EventBus::<ShardEvent>::new();
    let mut app_rx = app_events.subscribe();

    let spawner = GatewayWorkerSpawner::new(gateway_config(&gateway.url()), mode, app_events);
    let rest = RestClient::new(rest_config("http://127.0.0.1:9")).unwrap();
    let supervisor = ShardSupervisor::new(sharding_config(ShardCount::Fixed(1)), rest, spawner);
    let mut events = supervisor.events().subscribe();

    assert_eq!(supervisor.spawn().await.unwrap(), 1);

    let mut conn = gateway.accept().await.unwrap();
    conn.send_json(&hello(45_000)).await.unwrap();
    let identify = conn.recv_op(2).await.unwrap();
    assert_eq!(identify["d"]["shard"], json!([0, 1]));

    conn.send_json(&ready(1, "session-1", &gateway.resume_url(), &[10, 11]))
        .await
        .unwrap();

    let event = wait_for_supervisor_event(&mut events, |e| {
        matches!(e, SupervisorEvent::ShardReady { .. })
    })
    .await;
    assert_eq!(
        event,
        SupervisorEvent::ShardReady {
            shard_id: 0,
            guild_count: 2
        }
    );
    assert_eq!(supervisor.status(0), Some(ShardStatus::Ready));

    let republished = tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            let event = app_rx.recv().await.unwrap();
            if matches!(event.kind, ShardEventKind::Gateway(GatewayEvent::Ready { .. })) {
                return event;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(republished.shard_id, 0);

    conn.send_json(&dispatch("GUILD_CREATE", 2, json!({"id": "12", "name": "new"})))
        .await
        .unwrap();
    tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            let guilds = supervisor.broadcast_eval("guilds").await.unwrap();
            if guilds == vec![json!(3)] {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(
        supervisor.broadcast_eval("shard.total").await.unwrap(),
        vec![json!(1)]
    );
    assert_eq!(
        supervisor.broadcast_eval("status").await.unwrap(),
        vec![json!("ready")]
    );

    supervisor.send(0, json!({"kind": "ping"})).unwrap();
    let payload = tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            if let ShardEventKind::Payload(data) = app_rx.recv().await.unwrap().kind {
                return data;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(payload, json!({"kind": "ping"}));

    let stopping = supervisor.clone();
    let shutdown = tokio::spawn(async move { stopping.shutdown().await });
    assert_eq!(conn.recv_close().await.unwrap(), Some(1000));
    shutdown.await.unwrap();

    assert!(supervisor.shard_ids().is_empty());
    gateway
        .expect_no_connection(Duration::from_millis(300))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_task_worker_round_trip() {
    run_worker_round_trip(ShardingMode::Process).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_thread_worker_round_trip() {
    run_worker_round_trip(ShardingMode::Worker).await;
}

#[tokio::test]
async fn test_fatal_close_is_reported_not_respawned() {
    let mut gateway = MockGateway::start().await.unwrap();
    let spawner = GatewayWorkerSpawner::new(
        gateway_config(&gateway.url()),
        ShardingMode::Process,
        EventBus::new(),
    );
    let rest = RestClient::new(rest_config("http://127.0.0.1:9")).unwrap();
    let supervisor = ShardSupervisor::new(sharding_config(ShardCount::Fixed(1)), rest, spawner);
    let mut events = supervisor.events().subscribe();

    supervisor.spawn().await.unwrap();

    let mut conn = gateway.accept().await.unwrap();
    conn.send_json(&hello(45_000)).await.unwrap();
    conn.recv_op(2).await.unwrap();
    conn.close(4004).await.unwrap();

    let event = wait_for_supervisor_event(&mut events, |e| {
        matches!(e, SupervisorEvent::ShardError { .. })
    })
    .await;
    assert_eq!(event.shard_id(), Some(0));

    // the worker idles: no reconnect and no respawn
    gateway
        .expect_no_connection(Duration::from_millis(400))
        .await
        .unwrap();
    assert_ne!(supervisor.status(0), Some(ShardStatus::Dead));

    supervisor.shutdown().await;
}
