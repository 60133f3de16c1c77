//! Gateway connection tests
//!
//! A `ConnectionSupervisor` against the local mock gateway.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use integration_tests::*;
use nya_core::ShardInfo;
use nya_gateway::protocol::{PresenceUpdate, Status};
use nya_gateway::{
    CloseCode, ConnectionState, ConnectionSupervisor, EventBus, GatewayError, GatewayEvent,
    GatewayHandle, GatewayResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

struct Client {
    handle: GatewayHandle,
    events: broadcast::Receiver<GatewayEvent>,
    task: JoinHandle<GatewayResult<()>>,
}

fn start_client(gateway: &MockGateway, shard: ShardInfo) -> Client {
    let bus = EventBus::new();
    let events = bus.subscribe();
    let (supervisor, handle) =
        ConnectionSupervisor::new(Arc::new(gateway_config(&gateway.url())), shard, bus);
    let task = tokio::spawn(supervisor.run());
    Client {
        handle,
        events,
        task,
    }
}

/// Wait for the first event matching `predicate`
async fn wait_for_event<F>(events: &mut broadcast::Receiver<GatewayEvent>, predicate: F) -> GatewayEvent
where
    F: Fn(&GatewayEvent) -> bool,
{
    tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("event not received in time")
}

/// Hello, heartbeat and identify; returns the identify frame
async fn handshake(conn: &mut MockConnection) -> serde_json::Value {
    conn.send_json(&hello(45_000)).await.unwrap();

    let heartbeat = conn.recv_json().await.unwrap();
    assert_eq!(heartbeat["op"], 1);
    assert!(heartbeat["d"].is_null());

    conn.recv_op(2).await.unwrap()
}

#[tokio::test]
async fn test_identify_and_ready() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut client = start_client(&gateway, ShardInfo::new(1, 2));

    let mut conn = gateway.accept().await.unwrap();
    let identify = handshake(&mut conn).await;

    assert_eq!(identify["d"]["token"], TEST_TOKEN);
    assert_eq!(identify["d"]["intents"], 513);
    assert_eq!(identify["d"]["shard"], serde_json::json!([1, 2]));
    assert_eq!(identify["d"]["compress"], false);
    assert_eq!(identify["d"]["properties"]["browser"], "nya");

    conn.send_json(&ready(1, "session-1", &gateway.resume_url(), &[10, 11]))
        .await
        .unwrap();

    let event = wait_for_event(&mut client.events, |e| matches!(e, GatewayEvent::Ready { .. })).await;
    match event {
        GatewayEvent::Ready {
            session_id, guilds, ..
        } => {
            assert_eq!(session_id, "session-1");
            assert_eq!(guilds.len(), 2);
        }
        other => panic!("unexpected event {other:?}"),
    }

    client.handle.wait_for_state(ConnectionState::Ready).await.unwrap();
    let snapshot = client.handle.snapshot();
    assert_eq!(snapshot.session_id.as_deref(), Some("session-1"));
    assert_eq!(snapshot.sequence, Some(1));

    client.handle.shutdown();
    assert_eq!(conn.recv_close().await.unwrap(), Some(1000));
    client.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_resumable_close_resumes() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut client = start_client(&gateway, ShardInfo::single());

    let mut conn = gateway.accept().await.unwrap();
    handshake(&mut conn).await;
    conn.send_json(&ready(1, "session-1", &gateway.resume_url(), &[]))
        .await
        .unwrap();
    conn.send_json(&dispatch("MESSAGE_CREATE", 2, serde_json::json!({"content": "hi"})))
        .await
        .unwrap();
    wait_for_event(&mut client.events, |e| {
        matches!(e, GatewayEvent::Dispatch(d) if d.event_type == "MESSAGE_CREATE")
    })
    .await;

    conn.close(4000).await.unwrap();

    let event = wait_for_event(&mut client.events, |e| matches!(e, GatewayEvent::Disconnected { .. })).await;
    assert!(matches!(event, GatewayEvent::Disconnected { code: Some(4000) }));

    let mut conn = gateway.accept().await.unwrap();
    conn.send_json(&hello(45_000)).await.unwrap();
    let resume = conn.recv_op(6).await.unwrap();
    assert_eq!(resume["d"]["token"], TEST_TOKEN);
    assert_eq!(resume["d"]["session_id"], "session-1");
    assert_eq!(resume["d"]["seq"], 2);

    conn.send_json(&dispatch("RESUMED", 3, serde_json::json!({})))
        .await
        .unwrap();
    wait_for_event(&mut client.events, |e| matches!(e, GatewayEvent::Resumed)).await;
    client.handle.wait_for_state(ConnectionState::Ready).await.unwrap();
    assert_eq!(client.handle.snapshot().sequence, Some(3));

    client.handle.shutdown();
    client.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unknown_close_code_still_resumes() {
    let mut gateway = MockGateway::start().await.unwrap();
    let client = start_client(&gateway, ShardInfo::single());

    let mut conn = gateway.accept().await.unwrap();
    handshake(&mut conn).await;
    conn.send_json(&ready(1, "session-1", &gateway.resume_url(), &[]))
        .await
        .unwrap();
    client.handle.wait_for_state(ConnectionState::Ready).await.unwrap();
    conn.close(4999).await.unwrap();

    let mut conn = gateway.accept().await.unwrap();
    conn.send_json(&hello(45_000)).await.unwrap();
    let resume = conn.recv_op(6).await.unwrap();
    assert_eq!(resume["d"]["session_id"], "session-1");

    client.handle.shutdown();
    client.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_fatal_close_stops() {
    let mut gateway = MockGateway::start().await.unwrap();
    let client = start_client(&gateway, ShardInfo::single());

    let mut conn = gateway.accept().await.unwrap();
    handshake(&mut conn).await;
    conn.close(4004).await.unwrap();

    let err = tokio::time::timeout(STEP_TIMEOUT, client.task)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, GatewayError::FatalClose(CloseCode::AuthenticationFailed)));
    assert_eq!(err.close_code(), Some(4004));

    gateway
        .expect_no_connection(Duration::from_millis(300))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_missing_heartbeat_ack_reconnects() {
    let mut gateway = MockGateway::start().await.unwrap();
    let client = start_client(&gateway, ShardInfo::single());

    let mut conn = gateway.accept().await.unwrap();
    conn.send_json(&hello(100)).await.unwrap();
    // never ack: the first tick finds the initial heartbeat unanswered
    let code = conn.recv_close().await.unwrap();
    assert_eq!(code, Some(4000));

    let _reconnected = gateway.accept().await.unwrap();

    client.handle.shutdown();
    client.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_acked_heartbeats_keep_connection() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut client = start_client(&gateway, ShardInfo::single());

    let mut conn = gateway.accept().await.unwrap();
    conn.send_json(&hello(100)).await.unwrap();
    let first = conn.recv_json().await.unwrap();
    assert_eq!(first["op"], 1);
    conn.send_json(&heartbeat_ack()).await.unwrap();
    conn.recv_op(2).await.unwrap();

    // answer the next few ticks
    for _ in 0..3 {
        let beat = conn.recv_json().await.unwrap();
        assert_eq!(beat["op"], 1);
        conn.send_json(&heartbeat_ack()).await.unwrap();
    }

    let ack = wait_for_event(&mut client.events, |e| matches!(e, GatewayEvent::HeartbeatAck { .. })).await;
    assert!(matches!(ack, GatewayEvent::HeartbeatAck { .. }));
    gateway
        .expect_no_connection(Duration::from_millis(50))
        .await
        .unwrap();

    client.handle.shutdown();
    client.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_remote_heartbeat_request_answered() {
    let mut gateway = MockGateway::start().await.unwrap();
    let client = start_client(&gateway, ShardInfo::single());

    let mut conn = gateway.accept().await.unwrap();
    handshake(&mut conn).await;
    conn.send_json(&ready(5, "session-1", &gateway.resume_url(), &[]))
        .await
        .unwrap();
    client.handle.wait_for_state(ConnectionState::Ready).await.unwrap();

    conn.send_json(&serde_json::json!({"op": 1, "d": null})).await.unwrap();
    let beat = conn.recv_json().await.unwrap();
    assert_eq!(beat["op"], 1);
    assert_eq!(beat["d"], 5);

    client.handle.shutdown();
    client.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_reconnect_request_resumes() {
    let mut gateway = MockGateway::start().await.unwrap();
    let client = start_client(&gateway, ShardInfo::single());

    let mut conn = gateway.accept().await.unwrap();
    handshake(&mut conn).await;
    conn.send_json(&ready(1, "session-1", &gateway.resume_url(), &[]))
        .await
        .unwrap();
    client.handle.wait_for_state(ConnectionState::Ready).await.unwrap();

    conn.send_json(&serde_json::json!({"op": 7, "d": null})).await.unwrap();
    assert_eq!(conn.recv_close().await.unwrap(), Some(4000));

    let mut conn = gateway.accept().await.unwrap();
    conn.send_json(&hello(45_000)).await.unwrap();
    conn.recv_op(6).await.unwrap();

    client.handle.shutdown();
    client.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_invalid_session_reidentifies_on_same_socket() {
    let mut gateway = MockGateway::start().await.unwrap();
    let client = start_client(&gateway, ShardInfo::single());

    let mut conn = gateway.accept().await.unwrap();
    handshake(&mut conn).await;
    conn.send_json(&ready(1, "session-1", &gateway.resume_url(), &[]))
        .await
        .unwrap();
    client.handle.wait_for_state(ConnectionState::Ready).await.unwrap();

    let sent = tokio::time::Instant::now();
    conn.send_json(&invalid_session(false)).await.unwrap();
    let identify = conn.recv_op(2).await.unwrap();
    assert!(sent.elapsed() >= Duration::from_millis(900));
    assert_eq!(identify["d"]["token"], TEST_TOKEN);
    assert_eq!(client.handle.snapshot().session_id, None);

    client.handle.shutdown();
    client.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_commands_wait_for_ready() {
    let mut gateway = MockGateway::start().await.unwrap();
    let client = start_client(&gateway, ShardInfo::single());

    client
        .handle
        .update_presence(PresenceUpdate {
            status: Status::Dnd,
            ..PresenceUpdate::default()
        })
        .await
        .unwrap();

    let mut conn = gateway.accept().await.unwrap();
    handshake(&mut conn).await;
    conn.expect_quiet(Duration::from_millis(200)).await.unwrap();

    conn.send_json(&ready(1, "session-1", &gateway.resume_url(), &[]))
        .await
        .unwrap();
    let presence = conn.recv_op(3).await.unwrap();
    assert_eq!(presence["d"]["status"], "dnd");

    client.handle.shutdown();
    client.task.await.unwrap().unwrap();
}
