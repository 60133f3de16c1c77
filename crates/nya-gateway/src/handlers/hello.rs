//! Hello handler (op 10)

use super::{Action, HandlerError, HandlerResult};
use crate::connection::{ConnectionState, Session};
use crate::protocol::{GatewayPayload, OpCode};
use nya_common::GatewayConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Handles the first frame of every socket
pub struct HelloHandler;

impl HelloHandler {
    /// Start heartbeating and send the handshake
    ///
    /// One heartbeat goes out right away; the timer then ticks at the advertised interval.
    pub fn handle(
        session: &mut Session,
        config: &GatewayConfig,
        frame: &GatewayPayload,
        now: Instant,
    ) -> HandlerResult<Vec<Action>> {
        let hello = frame
            .as_hello()
            .ok_or_else(|| HandlerError::invalid(OpCode::Hello, "missing heartbeat_interval"))?;

        if session.state() != ConnectionState::AwaitingHello {
            tracing::warn!(shard = %session.shard(), state = %session.state(), "Unexpected Hello");
        }

        let interval = Duration::from_millis(hello.heartbeat_interval.max(1));
        session.on_hello(interval);

        tracing::debug!(
            shard = %session.shard(),
            heartbeat_interval_ms = hello.heartbeat_interval,
            "Received Hello"
        );

        session.heartbeat_sent(now);
        let heartbeat = GatewayPayload::heartbeat(session.sequence());

        let kind = session.handshake_kind();
        let handshake = session.handshake(kind, config)?;

        Ok(vec![
            Action::Send(heartbeat),
            Action::StartHeartbeat(interval),
            Action::Send(handshake),
        ])
    }
}
