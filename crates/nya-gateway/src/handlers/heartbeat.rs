//! Heartbeat handling (timer ticks, op 1 requests and op 11 acks)

use super::Action;
use crate::connection::Session;
use crate::events::GatewayEvent;
use crate::protocol::GatewayPayload;
use tokio::time::Instant;

/// Keeps the liveness check going
pub struct HeartbeatHandler;

impl HeartbeatHandler {
    /// Periodic timer tick
    ///
    /// An unanswered previous heartbeat means the connection is dead.
    pub fn tick(session: &mut Session, now: Instant) -> Vec<Action> {
        if session.heartbeat_ack_pending() {
            tracing::warn!(
                shard = %session.shard(),
                "Heartbeat not acknowledged, connection considered dead"
            );
            return vec![Action::Reconnect];
        }

        Self::beat(session, now)
    }

    /// The remote asked for an immediate heartbeat (op 1)
    pub fn request(session: &mut Session, now: Instant) -> Vec<Action> {
        tracing::trace!(shard = %session.shard(), "Heartbeat requested");
        Self::beat(session, now)
    }

    /// Heartbeat acknowledged (op 11)
    pub fn ack(session: &mut Session, now: Instant) -> Vec<Action> {
        match session.heartbeat_acked(now) {
            Some(latency) => {
                tracing::trace!(
                    shard = %session.shard(),
                    latency_ms = latency.as_millis() as u64,
                    "Heartbeat acknowledged"
                );
                vec![Action::Emit(GatewayEvent::HeartbeatAck { latency })]
            }
            None => Vec::new(),
        }
    }

    fn beat(session: &mut Session, now: Instant) -> Vec<Action> {
        session.heartbeat_sent(now);
        vec![Action::Send(GatewayPayload::heartbeat(session.sequence()))]
    }
}
