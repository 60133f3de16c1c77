//! Op code handlers
//!
//! Turn each inbound frame (or timer tick) into a list of [`Action`]s for the connection
//! to carry out. Handlers only touch the [`Session`]; they never see the socket.

mod dispatch;
mod error;
mod heartbeat;
mod hello;
mod invalid_session;

pub use dispatch::DispatchHandler;
pub use error::{HandlerError, HandlerResult};
pub use heartbeat::HeartbeatHandler;
pub use hello::HelloHandler;
pub use invalid_session::InvalidSessionHandler;

use crate::connection::{Handshake, Session};
use crate::events::GatewayEvent;
use crate::protocol::{GatewayPayload, OpCode};
use nya_common::GatewayConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Something the connection must do in response to a frame
#[derive(Debug)]
pub enum Action {
    /// Write a frame to the socket
    Send(GatewayPayload),
    /// (Re)start the heartbeat timer; the first tick is one interval away
    StartHeartbeat(Duration),
    /// Send a handshake on this socket after a delay
    ScheduleHandshake { delay: Duration, kind: Handshake },
    /// Drop the socket and reconnect with resume
    Reconnect,
    /// Publish to the application
    Emit(GatewayEvent),
}

/// Routes inbound frames to their handler
pub struct FrameDispatcher;

impl FrameDispatcher {
    /// Handle one inbound frame
    pub fn dispatch(
        session: &mut Session,
        config: &GatewayConfig,
        frame: GatewayPayload,
        now: Instant,
    ) -> HandlerResult<Vec<Action>> {
        match frame.op {
            OpCode::Dispatch => DispatchHandler::handle(session, frame),
            OpCode::Hello => HelloHandler::handle(session, config, &frame, now),
            OpCode::Heartbeat => Ok(HeartbeatHandler::request(session, now)),
            OpCode::HeartbeatAck => Ok(HeartbeatHandler::ack(session, now)),
            OpCode::Reconnect => {
                tracing::info!(shard = %session.shard(), "Remote requested reconnect");
                Ok(vec![Action::Reconnect])
            }
            OpCode::InvalidSession => {
                let resumable = frame.as_invalid_session().unwrap_or(false);
                Ok(InvalidSessionHandler::handle(
                    session,
                    resumable,
                    InvalidSessionHandler::jitter(),
                ))
            }
            op => {
                tracing::warn!(shard = %session.shard(), op = %op, "Ignoring client-only op code");
                Ok(Vec::new())
            }
        }
    }
}
