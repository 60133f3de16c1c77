//! Dispatch handler (op 0)

use super::{Action, HandlerError, HandlerResult};
use crate::connection::Session;
use crate::events::{DispatchEvent, EventType, GatewayEvent};
use crate::protocol::{GatewayPayload, OpCode};

/// Handles event frames
pub struct DispatchHandler;

impl DispatchHandler {
    /// Track the sequence and republish the event
    ///
    /// READY and RESUMED also complete the handshake.
    pub fn handle(session: &mut Session, frame: GatewayPayload) -> HandlerResult<Vec<Action>> {
        session.observe_sequence(frame.s);

        let Some(event_type) = frame.t else {
            return Err(HandlerError::invalid(OpCode::Dispatch, "missing event name"));
        };

        let mut actions = Vec::with_capacity(2);

        match EventType::parse(&event_type) {
            Some(EventType::Ready) => {
                let ready: crate::protocol::ReadyPayload = serde_json::from_value(frame.d.clone())
                    .map_err(|e| HandlerError::invalid(OpCode::Dispatch, format!("READY: {e}")))?;
                session.on_ready(&ready);

                tracing::info!(
                    shard = %session.shard(),
                    session_id = %ready.session_id,
                    guilds = ready.guilds.len(),
                    "Session ready"
                );

                actions.push(Action::Emit(GatewayEvent::Ready {
                    session_id: ready.session_id,
                    user: ready.user,
                    guilds: ready.guilds.iter().map(|g| g.id).collect(),
                }));
            }
            Some(EventType::Resumed) => {
                session.on_resumed();
                tracing::info!(
                    shard = %session.shard(),
                    sequence = ?session.sequence(),
                    "Session resumed"
                );
                actions.push(Action::Emit(GatewayEvent::Resumed));
            }
            _ => {}
        }

        actions.push(Action::Emit(GatewayEvent::Dispatch(DispatchEvent {
            event_type,
            sequence: frame.s,
            data: frame.d,
        })));

        Ok(actions)
    }
}
