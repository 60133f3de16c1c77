//! Invalid session handler (op 9)

use super::Action;
use crate::connection::{Handshake, Session};
use crate::events::GatewayEvent;
use rand::Rng;
use std::time::Duration;

/// Bounds of the wait before answering an invalid session, in milliseconds
const JITTER_MS: std::ops::RangeInclusive<u64> = 1_000..=5_000;

/// Handles session invalidation
pub struct InvalidSessionHandler;

impl InvalidSessionHandler {
    /// Random wait in the 1-5 second window
    pub fn jitter() -> Duration {
        Duration::from_millis(rand::thread_rng().gen_range(JITTER_MS))
    }

    /// Schedule a resume, or drop the session and schedule a fresh identify
    pub fn handle(session: &mut Session, resumable: bool, delay: Duration) -> Vec<Action> {
        let kind = if resumable && session.session_id().is_some() {
            Handshake::Resume
        } else {
            session.invalidate();
            Handshake::Identify
        };

        tracing::warn!(
            shard = %session.shard(),
            resumable,
            next = ?kind,
            delay_ms = delay.as_millis() as u64,
            "Session invalidated"
        );

        vec![
            Action::Emit(GatewayEvent::InvalidSession { resumable }),
            Action::ScheduleHandshake { delay, kind },
        ]
    }
}
