//! Handle to a running connection

use super::{ConnectionState, SessionSnapshot};
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{GatewayPayload, PresenceUpdate, RequestGuildMembers};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Application request sent over the socket
///
/// Queued until the connection is ready.
#[derive(Debug, Clone)]
pub enum GatewayCommand {
    UpdatePresence(PresenceUpdate),
    RequestGuildMembers(RequestGuildMembers),
}

impl GatewayCommand {
    pub(crate) fn to_payload(&self) -> Result<GatewayPayload, serde_json::Error> {
        match self {
            Self::UpdatePresence(presence) => GatewayPayload::presence_update(presence),
            Self::RequestGuildMembers(request) => GatewayPayload::request_guild_members(request),
        }
    }
}

/// Cloneable handle to a [`ConnectionSupervisor`](super::ConnectionSupervisor)
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    pub(super) commands: mpsc::Sender<GatewayCommand>,
    pub(super) shutdown: Arc<watch::Sender<bool>>,
    pub(super) snapshot: watch::Receiver<SessionSnapshot>,
}

impl GatewayHandle {
    /// Change the bot's presence (op 3)
    pub async fn update_presence(&self, presence: PresenceUpdate) -> GatewayResult<()> {
        self.command(GatewayCommand::UpdatePresence(presence)).await
    }

    /// Ask for a guild's member list (op 8); members arrive as GUILD_MEMBERS_CHUNK
    pub async fn request_guild_members(&self, request: RequestGuildMembers) -> GatewayResult<()> {
        self.command(GatewayCommand::RequestGuildMembers(request)).await
    }

    pub async fn command(&self, command: GatewayCommand) -> GatewayResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| GatewayError::Closed)
    }

    /// Close the socket with a normal close and stop reconnecting
    ///
    /// Pending heartbeat, handshake and reconnect timers are dropped with it.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Latest published session state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot.borrow().state
    }

    pub fn latency(&self) -> Option<Duration> {
        self.snapshot.borrow().latency
    }

    /// Wait until the connection reaches `state`
    pub async fn wait_for_state(&self, state: ConnectionState) -> GatewayResult<()> {
        let mut rx = self.snapshot.clone();
        rx.wait_for(|snapshot| snapshot.state == state)
            .await
            .map(|_| ())
            .map_err(|_| GatewayError::Closed)
    }
}
