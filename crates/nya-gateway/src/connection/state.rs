//! Connection lifecycle states

use serde::Serialize;
use std::fmt;

/// Where a connection is in its lifecycle
///
/// `Disconnected → Connecting → AwaitingHello → Identifying | Resuming → Ready`, then on
/// a drop `Reconnecting → Connecting → …`. Only an explicit shutdown ends the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    AwaitingHello,
    Identifying,
    Resuming,
    Ready,
    Reconnecting,
}

impl ConnectionState {
    /// Whether the socket is open (handshake may still be in progress)
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(
            self,
            Self::AwaitingHello | Self::Identifying | Self::Resuming | Self::Ready
        )
    }

    /// Whether application commands may be sent
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting_hello",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
