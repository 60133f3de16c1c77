//! Gateway events
//!
//! What a connection publishes to the application.

mod bus;
mod event_types;

pub use bus::EventBus;
pub use event_types::EventType;

use serde_json::Value;

/// Event published by a [`ConnectionSupervisor`](crate::ConnectionSupervisor)
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// Socket opened; handshake not yet complete
    Connected,
    /// New session established
    Ready {
        session_id: String,
        user: Value,
        guilds: Vec<nya_core::Snowflake>,
    },
    /// Previous session resumed
    Resumed,
    /// Any dispatch (op 0) frame, including READY and RESUMED
    Dispatch(DispatchEvent),
    /// Heartbeat acknowledged; `latency` is the round trip
    HeartbeatAck { latency: std::time::Duration },
    /// Socket lost; a reconnect follows unless the close was fatal
    Disconnected { code: Option<u16> },
    /// Remote invalidated the session
    InvalidSession { resumable: bool },
}

/// A dispatch frame as delivered to the application
#[derive(Debug, Clone)]
pub struct DispatchEvent {
    /// Raw event name from the `t` field
    pub event_type: String,
    pub sequence: Option<u64>,
    pub data: Value,
}

impl DispatchEvent {
    /// Known event kind, if any
    pub fn kind(&self) -> Option<EventType> {
        EventType::parse(&self.event_type)
    }

    /// Decode the payload into a typed struct
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}
