//! # nya-gateway
//!
//! Client side of the real-time gateway: wire protocol, session bookkeeping, per-opcode
//! frame handlers, and the [`ConnectionSupervisor`] that keeps one shard connected.

pub mod connection;
pub mod error;
pub mod events;
pub mod handlers;
pub mod protocol;

pub use connection::{
    ConnectionState, ConnectionSupervisor, GatewayCommand, GatewayHandle, Session,
    SessionSnapshot,
};
pub use error::{GatewayError, GatewayResult};
pub use events::{DispatchEvent, EventBus, EventType, GatewayEvent};
pub use protocol::{CloseCode, CloseDisposition, GatewayPayload, OpCode};
