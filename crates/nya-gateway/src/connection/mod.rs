//! Connection management
//!
//! One [`ConnectionSupervisor`] per shard keeps a socket alive; a [`GatewayHandle`] talks
//! to it from anywhere else.

mod handle;
mod session;
mod state;
mod supervisor;

pub use handle::{GatewayCommand, GatewayHandle};
pub use session::{Handshake, Session, SessionSnapshot};
pub use state::ConnectionState;
pub use supervisor::ConnectionSupervisor;
