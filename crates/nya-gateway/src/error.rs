//! Gateway error types

use crate::protocol::CloseCode;
use thiserror::Error;

/// Gateway error type
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The remote closed with a code that must not be retried
    #[error("Gateway closed the connection: {0}")]
    FatalClose(CloseCode),

    /// The connection has stopped and no longer accepts commands
    #[error("Gateway connection is closed")]
    Closed,
}

impl GatewayError {
    /// Close code behind a fatal close
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::FatalClose(code) => Some(code.as_u16()),
            Self::Closed => None,
        }
    }
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;
