//! Handler error types

use crate::protocol::OpCode;
use thiserror::Error;

/// Handler error type
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A frame's payload did not match its op code
    #[error("Invalid {op} payload: {reason}")]
    InvalidPayload { op: OpCode, reason: String },

    /// Building an outbound frame failed
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

impl HandlerError {
    pub(crate) fn invalid(op: OpCode, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            op,
            reason: reason.into(),
        }
    }

    /// Whether the socket is unusable after this error
    ///
    /// Without a valid Hello there is no heartbeat interval, so the connection can never
    /// become healthy.
    pub fn requires_reconnect(&self) -> bool {
        match self {
            Self::InvalidPayload { op, .. } => *op == OpCode::Hello,
            Self::Encode(_) => true,
        }
    }
}

/// Handler result type
pub type HandlerResult<T> = Result<T, HandlerError>;
