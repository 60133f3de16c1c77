//! Worker control protocol
//!
//! Messages exchanged between the supervisor and its workers. Nothing else crosses the
//! boundary.

mod eval;
mod messages;

pub use eval::EvalExpr;
pub use messages::{SupervisorMessage, WorkerMessage, WorkerReport};
