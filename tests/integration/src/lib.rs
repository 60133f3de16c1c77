//! Integration test utilities for the bot runtime
//!
//! Provides a scripted local gateway and canned payloads for end-to-end tests of the
//! REST client, the gateway connection and the shard supervisor.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
