//! # nya-core
//!
//! Domain layer containing the value objects shared by the REST, gateway and sharding crates.
//! This crate has zero dependencies on infrastructure (sockets, HTTP, runtimes).

pub mod shard;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use shard::{shard_for_guild, ShardInfo};
pub use value_objects::{Intents, Snowflake, SnowflakeParseError};
