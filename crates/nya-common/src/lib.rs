//! # nya-common
//!
//! Shared utilities including configuration and telemetry.

pub mod config;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{
    AppSettings, BotConfig, ClientProperties, ConfigError, Environment, GatewayConfig,
    RespawnPolicy, RestConfig, ShardCount, ShardingConfig, ShardingMode, Token,
};
pub use telemetry::{
    init_tracing, init_tracing_with_config, try_init_tracing, try_init_tracing_with_config,
    TracingConfig, TracingError,
};
