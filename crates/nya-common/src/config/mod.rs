//! Configuration module
//!
//! Loads bot configuration from environment variables.

mod bot_config;

pub use bot_config::{
    AppSettings, BotConfig, ClientProperties, ConfigError, Environment, GatewayConfig,
    RespawnPolicy, RestConfig, ShardCount, ShardingConfig, ShardingMode, Token,
};
