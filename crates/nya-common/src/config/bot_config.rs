//! Bot configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file when present).

use nya_core::Intents;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default gateway endpoint
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Default REST base URL
pub const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";

/// Library name reported in the user agent and identify properties
pub const LIBRARY_NAME: &str = "nya";

/// Main bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub app: AppSettings,
    pub rest: RestConfig,
    pub gateway: GatewayConfig,
    pub sharding: ShardingConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default)]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" => Ok(Self::Development),
            other => Err(ConfigError::InvalidValue("APP_ENV", other.to_string())),
        }
    }
}

/// Bot token
///
/// Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for the Authorization header and Identify/Resume payloads
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// REST client configuration
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub token: Token,
    pub base_url: String,
    pub user_agent: String,
}

impl RestConfig {
    /// Configuration against the public API
    pub fn new(token: Token) -> Self {
        Self {
            token,
            base_url: DEFAULT_API_BASE_URL.to_string(),
            user_agent: default_user_agent(),
        }
    }

    /// Point the client at another base URL (tests, proxies)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Client properties reported in the Identify payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Default for ClientProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: LIBRARY_NAME.to_string(),
            device: LIBRARY_NAME.to_string(),
        }
    }
}

/// Gateway connection configuration (shared by every shard)
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub token: Token,
    pub intents: Intents,
    /// Default endpoint, used until the remote hands out a resume URL
    pub url: String,
    /// Fixed wait before every reconnect attempt
    pub reconnect_delay: Duration,
    pub properties: ClientProperties,
}

impl GatewayConfig {
    pub fn new(token: Token, intents: Intents) -> Self {
        Self {
            token,
            intents,
            url: DEFAULT_GATEWAY_URL.to_string(),
            reconnect_delay: Duration::from_millis(default_reconnect_delay_ms()),
            properties: ClientProperties::default(),
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Desired number of shards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShardCount {
    /// Ask the API for its recommendation
    #[default]
    Auto,
    Fixed(u32),
}

impl FromStr for ShardCount {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        match s.parse::<u32>() {
            Ok(n) if n > 0 => Ok(Self::Fixed(n)),
            _ => Err(ConfigError::InvalidValue("SHARD_COUNT", s.to_string())),
        }
    }
}

/// Where shard workers run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardingMode {
    /// A task on the caller's runtime
    #[default]
    Process,
    /// A dedicated OS thread with its own runtime
    Worker,
}

impl FromStr for ShardingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "process" => Ok(Self::Process),
            "worker" => Ok(Self::Worker),
            other => Err(ConfigError::InvalidValue("SHARDING_MODE", other.to_string())),
        }
    }
}

/// What happens when a worker exits with a non-zero code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RespawnPolicy {
    pub enabled: bool,
    /// Fixed delay; there is no crash-loop backoff
    pub delay: Duration,
}

impl Default for RespawnPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: Duration::from_millis(default_respawn_delay_ms()),
        }
    }
}

/// Shard supervisor configuration
#[derive(Debug, Clone)]
pub struct ShardingConfig {
    pub total_shards: ShardCount,
    pub mode: ShardingMode,
    pub respawn: RespawnPolicy,
    /// Stagger between consecutive shard creations
    pub spawn_delay: Duration,
    /// How long shutdown waits for a worker before forcing it down
    pub shutdown_grace: Duration,
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            total_shards: ShardCount::Auto,
            mode: ShardingMode::Process,
            respawn: RespawnPolicy::default(),
            spawn_delay: Duration::from_millis(default_spawn_delay_ms()),
            shutdown_grace: Duration::from_millis(default_shutdown_grace_ms()),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "nya-bot".to_string()
}

fn default_user_agent() -> String {
    format!(
        "DiscordBot ({LIBRARY_NAME}, {})",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_respawn_delay_ms() -> u64 {
    5_000
}

fn default_spawn_delay_ms() -> u64 {
    5_500
}

fn default_shutdown_grace_ms() -> u64 {
    10_000
}

impl BotConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `BOT_TOKEN` is missing or a variable cannot be parsed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .map(Token::new)
            .ok_or(ConfigError::MissingVar("BOT_TOKEN"))?;

        let env = lookup("APP_ENV")
            .map(|s| s.parse::<Environment>())
            .transpose()?
            .unwrap_or_default();

        let intents = parse_or("BOT_INTENTS", &lookup, 0u64)?;

        let rest = RestConfig {
            token: token.clone(),
            base_url: lookup("API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            user_agent: default_user_agent(),
        };

        let gateway = GatewayConfig {
            token,
            intents: Intents::from_bits_retain(intents),
            url: lookup("GATEWAY_URL").unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string()),
            reconnect_delay: Duration::from_millis(parse_or(
                "GATEWAY_RECONNECT_DELAY_MS",
                &lookup,
                default_reconnect_delay_ms(),
            )?),
            properties: ClientProperties::default(),
        };

        let sharding = ShardingConfig {
            total_shards: lookup("SHARD_COUNT")
                .map(|s| s.parse::<ShardCount>())
                .transpose()?
                .unwrap_or_default(),
            mode: lookup("SHARDING_MODE")
                .map(|s| s.parse::<ShardingMode>())
                .transpose()?
                .unwrap_or_default(),
            respawn: RespawnPolicy {
                enabled: parse_or("SHARD_RESPAWN", &lookup, true)?,
                delay: Duration::from_millis(parse_or(
                    "SHARD_RESPAWN_DELAY_MS",
                    &lookup,
                    default_respawn_delay_ms(),
                )?),
            },
            spawn_delay: Duration::from_millis(parse_or(
                "SHARD_SPAWN_DELAY_MS",
                &lookup,
                default_spawn_delay_ms(),
            )?),
            shutdown_grace: Duration::from_millis(parse_or(
                "SHARD_SHUTDOWN_GRACE_MS",
                &lookup,
                default_shutdown_grace_ms(),
            )?),
        };

        Ok(Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env,
            },
            rest,
            gateway,
            sharding,
        })
    }
}

/// Parse an optional variable, falling back to `default` when unset
fn parse_or<T, F>(key: &'static str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
