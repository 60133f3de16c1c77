//! Typed endpoints
//!
//! Thin wrappers over [`RestClient::request`]; entity payloads stay as JSON values.

use crate::{RestClient, RestResult};
use nya_core::Snowflake;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Body of a create/edit message call
///
/// A bare string becomes `{"content": ...}`; a JSON object is sent as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageBody(Value);

impl MessageBody {
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<&str> for MessageBody {
    fn from(content: &str) -> Self {
        Self(json!({ "content": content }))
    }
}

impl From<String> for MessageBody {
    fn from(content: String) -> Self {
        Self(json!({ "content": content }))
    }
}

impl From<Value> for MessageBody {
    fn from(value: Value) -> Self {
        match value {
            Value::String(content) => content.into(),
            other => Self(other),
        }
    }
}

/// Where application commands live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    Global,
    Guild(Snowflake),
}

impl CommandScope {
    fn path(self, application_id: Snowflake) -> String {
        match self {
            Self::Global => format!("/applications/{application_id}/commands"),
            Self::Guild(guild_id) => {
                format!("/applications/{application_id}/guilds/{guild_id}/commands")
            }
        }
    }
}

/// Response of `GET /gateway/bot`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayBot {
    pub url: String,
    /// Recommended number of shards
    pub shards: u32,
    pub session_start_limit: Option<SessionStartLimit>,
}

/// Identify budget for the current window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartLimit {
    pub total: u32,
    pub remaining: u32,
    /// Milliseconds until the budget resets
    pub reset_after: u64,
    pub max_concurrency: u32,
}

impl RestClient {
    /// Gateway URL and recommended shard count for this bot
    pub async fn get_gateway_bot(&self) -> RestResult<GatewayBot> {
        self.request_as(Method::GET, "/gateway/bot", None).await
    }

    pub async fn send_message(
        &self,
        channel_id: Snowflake,
        body: impl Into<MessageBody>,
    ) -> RestResult<Value> {
        let body = body.into().into_value();
        self.request_as(
            Method::POST,
            &format!("/channels/{channel_id}/messages"),
            Some(&body),
        )
        .await
    }

    pub async fn edit_message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        body: impl Into<MessageBody>,
    ) -> RestResult<Value> {
        let body = body.into().into_value();
        self.request_as(
            Method::PATCH,
            &format!("/channels/{channel_id}/messages/{message_id}"),
            Some(&body),
        )
        .await
    }

    pub async fn delete_message(&self, channel_id: Snowflake, message_id: Snowflake) -> RestResult<()> {
        self.request(
            Method::DELETE,
            &format!("/channels/{channel_id}/messages/{message_id}"),
            None,
        )
        .await
        .map(drop)
    }

    /// React as the bot; `emoji` is a unicode emoji or `name:id`
    pub async fn create_reaction(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        emoji: &str,
    ) -> RestResult<()> {
        let emoji = urlencoding::encode(emoji);
        self.request(
            Method::PUT,
            &format!("/channels/{channel_id}/messages/{message_id}/reactions/{emoji}/@me"),
            None,
        )
        .await
        .map(drop)
    }

    pub async fn get_guild(&self, guild_id: Snowflake) -> RestResult<Value> {
        self.request_as(Method::GET, &format!("/guilds/{guild_id}"), None).await
    }

    pub async fn get_channel(&self, channel_id: Snowflake) -> RestResult<Value> {
        self.request_as(Method::GET, &format!("/channels/{channel_id}"), None).await
    }

    pub async fn get_user(&self, user_id: Snowflake) -> RestResult<Value> {
        self.request_as(Method::GET, &format!("/users/{user_id}"), None).await
    }

    pub async fn get_current_user(&self) -> RestResult<Value> {
        self.request_as(Method::GET, "/users/@me", None).await
    }

    pub async fn create_interaction_response(
        &self,
        interaction_id: Snowflake,
        interaction_token: &str,
        data: &Value,
    ) -> RestResult<Option<Value>> {
        self.request(
            Method::POST,
            &format!("/interactions/{interaction_id}/{interaction_token}/callback"),
            Some(data),
        )
        .await
    }

    pub async fn edit_original_interaction_response(
        &self,
        application_id: Snowflake,
        interaction_token: &str,
        data: &Value,
    ) -> RestResult<Value> {
        self.request_as(
            Method::PATCH,
            &format!("/webhooks/{application_id}/{interaction_token}/messages/@original"),
            Some(data),
        )
        .await
    }

    pub async fn register_command(
        &self,
        application_id: Snowflake,
        command: &Value,
        scope: CommandScope,
    ) -> RestResult<Value> {
        self.request_as(Method::POST, &scope.path(application_id), Some(command))
            .await
    }

    pub async fn get_commands(
        &self,
        application_id: Snowflake,
        scope: CommandScope,
    ) -> RestResult<Vec<Value>> {
        self.request_as(Method::GET, &scope.path(application_id), None).await
    }

    /// Replace every command in `scope` with `commands`
    pub async fn bulk_overwrite_commands(
        &self,
        application_id: Snowflake,
        commands: &[Value],
        scope: CommandScope,
    ) -> RestResult<Vec<Value>> {
        let body = Value::Array(commands.to_vec());
        self.request_as(Method::PUT, &scope.path(application_id), Some(&body))
            .await
    }
}
