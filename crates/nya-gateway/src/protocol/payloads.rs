//! Payload definitions
//!
//! The `d` field of each gateway frame the client sends or interprets.

use nya_common::ClientProperties;
use nya_core::{Intents, ShardInfo, Snowflake};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload for op 10 (Hello)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

/// Payload for op 2 (Identify)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
    pub intents: Intents,
    pub properties: IdentifyProperties,
    /// Payload compression is never requested
    pub compress: bool,
    pub shard: ShardInfo,
}

/// Client connection properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl From<&ClientProperties> for IdentifyProperties {
    fn from(props: &ClientProperties) -> Self {
        Self {
            os: props.os.clone(),
            browser: props.browser.clone(),
            device: props.device.clone(),
        }
    }
}

/// Payload for op 6 (Resume)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    /// Last sequence number received
    pub seq: Option<u64>,
}

/// Online status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Online,
    Idle,
    Dnd,
    Invisible,
    Offline,
}

/// Payload for op 3 (Presence Update)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresenceUpdate {
    /// Unix time (ms) the client went idle
    pub since: Option<u64>,
    #[serde(default)]
    pub activities: Vec<Value>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub afk: bool,
}

/// Payload for op 8 (Request Guild Members)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestGuildMembers {
    pub guild_id: Snowflake,
    /// Username prefix; empty string requests everyone
    #[serde(default)]
    pub query: String,
    /// Maximum members to send; 0 means no limit
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub presences: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<Snowflake>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl RequestGuildMembers {
    /// Request every member of a guild
    pub fn all(guild_id: Snowflake) -> Self {
        Self {
            guild_id,
            query: String::new(),
            limit: 0,
            presences: false,
            user_ids: None,
            nonce: None,
        }
    }
}

/// Guild listed in the Ready payload before its GUILD_CREATE arrives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnavailableGuild {
    pub id: Snowflake,
    #[serde(default)]
    pub unavailable: bool,
}

/// `d` of the READY dispatch (fields the connection itself needs)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyPayload {
    pub session_id: String,
    /// Endpoint to use for resuming this session
    pub resume_gateway_url: Option<String>,
    #[serde(default)]
    pub user: Value,
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
    pub shard: Option<ShardInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identify_payload_shape() {
        let payload = IdentifyPayload {
            token: "abc".to_string(),
            intents: Intents::GUILDS | Intents::GUILD_MESSAGES,
            properties: IdentifyProperties {
                os: "linux".to_string(),
                browser: "nya".to_string(),
                device: "nya".to_string(),
            },
            compress: false,
            shard: ShardInfo::new(1, 2),
        };

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "token": "abc",
                "intents": 513,
                "properties": {"os": "linux", "browser": "nya", "device": "nya"},
                "compress": false,
                "shard": [1, 2]
            })
        );
    }

    #[test]
    fn test_resume_payload_shape() {
        let payload = ResumePayload {
            token: "abc".to_string(),
            session_id: "s1".to_string(),
            seq: Some(42),
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"token": "abc", "session_id": "s1", "seq": 42})
        );
    }

    #[test]
    fn test_presence_defaults() {
        let presence: PresenceUpdate = serde_json::from_value(json!({"since": null})).unwrap();
        assert_eq!(presence.status, Status::Online);
        assert!(!presence.afk);

        let json = serde_json::to_value(PresenceUpdate {
            status: Status::Dnd,
            ..PresenceUpdate::default()
        })
        .unwrap();
        assert_eq!(json["status"], "dnd");
    }

    #[test]
    fn test_request_members_skips_absent_fields() {
        let json = serde_json::to_value(RequestGuildMembers::all(Snowflake::new(9))).unwrap();
        assert_eq!(
            json,
            json!({"guild_id": "9", "query": "", "limit": 0, "presences": false})
        );
    }

    #[test]
    fn test_ready_payload_parse() {
        let ready: ReadyPayload = serde_json::from_value(json!({
            "v": 10,
            "session_id": "abc",
            "resume_gateway_url": "wss://resume.example",
            "user": {"id": "1", "username": "nya"},
            "guilds": [{"id": "10", "unavailable": true}, {"id": "11"}],
            "shard": [0, 1]
        }))
        .unwrap();

        assert_eq!(ready.session_id, "abc");
        assert_eq!(ready.resume_gateway_url.as_deref(), Some("wss://resume.example"));
        assert_eq!(ready.guilds.len(), 2);
        assert!(!ready.guilds[1].unavailable);
        assert_eq!(ready.shard, Some(ShardInfo::single()));
    }
}
