//! Session bookkeeping
//!
//! Everything a connection remembers across sockets: the sequence counter, the resumable
//! session id and the heartbeat liveness flags.

use super::ConnectionState;
use crate::protocol::{
    GatewayPayload, IdentifyPayload, IdentifyProperties, ReadyPayload, ResumePayload,
};
use nya_common::GatewayConfig;
use nya_core::ShardInfo;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Which handshake a fresh socket performs after Hello
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    Identify,
    Resume,
}

/// Mutable session state owned by one connection
#[derive(Debug, Clone)]
pub struct Session {
    shard: ShardInfo,
    state: ConnectionState,
    sequence: Option<u64>,
    session_id: Option<String>,
    resume_url: Option<String>,
    heartbeat_interval: Option<Duration>,
    heartbeat_ack_pending: bool,
    last_heartbeat_sent: Option<Instant>,
    latency: Option<Duration>,
    reconnecting: bool,
}

/// Read-only view of a [`Session`], published to handles
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    pub shard: Option<ShardInfo>,
    pub state: ConnectionState,
    pub sequence: Option<u64>,
    pub session_id: Option<String>,
    pub resume_url: Option<String>,
    #[serde(skip)]
    pub latency: Option<Duration>,
}

impl Session {
    pub fn new(shard: ShardInfo) -> Self {
        Self {
            shard,
            state: ConnectionState::Disconnected,
            sequence: None,
            session_id: None,
            resume_url: None,
            heartbeat_interval: None,
            heartbeat_ack_pending: false,
            last_heartbeat_sent: None,
            latency: None,
            reconnecting: false,
        }
    }

    // === Accessors ===

    pub fn shard(&self) -> ShardInfo {
        self.shard
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn resume_url(&self) -> Option<&str> {
        self.resume_url.as_deref()
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval
    }

    pub fn heartbeat_ack_pending(&self) -> bool {
        self.heartbeat_ack_pending
    }

    /// Round trip of the last acknowledged heartbeat
    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::trace!(shard = %self.shard, from = %self.state, to = %state, "State change");
            self.state = state;
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            shard: Some(self.shard),
            state: self.state,
            sequence: self.sequence,
            session_id: self.session_id.clone(),
            resume_url: self.resume_url.clone(),
            latency: self.latency,
        }
    }

    // === Connect ===

    /// Endpoint for the next socket: the resume URL when known, else the default
    ///
    /// The resume URL is handed out bare, so the default endpoint's query string
    /// (version, encoding) is carried over.
    pub fn connect_url(&self, default_url: &str) -> String {
        let Some(resume_url) = self.resume_url.as_deref() else {
            return default_url.to_string();
        };
        if resume_url.contains('?') {
            return resume_url.to_string();
        }
        match default_url.split_once('?') {
            Some((_, query)) => format!("{}/?{query}", resume_url.trim_end_matches('/')),
            None => resume_url.to_string(),
        }
    }

    /// A new socket is being opened
    pub fn begin_connect(&mut self) {
        self.heartbeat_ack_pending = false;
        self.last_heartbeat_sent = None;
        self.set_state(ConnectionState::Connecting);
    }

    /// The socket was lost and a new one will follow
    pub fn prepare_reconnect(&mut self) {
        self.reconnecting = true;
        self.heartbeat_ack_pending = false;
        self.last_heartbeat_sent = None;
        self.set_state(ConnectionState::Reconnecting);
    }

    // === Handshake ===

    /// Resume only on a reconnect with a live session id
    pub fn handshake_kind(&self) -> Handshake {
        if self.reconnecting && self.session_id.is_some() {
            Handshake::Resume
        } else {
            Handshake::Identify
        }
    }

    pub fn on_hello(&mut self, heartbeat_interval: Duration) {
        self.heartbeat_interval = Some(heartbeat_interval);
    }

    /// Build the handshake frame and move into the matching state
    ///
    /// Falls back to Identify when a resume was requested without a session id.
    pub fn handshake(
        &mut self,
        kind: Handshake,
        config: &GatewayConfig,
    ) -> Result<GatewayPayload, serde_json::Error> {
        if let (Handshake::Resume, Some(session_id)) = (kind, self.session_id.clone()) {
            self.set_state(ConnectionState::Resuming);
            return GatewayPayload::resume(&ResumePayload {
                token: config.token.expose().to_string(),
                session_id,
                seq: self.sequence,
            });
        }

        // A fresh session numbers its events from scratch
        self.sequence = None;
        self.set_state(ConnectionState::Identifying);
        GatewayPayload::identify(&IdentifyPayload {
            token: config.token.expose().to_string(),
            intents: config.intents,
            properties: IdentifyProperties::from(&config.properties),
            compress: false,
            shard: self.shard,
        })
    }

    /// Drop the session so the next handshake identifies
    pub fn invalidate(&mut self) {
        self.session_id = None;
        self.resume_url = None;
    }

    // === Inbound ===

    /// Record a frame's sequence number
    ///
    /// Frames without one leave the counter untouched; it never moves backwards.
    pub fn observe_sequence(&mut self, sequence: Option<u64>) {
        if let Some(seq) = sequence {
            self.sequence = Some(self.sequence.map_or(seq, |current| current.max(seq)));
        }
    }

    pub fn on_ready(&mut self, ready: &ReadyPayload) {
        self.session_id = Some(ready.session_id.clone());
        self.resume_url.clone_from(&ready.resume_gateway_url);
        self.reconnecting = false;
        self.set_state(ConnectionState::Ready);
    }

    pub fn on_resumed(&mut self) {
        self.reconnecting = false;
        self.set_state(ConnectionState::Ready);
    }

    // === Heartbeat ===

    /// Mark a heartbeat as sent and awaiting its ack
    pub fn heartbeat_sent(&mut self, now: Instant) {
        self.heartbeat_ack_pending = true;
        self.last_heartbeat_sent = Some(now);
    }

    /// Clear the pending flag; returns the measured round trip
    pub fn heartbeat_acked(&mut self, now: Instant) -> Option<Duration> {
        self.heartbeat_ack_pending = false;
        let latency = self.last_heartbeat_sent.map(|sent| now.saturating_duration_since(sent));
        if latency.is_some() {
            self.latency = latency;
        }
        latency
    }
}
