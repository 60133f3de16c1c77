//! Connection supervisor
//!
//! Owns one shard's socket: connects, runs the handshake and heartbeat, and reconnects
//! until told to shut down or the remote closes with a fatal code.

use super::{ConnectionState, GatewayCommand, GatewayHandle, Handshake, Session, SessionSnapshot};
use crate::error::{GatewayError, GatewayResult};
use crate::events::{EventBus, GatewayEvent};
use crate::handlers::{Action, FrameDispatcher, HeartbeatHandler};
use crate::protocol::{CloseCode, CloseDisposition, GatewayPayload};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use nya_common::GatewayConfig;
use nya_core::ShardInfo;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Close code sent on shutdown
const NORMAL_CLOSE: u16 = 1000;

/// Close code sent when dropping a socket we intend to resume
const RESUMABLE_CLOSE: u16 = 4000;

/// Buffered application commands
const COMMAND_BUFFER_SIZE: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// How a socket ended
#[derive(Debug)]
enum Outcome {
    Shutdown,
    Reconnect { code: Option<u16> },
    Fatal(CloseCode),
}

/// One thing the connection reacts to
enum Input {
    Frame(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
    HeartbeatTick,
    Handshake(Handshake),
    Command(GatewayCommand),
    Shutdown,
}

/// Timers that live only as long as one socket
#[derive(Default)]
struct SocketTimers {
    heartbeat: Option<Interval>,
    handshake: Option<(Instant, Handshake)>,
}

/// Gateway connection state machine for one shard
///
/// Reacts to one frame or timer at a time. Dropping the future returned by
/// [`run`](Self::run) cancels every timer with it.
pub struct ConnectionSupervisor {
    config: Arc<GatewayConfig>,
    session: Session,
    events: EventBus<GatewayEvent>,
    commands: mpsc::Receiver<GatewayCommand>,
    shutdown: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl ConnectionSupervisor {
    /// Create a supervisor and the handle that controls it
    pub fn new(
        config: Arc<GatewayConfig>,
        shard: ShardInfo,
        events: EventBus<GatewayEvent>,
    ) -> (Self, GatewayHandle) {
        let session = Session::new(shard);
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let shutdown = Arc::new(shutdown);
        let (snapshot, snapshot_rx) = watch::channel(session.snapshot());

        let handle = GatewayHandle {
            commands: commands_tx,
            shutdown: Arc::clone(&shutdown),
            snapshot: snapshot_rx,
        };

        let supervisor = Self {
            config,
            session,
            events,
            commands,
            shutdown,
            shutdown_rx,
            snapshot,
        };

        (supervisor, handle)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run until shutdown (`Ok`) or a fatal close (`Err`)
    ///
    /// Every other disconnect is followed by the fixed reconnect delay and a new socket
    /// that resumes when it can.
    pub async fn run(mut self) -> GatewayResult<()> {
        let shard = self.session.shard();
        tracing::info!(shard = %shard, url = %self.config.url, "Starting gateway connection");

        let result = loop {
            if *self.shutdown_rx.borrow() {
                break Ok(());
            }

            let url = self.session.connect_url(&self.config.url);
            self.session.begin_connect();
            self.publish_snapshot();

            tracing::debug!(shard = %shard, url = %url, "Connecting");

            let connected = tokio::select! {
                () = shutdown_requested(&mut self.shutdown_rx) => None,
                result = tokio_tungstenite::connect_async(url.as_str()) => Some(result),
            };

            let outcome = match connected {
                None => Outcome::Shutdown,
                Some(Ok((stream, _response))) => self.drive(stream).await,
                Some(Err(e)) => {
                    tracing::warn!(shard = %shard, error = %e, "Failed to connect");
                    Outcome::Reconnect { code: None }
                }
            };

            match outcome {
                Outcome::Shutdown => break Ok(()),
                Outcome::Fatal(code) => {
                    tracing::error!(
                        shard = %shard,
                        code = code.as_u16(),
                        reason = code.description(),
                        "Fatal close, not reconnecting"
                    );
                    self.events.publish(GatewayEvent::Disconnected {
                        code: Some(code.as_u16()),
                    });
                    break Err(GatewayError::FatalClose(code));
                }
                Outcome::Reconnect { code } => {
                    self.session.prepare_reconnect();
                    self.publish_snapshot();
                    self.events.publish(GatewayEvent::Disconnected { code });

                    let delay = self.config.reconnect_delay;
                    tracing::info!(
                        shard = %shard,
                        code = ?code,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting"
                    );

                    tokio::select! {
                        () = shutdown_requested(&mut self.shutdown_rx) => break Ok(()),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        };

        self.session.set_state(ConnectionState::Disconnected);
        self.publish_snapshot();
        tracing::info!(shard = %shard, "Gateway connection stopped");
        result
    }

    /// Serve one socket until it ends
    async fn drive(&mut self, ws: WsStream) -> Outcome {
        let (mut sink, mut stream) = ws.split();
        let mut timers = SocketTimers::default();

        self.session.set_state(ConnectionState::AwaitingHello);
        self.publish_snapshot();
        self.events.publish(GatewayEvent::Connected);

        loop {
            let ready = self.session.state().is_ready();
            let input = tokio::select! {
                frame = stream.next() => Input::Frame(frame),
                () = next_tick(&mut timers.heartbeat) => Input::HeartbeatTick,
                kind = handshake_due(timers.handshake) => Input::Handshake(kind),
                Some(command) = self.commands.recv(), if ready => Input::Command(command),
                () = shutdown_requested(&mut self.shutdown_rx) => Input::Shutdown,
            };

            let flow = match input {
                Input::Frame(frame) => self.on_frame(frame, &mut sink, &mut timers).await,
                Input::HeartbeatTick => {
                    let actions = HeartbeatHandler::tick(&mut self.session, Instant::now());
                    self.apply(actions, &mut sink, &mut timers).await
                }
                Input::Handshake(kind) => {
                    timers.handshake = None;
                    match self.session.handshake(kind, &self.config) {
                        Ok(frame) => self.apply(vec![Action::Send(frame)], &mut sink, &mut timers).await,
                        Err(e) => {
                            tracing::error!(shard = %self.session.shard(), error = %e, "Failed to encode handshake");
                            close(&mut sink, RESUMABLE_CLOSE).await;
                            ControlFlow::Break(Outcome::Reconnect { code: None })
                        }
                    }
                }
                Input::Command(command) => match command.to_payload() {
                    Ok(frame) => self.apply(vec![Action::Send(frame)], &mut sink, &mut timers).await,
                    Err(e) => {
                        tracing::warn!(shard = %self.session.shard(), error = %e, "Dropping command");
                        ControlFlow::Continue(())
                    }
                },
                Input::Shutdown => {
                    close(&mut sink, NORMAL_CLOSE).await;
                    self.events.publish(GatewayEvent::Disconnected {
                        code: Some(NORMAL_CLOSE),
                    });
                    ControlFlow::Break(Outcome::Shutdown)
                }
            };

            self.publish_snapshot();

            if let ControlFlow::Break(outcome) = flow {
                return outcome;
            }
        }
    }

    async fn on_frame(
        &mut self,
        frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
        sink: &mut WsSink,
        timers: &mut SocketTimers,
    ) -> ControlFlow<Outcome> {
        let shard = self.session.shard();

        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(close_frame))) => {
                let code = close_frame.map(|f| u16::from(f.code));
                return ControlFlow::Break(self.on_close(code));
            }
            Some(Ok(Message::Binary(_))) => {
                tracing::debug!(shard = %shard, "Ignoring binary frame");
                return ControlFlow::Continue(());
            }
            // Pings are answered by the socket itself
            Some(Ok(_)) => return ControlFlow::Continue(()),
            Some(Err(e)) => {
                tracing::warn!(shard = %shard, error = %e, "WebSocket error");
                return ControlFlow::Break(Outcome::Reconnect { code: None });
            }
            None => {
                tracing::warn!(shard = %shard, "Socket ended without a close frame");
                return ControlFlow::Break(Outcome::Reconnect { code: None });
            }
        };

        let payload = match GatewayPayload::from_json(&text) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(shard = %shard, error = %e, "Failed to parse frame");
                return ControlFlow::Continue(());
            }
        };

        tracing::trace!(shard = %shard, frame = %payload, "Received frame");

        match FrameDispatcher::dispatch(&mut self.session, &self.config, payload, Instant::now()) {
            Ok(actions) => self.apply(actions, sink, timers).await,
            Err(e) if e.requires_reconnect() => {
                tracing::warn!(shard = %shard, error = %e, "Unrecoverable frame, reconnecting");
                close(sink, RESUMABLE_CLOSE).await;
                ControlFlow::Break(Outcome::Reconnect { code: None })
            }
            Err(e) => {
                tracing::warn!(shard = %shard, error = %e, "Handler error");
                ControlFlow::Continue(())
            }
        }
    }

    fn on_close(&self, code: Option<u16>) -> Outcome {
        let shard = self.session.shard();
        match CloseCode::classify(code) {
            CloseDisposition::Fatal => match code.and_then(CloseCode::from_u16) {
                Some(close_code) => Outcome::Fatal(close_code),
                None => Outcome::Reconnect { code },
            },
            CloseDisposition::Resume => {
                tracing::info!(shard = %shard, code = ?code, "Remote closed, resuming");
                Outcome::Reconnect { code }
            }
            CloseDisposition::Fallback => {
                // Unlisted codes are retried; some may in fact be permanent
                tracing::warn!(shard = %shard, code = ?code, "Unrecognized close code, reconnecting");
                Outcome::Reconnect { code }
            }
        }
    }

    async fn apply(
        &mut self,
        actions: Vec<Action>,
        sink: &mut WsSink,
        timers: &mut SocketTimers,
    ) -> ControlFlow<Outcome> {
        let shard = self.session.shard();

        for action in actions {
            match action {
                Action::Send(frame) => {
                    let json = match frame.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!(shard = %shard, error = %e, "Failed to encode frame");
                            continue;
                        }
                    };
                    tracing::trace!(shard = %shard, frame = %frame, "Sending frame");
                    if let Err(e) = sink.send(Message::Text(json)).await {
                        tracing::warn!(shard = %shard, error = %e, "Failed to send frame");
                        return ControlFlow::Break(Outcome::Reconnect { code: None });
                    }
                }
                Action::StartHeartbeat(period) => {
                    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    timers.heartbeat = Some(interval);
                }
                Action::ScheduleHandshake { delay, kind } => {
                    timers.handshake = Some((Instant::now() + delay, kind));
                }
                Action::Reconnect => {
                    close(sink, RESUMABLE_CLOSE).await;
                    return ControlFlow::Break(Outcome::Reconnect { code: None });
                }
                Action::Emit(event) => {
                    self.events.publish(event);
                }
            }
        }

        ControlFlow::Continue(())
    }

    fn publish_snapshot(&self) {
        self.snapshot.send_replace(self.session.snapshot());
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        // Handles outliving the supervisor report it as shut down
        self.shutdown.send_replace(true);
    }
}

/// Send a close frame and flush; errors are irrelevant since the socket is going away
async fn close(sink: &mut WsSink, code: u16) {
    let frame = CloseFrame {
        code: WsCloseCode::from(code),
        reason: "".into(),
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
    let _ = sink.close().await;
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    // The sender lives in the supervisor, so this only returns on a real shutdown
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn handshake_due(pending: Option<(Instant, Handshake)>) -> Handshake {
    match pending {
        Some((at, kind)) => {
            tokio::time::sleep_until(at).await;
            kind
        }
        None => std::future::pending().await,
    }
}
