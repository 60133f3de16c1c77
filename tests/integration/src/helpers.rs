//! Test helpers for integration tests
//!
//! [`MockGateway`] accepts WebSocket connections on a local port and hands each one to
//! the test, which then plays the remote side frame by frame.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// How long a test waits for any single step
pub const STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Local gateway server
pub struct MockGateway {
    pub addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<MockConnection>,
    _handle: JoinHandle<()>,
}

impl MockGateway {
    /// Start listening on a random local port
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, connections) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => {
                        if tx.send(MockConnection { ws }).is_err() {
                            break;
                        }
                    }
                    Err(e) => eprintln!("mock gateway handshake failed: {e}"),
                }
            }
        });

        Ok(Self {
            addr,
            connections,
            _handle: handle,
        })
    }

    /// Endpoint in the form clients are configured with
    pub fn url(&self) -> String {
        format!("ws://{}/?v=10&encoding=json", self.addr)
    }

    /// Base address without query, as handed out in READY
    pub fn resume_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Wait for the next client connection
    pub async fn accept(&mut self) -> Result<MockConnection> {
        tokio::time::timeout(STEP_TIMEOUT, self.connections.recv())
            .await
            .map_err(|_| anyhow!("no connection within {STEP_TIMEOUT:?}"))?
            .ok_or_else(|| anyhow!("mock gateway stopped"))
    }

    /// Assert that no client connects within `wait`
    pub async fn expect_no_connection(&mut self, wait: Duration) -> Result<()> {
        match tokio::time::timeout(wait, self.connections.recv()).await {
            Ok(Some(_)) => bail!("unexpected connection"),
            _ => Ok(()),
        }
    }
}

/// Server side of one client socket
pub struct MockConnection {
    ws: WebSocketStream<TcpStream>,
}

/// What the client sent next
#[derive(Debug)]
pub enum ClientFrame {
    Json(Value),
    Close(Option<u16>),
}

impl MockConnection {
    pub async fn send_json(&mut self, value: &Value) -> Result<()> {
        self.ws.send(Message::Text(value.to_string())).await?;
        Ok(())
    }

    /// Next text or close frame from the client
    pub async fn next_frame(&mut self) -> Result<ClientFrame> {
        loop {
            let message = tokio::time::timeout(STEP_TIMEOUT, self.ws.next())
                .await
                .map_err(|_| anyhow!("no frame within {STEP_TIMEOUT:?}"))?
                .ok_or_else(|| anyhow!("client hung up"))??;

            match message {
                Message::Text(text) => return Ok(ClientFrame::Json(serde_json::from_str(&text)?)),
                Message::Close(frame) => return Ok(ClientFrame::Close(frame.map(|f| u16::from(f.code)))),
                _ => {}
            }
        }
    }

    /// Next JSON frame; fails on close
    pub async fn recv_json(&mut self) -> Result<Value> {
        match self.next_frame().await? {
            ClientFrame::Json(value) => Ok(value),
            ClientFrame::Close(code) => bail!("client closed with {code:?}"),
        }
    }

    /// Next JSON frame with the given op, skipping heartbeats
    pub async fn recv_op(&mut self, op: u64) -> Result<Value> {
        loop {
            let frame = self.recv_json().await?;
            if frame["op"] == op {
                return Ok(frame);
            }
            if frame["op"] != 1 {
                bail!("expected op {op}, got {frame}");
            }
        }
    }

    /// Wait for the client's close frame
    pub async fn recv_close(&mut self) -> Result<Option<u16>> {
        loop {
            if let ClientFrame::Close(code) = self.next_frame().await? {
                return Ok(code);
            }
        }
    }

    /// Assert the client sends nothing but heartbeats for `wait`
    pub async fn expect_quiet(&mut self, wait: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            match tokio::time::timeout_at(deadline, self.ws.next()).await {
                Err(_) => return Ok(()),
                Ok(Some(Ok(Message::Text(text)))) => {
                    let frame: Value = serde_json::from_str(&text)?;
                    if frame["op"] != 1 {
                        bail!("unexpected frame {frame}");
                    }
                }
                Ok(Some(Ok(_))) => {}
                Ok(other) => bail!("socket ended: {other:?}"),
            }
        }
    }

    /// Close the socket with `code`
    pub async fn close(mut self, code: u16) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        self.ws.close(Some(frame)).await?;
        // drain until the client acknowledges
        while let Ok(Some(Ok(_))) = tokio::time::timeout(STEP_TIMEOUT, self.ws.next()).await {}
        Ok(())
    }
}
