use crate::types::{RelayError, Result};
use futures::stream::SplitSink;
use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Closed,
    Connecting,
    Open,
    Closing,
}

/// Write half of one bidirectional WebSocket connection.
///
/// One generic manager covers both sides of a session: the accepted
/// inbound stream and the TLS outbound stream. The manager never inspects
/// message content; it only sends, closes, and tracks connection state.
pub struct ConnectionManager<S> {
    writer: RwLock<Option<SplitSink<WebSocketStream<S>, Message>>>,
    state: RwLock<TransportState>,
}

/// Inbound connection accepted from the client.
pub type ClientConnection = ConnectionManager<TcpStream>;

/// Outbound connection to the realtime endpoint.
pub type UpstreamConnection = ConnectionManager<MaybeTlsStream<TcpStream>>;

impl<S> ConnectionManager<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new() -> Self {
        Self {
            writer: RwLock::new(None),
            state: RwLock::new(TransportState::Closed),
        }
    }

    /// Installs the write sink after a successful handshake and marks the
    /// connection open.
    pub async fn open(&self, writer: SplitSink<WebSocketStream<S>, Message>) {
        let mut ws = self.writer.write().await;
        *ws = Some(writer);
        drop(ws);
        self.set_state(TransportState::Open).await;
    }

    pub async fn state(&self) -> TransportState {
        *self.state.read().await
    }

    pub async fn set_state(&self, new_state: TransportState) {
        let mut state = self.state.write().await;
        *state = new_state;
    }

    pub async fn is_open(&self) -> bool {
        *self.state.read().await == TransportState::Open
    }

    /// Sends a text frame, failing with [`RelayError::NotConnected`] if the
    /// connection is not open.
    pub async fn send_text(&self, text: String) -> Result<()> {
        if !self.is_open().await {
            return Err(RelayError::NotConnected);
        }

        let mut ws_guard = self.writer.write().await;
        match ws_guard.as_mut() {
            Some(ws) => {
                ws.send(Message::Text(text.into())).await?;
                Ok(())
            }
            None => Err(RelayError::NotConnected),
        }
    }

    /// Closes the connection gracefully. Closing an already-closed
    /// connection is a no-op.
    pub async fn close(&self) -> Result<()> {
        if *self.state.read().await == TransportState::Closed {
            return Ok(());
        }
        self.set_state(TransportState::Closing).await;

        let mut ws_guard = self.writer.write().await;
        if let Some(ws) = ws_guard.as_mut() {
            // The peer may already be gone; a failed close handshake still
            // releases the writer below.
            if let Err(e) = ws.close().await {
                tracing::debug!("close handshake failed: {}", e);
            }
        }
        *ws_guard = None;
        drop(ws_guard);

        self.set_state(TransportState::Closed).await;
        Ok(())
    }
}

impl<S> Default for ConnectionManager<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn default() -> Self {
        Self::new()
    }
}
