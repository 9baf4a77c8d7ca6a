use super::{DeliveryQueue, SessionState};
use crate::infrastructure::TaskManager;
use crate::transport::{ClientConnection, UpstreamConnection};
use crate::types::constants::error_types;
use crate::types::{RelayError, RelayMessage, Result};
use futures::stream::SplitSink;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{watch, RwLock};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

/// Mutable state of one session, serialized behind a single lock.
///
/// All state transitions and queue mutations go through this struct, so no
/// two writers can interleave and break FIFO ordering.
struct SessionShared {
    state: SessionState,
    queue: DeliveryQueue,
    tasks: TaskManager,
}

/// One client-to-upstream paired connection lifecycle.
///
/// The session owns both transport handles and the delivery queue. Client
/// frames are normalized (internal fields stripped, `event_id` assigned)
/// and forwarded upstream, queueing while the upstream handshake is still
/// in flight. Upstream frames pass through to the client verbatim. Either
/// side closing tears down the pair.
#[derive(Clone)]
pub struct Session {
    id: Uuid,
    client: Arc<ClientConnection>,
    upstream: Arc<UpstreamConnection>,
    shared: Arc<RwLock<SessionShared>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Session {
    pub fn new(queue_bound: usize) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            client: Arc::new(ClientConnection::new()),
            upstream: Arc::new(UpstreamConnection::new()),
            shared: Arc::new(RwLock::new(SessionShared {
                state: SessionState::Pending,
                queue: DeliveryQueue::new(queue_bound),
                tasks: TaskManager::new(),
            })),
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn state(&self) -> SessionState {
        self.shared.read().await.state
    }

    pub async fn queue_len(&self) -> usize {
        self.shared.read().await.queue.len()
    }

    /// Installs the write half of the accepted client connection.
    pub async fn attach_client(
        &self,
        writer: SplitSink<WebSocketStream<TcpStream>, Message>,
    ) {
        self.client.open(writer).await;
    }

    /// Installs the write half of the upstream connection. The session
    /// stays `Pending` until [`on_upstream_open`](Self::on_upstream_open).
    pub async fn attach_upstream(
        &self,
        writer: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
    ) {
        self.upstream.open(writer).await;
    }

    /// Spawns a background task tied to this session's lifetime.
    pub async fn spawn_task<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.shared.write().await.tasks.spawn(future);
    }

    /// Receiver that resolves once the session starts tearing down.
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Aborts any session task that has not exited on its own. Called by
    /// the session owner after shutdown, never from inside a tracked task.
    pub async fn reap_tasks(&self) {
        self.shared.write().await.tasks.abort_all();
    }

    /// Handles one raw frame from the client.
    ///
    /// Malformed frames are answered with a single error frame and never
    /// tear the session down. Well-formed frames are normalized, then
    /// forwarded immediately when the session is `Open` or queued in any
    /// other state. A fatal error (queue overflow, upstream transport
    /// failure) is returned to the caller, which terminates the session.
    pub async fn on_client_message(&self, raw: &str) -> Result<()> {
        let mut message = match RelayMessage::from_text(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(session = %self.id, "Malformed client frame: {}", e);
                self.send_error_frame(
                    error_types::INVALID_REQUEST,
                    "Error processing message",
                    e.code(),
                )
                .await;
                return Ok(());
            }
        };

        message.strip_internal_fields();
        message.ensure_event_id();

        let mut shared = self.shared.write().await;
        // Direct send only when nothing is queued ahead of this frame,
        // otherwise FIFO order would be violated.
        if shared.state == SessionState::Open && shared.queue.is_empty() {
            let text = message.to_text()?;
            match self.upstream.send_text(text).await {
                Ok(()) => {
                    tracing::debug!(session = %self.id, "Relayed {:?} upstream", message.kind);
                    Ok(())
                }
                // The upstream went away between state check and send;
                // queue so the frame is not lost.
                Err(RelayError::NotConnected) => shared.queue.enqueue(message),
                Err(e) => Err(e),
            }
        } else {
            tracing::debug!(
                session = %self.id,
                "Queueing {:?} ({} queued)",
                message.kind,
                shared.queue.len() + 1
            );
            shared.queue.enqueue(message)
        }
    }

    /// Handles one raw frame from the upstream: pass-through, unmodified.
    pub async fn on_upstream_message(&self, raw: String) -> Result<()> {
        self.client.send_text(raw).await
    }

    /// Marks the upstream leg open and drains the delivery queue in FIFO
    /// order, one send per message. A failed send halts the drain and
    /// re-queues the message at the head; actual transport death is
    /// observed by the upstream reader, which triggers teardown.
    pub async fn on_upstream_open(&self) -> Result<()> {
        let mut shared = self.shared.write().await;
        if !shared.state.can_transition_to(SessionState::Open) {
            tracing::debug!(
                session = %self.id,
                "Upstream opened in state {:?}, ignoring",
                shared.state
            );
            return Ok(());
        }
        shared.state = SessionState::Open;
        tracing::info!(session = %self.id, "Session open");

        if !shared.queue.is_empty() {
            tracing::debug!(
                session = %self.id,
                "Draining {} queued message(s)",
                shared.queue.len()
            );
        }
        while let Some(message) = shared.queue.pop() {
            let text = match message.to_text() {
                Ok(text) => text,
                Err(e) => {
                    shared.queue.requeue_front(message);
                    return Err(e);
                }
            };
            if let Err(e) = self.upstream.send_text(text).await {
                tracing::warn!(
                    session = %self.id,
                    "Drain halted, {} message(s) remain queued: {}",
                    shared.queue.len() + 1,
                    e
                );
                shared.queue.requeue_front(message);
                break;
            }
        }
        Ok(())
    }

    /// Tears down both sides of the session. Closing one transport always
    /// closes the other; the session ends in the terminal `Closed` state.
    /// Idempotent.
    pub async fn close(&self) {
        {
            let mut shared = self.shared.write().await;
            if shared.state.is_terminal() {
                return;
            }
            if shared.state.can_transition_to(SessionState::Closing) {
                shared.state = SessionState::Closing;
            }
        }

        if let Err(e) = self.client.close().await {
            tracing::debug!(session = %self.id, "Client close failed: {}", e);
        }
        if let Err(e) = self.upstream.close().await {
            tracing::debug!(session = %self.id, "Upstream close failed: {}", e);
        }

        let _ = self.shutdown_tx.send(true);

        let mut shared = self.shared.write().await;
        shared.state = SessionState::Closed;
        tracing::info!(session = %self.id, "Session closed");
    }

    /// Surfaces a fatal session error to the client and tears down.
    pub async fn fail(&self, error: &RelayError) {
        tracing::warn!(session = %self.id, "Session failed: {}", error);
        let error_type = match error {
            RelayError::Parse(_) => error_types::INVALID_REQUEST,
            _ => error_types::RELAY_ERROR,
        };
        self.send_error_frame(error_type, &error.to_string(), error.code())
            .await;
        self.close().await;
    }

    async fn send_error_frame(&self, error_type: &str, message: &str, code: &str) {
        let frame = RelayMessage::error_frame(error_type, message, code);
        match frame.to_text() {
            Ok(text) => {
                if let Err(e) = self.client.send_text(text).await {
                    tracing::debug!(session = %self.id, "Could not deliver error frame: {}", e);
                }
            }
            Err(e) => tracing::debug!(session = %self.id, "Could not encode error frame: {}", e),
        }
    }
}
