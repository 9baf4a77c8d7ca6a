use crate::config::RelayConfig;
use crate::infrastructure::{SessionsTokenProvider, TokenProvider};
use crate::session::Session;
use crate::transport::UpstreamConnector;
use crate::types::constants::TOKEN_QUERY_PARAM;
use crate::types::Result;
use futures::stream::{SplitStream, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, MaybeTlsStream, WebSocketStream};

/// The relay server: accepts client WebSocket connections and pairs each
/// one with an upstream connection for the lifetime of the session.
pub struct RelayServer {
    config: Arc<RelayConfig>,
    provider: Arc<dyn TokenProvider>,
    listener: TcpListener,
}

impl RelayServer {
    /// Binds the listen address with the default sessions-endpoint token
    /// provider.
    pub async fn bind(config: RelayConfig) -> Result<Self> {
        let provider = Arc::new(SessionsTokenProvider::from_config(&config));
        Self::bind_with_provider(config, provider).await
    }

    /// Binds with a caller-supplied token provider.
    pub async fn bind_with_provider(
        config: RelayConfig,
        provider: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).await?;
        Ok(Self {
            config: Arc::new(config),
            provider,
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. Each inbound connection becomes one independent
    /// session on its own task; sessions share no mutable state.
    pub async fn run(self) -> Result<()> {
        tracing::info!("Relay listening on {}", self.listener.local_addr()?);
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let config = Arc::clone(&self.config);
            let provider = Arc::clone(&self.provider);
            tokio::spawn(async move {
                handle_connection(config, provider, stream, peer).await;
            });
        }
    }
}

/// Runs one session from handshake to teardown.
async fn handle_connection(
    config: Arc<RelayConfig>,
    provider: Arc<dyn TokenProvider>,
    stream: TcpStream,
    peer: SocketAddr,
) {
    tracing::info!("Client connected from {}", peer);

    // The client may bring its own ephemeral credential on the URL.
    let mut client_token: Option<String> = None;
    let callback = |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
        client_token = token_from_query(request.uri().query());
        Ok(response)
    };

    let ws = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!("Handshake with {} failed: {}", peer, e);
            return;
        }
    };

    let session = Session::new(config.queue_bound);
    // Subscribe before anything can trigger teardown, so the shutdown
    // signal is never missed.
    let mut shutdown = session.subscribe_shutdown();

    let (write, read) = ws.split();
    session.attach_client(write).await;

    // Start reading from the client before the upstream handshake, so
    // frames sent early land in the delivery queue.
    session
        .spawn_task(client_read_loop(
            session.clone(),
            read,
            config.idle_timeout,
        ))
        .await;

    let token = match client_token {
        Some(token) => token,
        None => match provider.fetch_credential().await {
            Ok(credential) => credential.token,
            Err(e) => {
                session.fail(&e).await;
                reap_after_shutdown(&session, &mut shutdown).await;
                return;
            }
        },
    };

    match UpstreamConnector::connect(&config, &token).await {
        Ok(upstream) => {
            let (write, read) = upstream.split();
            session.attach_upstream(write).await;
            if let Err(e) = session.on_upstream_open().await {
                tracing::warn!(session = %session.id(), "Queue drain failed: {}", e);
            }
            session
                .spawn_task(upstream_read_loop(session.clone(), read))
                .await;
        }
        Err(e) => {
            session.fail(&e).await;
        }
    }

    reap_after_shutdown(&session, &mut shutdown).await;
    tracing::info!("Client {} disconnected", peer);
}

/// Waits for session teardown, then reaps reader tasks that have not
/// exited on their own.
async fn reap_after_shutdown(session: &Session, shutdown: &mut tokio::sync::watch::Receiver<bool>) {
    let _ = shutdown.changed().await;
    tokio::task::yield_now().await;
    session.reap_tasks().await;
}

/// Read loop for the inbound client connection.
async fn client_read_loop(
    session: Session,
    mut read: SplitStream<WebSocketStream<TcpStream>>,
    idle_timeout: Option<Duration>,
) {
    let mut shutdown = session.subscribe_shutdown();
    loop {
        // Recreated each iteration, so the idle clock restarts on every
        // received frame.
        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            _ = idle_wait(idle_timeout) => {
                tracing::info!(session = %session.id(), "Idle timeout reached, closing session");
                session.close().await;
                break;
            }
            frame = read.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                if let Err(e) = session.on_client_message(&text).await {
                    session.fail(&e).await;
                    break;
                }
            }
            Some(Ok(Message::Binary(data))) => {
                // Some clients send JSON in binary frames; anything that is
                // not JSON gets the usual error frame back.
                let text = String::from_utf8_lossy(&data).into_owned();
                if let Err(e) = session.on_client_message(&text).await {
                    session.fail(&e).await;
                    break;
                }
            }
            Some(Ok(Message::Close(_))) | None => {
                tracing::info!(session = %session.id(), "Client closed connection");
                session.close().await;
                break;
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                tracing::error!(session = %session.id(), "Client read error: {}", e);
                session.close().await;
                break;
            }
        }
    }
}

/// Read loop for the outbound upstream connection.
async fn upstream_read_loop(
    session: Session,
    mut read: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
) {
    let mut shutdown = session.subscribe_shutdown();
    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            frame = read.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                if let Err(e) = session.on_upstream_message(text).await {
                    tracing::warn!(session = %session.id(), "Client send failed: {}", e);
                    session.close().await;
                    break;
                }
            }
            Some(Ok(Message::Binary(data))) => {
                tracing::warn!(
                    session = %session.id(),
                    "Unexpected binary frame from upstream ({} bytes)",
                    data.len()
                );
            }
            Some(Ok(Message::Close(_))) | None => {
                tracing::info!(session = %session.id(), "Upstream closed connection");
                session.close().await;
                break;
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                tracing::error!(session = %session.id(), "Upstream read error: {}", e);
                session.close().await;
                break;
            }
        }
    }
}

async fn idle_wait(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

/// Pulls the client-supplied credential off the connection URL, if any.
fn token_from_query(query: Option<&str>) -> Option<String> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == TOKEN_QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}
