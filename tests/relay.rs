use futures::{SinkExt, StreamExt};
use realtime_relay::{RelayConfig, RelayServer, StaticTokenProvider};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, accept_hdr_async, connect_async};

const WAIT: Duration = Duration::from_secs(5);

async fn upstream_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Starts a relay wired to the given upstream, with a static credential
/// provider so no HTTP token mint is involved.
async fn spawn_relay(upstream_addr: SocketAddr, queue_bound: usize) -> SocketAddr {
    let config = RelayConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        upstream_url: format!("ws://{}", upstream_addr),
        queue_bound,
        ..Default::default()
    };
    let server = RelayServer::bind_with_provider(
        config,
        Arc::new(StaticTokenProvider::new("ek_test")),
    )
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

#[tokio::test]
async fn queued_frames_flush_in_order_with_fields_normalized() {
    let (listener, upstream_addr) = upstream_listener().await;
    let gate = Arc::new(Notify::new());
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();

    // Accept the TCP connection but hold the WebSocket handshake until the
    // gate opens, so client frames have to sit in the delivery queue.
    let upstream_gate = Arc::clone(&gate);
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        upstream_gate.notified().await;
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(Message::Text(text))) = ws.next().await {
            frames_tx.send(text).unwrap();
        }
    });

    let relay_addr = spawn_relay(upstream_addr, 64).await;
    let (mut client, _) = connect_async(format!("ws://{}", relay_addr)).await.unwrap();

    client
        .send(Message::Text(
            r#"{"type":"conversation.item.create","item":{"id":"i1"},"isProcessing":true}"#.into(),
        ))
        .await
        .unwrap();
    client
        .send(Message::Text(
            r#"{"type":"response.create","event_id":"evt_client"}"#.into(),
        ))
        .await
        .unwrap();
    client
        .send(Message::Text(r#"{"type":"audio.start"}"#.into()))
        .await
        .unwrap();

    // Let the frames reach the relay before the upstream opens.
    tokio::time::sleep(Duration::from_millis(200)).await;
    gate.notify_one();

    let mut received = Vec::new();
    for _ in 0..3 {
        let raw = timeout(WAIT, frames_rx.recv()).await.unwrap().unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert!(
            !raw.contains("isProcessing"),
            "internal field leaked upstream: {}",
            raw
        );
        received.push(value);
    }

    // FIFO order survives the queue.
    assert_eq!(received[0]["type"], "conversation.item.create");
    assert_eq!(received[1]["type"], "response.create");
    assert_eq!(received[2]["type"], "audio.start");

    // Payload passes through unmodified, event ids are populated.
    assert_eq!(received[0]["item"]["id"], "i1");
    assert!(received[0]["event_id"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(received[1]["event_id"], "evt_client");
    assert!(received[2]["event_id"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn client_close_tears_down_upstream() {
    let (listener, upstream_addr) = upstream_listener().await;
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel::<()>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    frames_tx.send(text).unwrap();
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            }
        }
        closed_tx.send(()).unwrap();
    });

    let relay_addr = spawn_relay(upstream_addr, 64).await;
    let (mut client, _) = connect_async(format!("ws://{}", relay_addr)).await.unwrap();

    // Make sure the session is fully open before closing.
    client
        .send(Message::Text(r#"{"type":"audio.start"}"#.into()))
        .await
        .unwrap();
    timeout(WAIT, frames_rx.recv()).await.unwrap().unwrap();

    client.close(None).await.unwrap();
    timeout(WAIT, closed_rx.recv())
        .await
        .expect("upstream connection should close when the client disconnects")
        .unwrap();
}

#[tokio::test]
async fn upstream_drop_closes_client() {
    let (listener, upstream_addr) = upstream_listener().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();
    });

    let relay_addr = spawn_relay(upstream_addr, 64).await;
    let (mut client, _) = connect_async(format!("ws://{}", relay_addr)).await.unwrap();

    loop {
        match timeout(WAIT, client.next())
            .await
            .expect("client should observe the close")
        {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(_)) => break,
        }
    }
}

#[tokio::test]
async fn malformed_frame_gets_error_and_session_survives() {
    let (listener, upstream_addr) = upstream_listener().await;
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(Message::Text(text))) = ws.next().await {
            frames_tx.send(text).unwrap();
        }
    });

    let relay_addr = spawn_relay(upstream_addr, 64).await;
    let (mut client, _) = connect_async(format!("ws://{}", relay_addr)).await.unwrap();

    client
        .send(Message::Text("this is not json".into()))
        .await
        .unwrap();

    let raw = loop {
        match timeout(WAIT, client.next()).await.unwrap() {
            Some(Ok(Message::Text(text))) => break text,
            Some(Ok(_)) => {}
            other => panic!("expected an error frame, got {:?}", other),
        }
    };
    let frame: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["error"]["type"], "invalid_request_error");
    assert_eq!(frame["error"]["code"], "processing_error");
    assert!(frame["event_id"].as_str().is_some_and(|id| !id.is_empty()));

    // The session is still relaying.
    client
        .send(Message::Text(r#"{"type":"response.create"}"#.into()))
        .await
        .unwrap();
    let forwarded = timeout(WAIT, frames_rx.recv()).await.unwrap().unwrap();
    let forwarded: Value = serde_json::from_str(&forwarded).unwrap();
    assert_eq!(forwarded["type"], "response.create");
}

#[tokio::test]
async fn queue_overflow_terminates_session_with_error_frame() {
    let (listener, upstream_addr) = upstream_listener().await;
    let gate = Arc::new(Notify::new());

    // The upstream never completes its handshake, so every client frame
    // stays queued.
    let upstream_gate = Arc::clone(&gate);
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        upstream_gate.notified().await;
        drop(stream);
    });

    let relay_addr = spawn_relay(upstream_addr, 2).await;
    let (mut client, _) = connect_async(format!("ws://{}", relay_addr)).await.unwrap();

    for _ in 0..3 {
        client
            .send(Message::Text(r#"{"type":"audio.start"}"#.into()))
            .await
            .unwrap();
    }

    let raw = loop {
        match timeout(WAIT, client.next()).await.unwrap() {
            Some(Ok(Message::Text(text))) => break text,
            Some(Ok(_)) => {}
            other => panic!("expected an error frame, got {:?}", other),
        }
    };
    let frame: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["error"]["code"], "queue_overflow");

    // The session is torn down after the overflow.
    loop {
        match timeout(WAIT, client.next())
            .await
            .expect("connection should close after overflow")
        {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(_)) => break,
        }
    }
    gate.notify_one();
}

#[tokio::test]
async fn client_supplied_token_reaches_upstream_as_bearer() {
    let (listener, upstream_addr) = upstream_listener().await;
    let (auth_tx, mut auth_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = |request: &tokio_tungstenite::tungstenite::handshake::server::Request,
                        response: tokio_tungstenite::tungstenite::handshake::server::Response|
         -> Result<
            tokio_tungstenite::tungstenite::handshake::server::Response,
            tokio_tungstenite::tungstenite::handshake::server::ErrorResponse,
        > {
            let auth = request
                .headers()
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();
            auth_tx.send(auth).unwrap();
            Ok(response)
        };
        let mut ws = accept_hdr_async(stream, callback).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let relay_addr = spawn_relay(upstream_addr, 64).await;
    let (_client, _) = connect_async(format!("ws://{}/?token=ek_from_client", relay_addr))
        .await
        .unwrap();

    let auth = timeout(WAIT, auth_rx.recv()).await.unwrap().unwrap();
    assert_eq!(auth, "Bearer ek_from_client");
}

#[tokio::test]
async fn idle_timeout_closes_session() {
    let (listener, upstream_addr) = upstream_listener().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let config = RelayConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        upstream_url: format!("ws://{}", upstream_addr),
        idle_timeout: Some(Duration::from_millis(200)),
        ..Default::default()
    };
    let server = RelayServer::bind_with_provider(
        config,
        Arc::new(StaticTokenProvider::new("ek_test")),
    )
    .await
    .unwrap();
    let relay_addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    let (mut client, _) = connect_async(format!("ws://{}", relay_addr)).await.unwrap();

    loop {
        match timeout(WAIT, client.next())
            .await
            .expect("idle session should be closed by the relay")
        {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(_)) => break,
        }
    }
}
