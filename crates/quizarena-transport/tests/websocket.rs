//! Integration tests for the WebSocket transport.

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use quizarena_transport::{Connection, Transport, WebSocketTransport};

async fn bind() -> (WebSocketTransport, std::net::SocketAddr) {
    let transport = WebSocketTransport::bind("127.0.0.1:0")
        .await
        .expect("bind must succeed");
    let addr = transport.local_addr().expect("bound address");
    (transport, addr)
}

#[tokio::test]
async fn test_accept_and_receive_text_frame() {
    let (mut transport, addr) = bind().await;

    let client = tokio::spawn(async move {
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client connect");
        ws.send(Message::Text(r#"{"type":"time_up"}"#.to_string().into()))
            .await
            .expect("client send");
        ws
    });

    let conn = transport.accept().await.expect("accept");
    let frame = conn.recv().await.expect("recv").expect("open");
    assert_eq!(frame, r#"{"type":"time_up"}"#);

    let _ws = client.await.unwrap();
}

#[tokio::test]
async fn test_send_delivers_text_frame_to_client() {
    let (mut transport, addr) = bind().await;

    let client = tokio::spawn(async move {
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client connect");
        match ws.next().await.expect("frame").expect("ok") {
            Message::Text(text) => text.to_string(),
            other => panic!("expected text frame, got {other:?}"),
        }
    });

    let conn = transport.accept().await.expect("accept");
    conn.send(r#"{"type":"review_end"}"#).await.expect("send");

    assert_eq!(client.await.unwrap(), r#"{"type":"review_end"}"#);
}

#[tokio::test]
async fn test_binary_frames_are_tolerated_as_utf8() {
    let (mut transport, addr) = bind().await;

    let client = tokio::spawn(async move {
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client connect");
        ws.send(Message::Binary(b"{\"type\":\"typing\"}".to_vec().into()))
            .await
            .expect("client send");
        ws
    });

    let conn = transport.accept().await.expect("accept");
    let frame = conn.recv().await.expect("recv").expect("open");
    assert_eq!(frame, r#"{"type":"typing"}"#);

    let _ws = client.await.unwrap();
}

#[tokio::test]
async fn test_client_close_yields_none() {
    let (mut transport, addr) = bind().await;

    let client = tokio::spawn(async move {
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client connect");
        ws.close(None).await.expect("close");
    });

    let conn = transport.accept().await.expect("accept");
    assert!(conn.recv().await.expect("recv").is_none());

    client.await.unwrap();
}

#[tokio::test]
async fn test_connection_ids_are_unique_across_accepts() {
    let (mut transport, addr) = bind().await;

    let clients = tokio::spawn(async move {
        let a = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("first connect");
        let b = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("second connect");
        (a, b)
    });

    let first = transport.accept().await.expect("accept");
    let second = transport.accept().await.expect("accept");
    assert_ne!(first.id(), second.id());

    let _ws = clients.await.unwrap();
}
