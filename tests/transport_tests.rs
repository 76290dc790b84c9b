//! Tests for the WebSocket transport against a local tokio-tungstenite
//! server: delivery order, outbound sends, and reconnect behavior.

use std::time::Duration;

use chat_stream_renderer::frame::Frame;
use chat_stream_renderer::transport::{ReconnectPolicy, Transport, TransportEvent, WsTransport};
use chat_stream_renderer::ChatError;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

fn fast_policy(max_retries: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        max_retries,
        initial_delay_ms: 10,
        max_delay_ms: 50,
        backoff_multiplier: 2.0,
        jitter_ms: 0,
        stable_after_ms: 60_000,
    }
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_frames_delivered_in_order_and_send_reaches_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let incoming = ws.next().await.unwrap().unwrap();
        for frame in [Frame::begin("You "), Frame::content("slept "), Frame::end("well.")] {
            ws.send(WsMessage::Text(frame.to_json())).await.unwrap();
        }
        ws.close(None).await.unwrap();
        incoming
    });

    let (mut transport, mut events) =
        WsTransport::connect(format!("ws://{addr}/chat/2024/01/01/2024/01/31"), fast_policy(0));

    assert!(matches!(next_event(&mut events).await, TransportEvent::Open));
    transport.send("how did I sleep?").unwrap();

    let mut payloads = Vec::new();
    loop {
        match next_event(&mut events).await {
            TransportEvent::Payload(p) => payloads.push(p),
            TransportEvent::Error(_) => {}
            TransportEvent::Closed => break,
            TransportEvent::Open => panic!("unexpected reopen with retries disabled"),
        }
    }

    let frames: Vec<Frame> = payloads.iter().map(|p| Frame::parse(p).unwrap()).collect();
    assert_eq!(
        frames,
        vec![Frame::begin("You "), Frame::content("slept "), Frame::end("well.")]
    );

    let incoming = server.await.unwrap();
    assert_eq!(incoming, WsMessage::Text("how did I sleep?".to_string()));
}

#[tokio::test]
async fn test_unreachable_server_reports_error_then_closed() {
    // Reserve a port, then free it so nothing is listening.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let (_transport, mut events) = WsTransport::connect(format!("ws://{addr}/chat/x"), fast_policy(1));

    match next_event(&mut events).await {
        TransportEvent::Error(ChatError::Connection(_)) => {}
        other => panic!("expected connection error, got {other:?}"),
    }
    assert!(matches!(next_event(&mut events).await, TransportEvent::Closed));
}

#[tokio::test]
async fn test_reconnects_after_server_drops() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        // First session: close right away.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();
        drop(ws);

        // Second session: greet and hold until the client goes away.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(WsMessage::Text(Frame::full("back").to_json())).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let (transport, mut events) = WsTransport::connect(format!("ws://{addr}/chat/x"), fast_policy(3));

    assert!(matches!(next_event(&mut events).await, TransportEvent::Open));
    assert!(matches!(next_event(&mut events).await, TransportEvent::Error(_)));
    assert!(matches!(next_event(&mut events).await, TransportEvent::Open));
    match next_event(&mut events).await {
        TransportEvent::Payload(p) => assert_eq!(Frame::parse(&p).unwrap(), Frame::full("back")),
        other => panic!("expected payload, got {other:?}"),
    }

    drop(transport);
    drop(events);
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not finish")
        .unwrap();
}

#[tokio::test]
async fn test_server_that_hangs_up_at_once_gets_backoff_then_closed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                let _ = ws.close(None).await;
            }
        }
    });

    let policy = ReconnectPolicy {
        max_retries: 3,
        initial_delay_ms: 40,
        max_delay_ms: 1_000,
        backoff_multiplier: 2.0,
        jitter_ms: 0,
        stable_after_ms: 60_000,
    };
    let (_transport, mut events) = WsTransport::connect(format!("ws://{addr}/chat/x"), policy);

    let mut opens = Vec::new();
    loop {
        match next_event(&mut events).await {
            TransportEvent::Open => opens.push(tokio::time::Instant::now()),
            TransportEvent::Error(ChatError::Connection(_)) => {}
            TransportEvent::Closed => break,
            other => panic!("unexpected event {other:?}"),
        }
    }

    assert_eq!(opens.len(), 3);
    // Waits of 40 ms then 80 ms separate the three sessions.
    assert!(opens[1] - opens[0] >= Duration::from_millis(30));
    assert!(opens[2] - opens[1] >= Duration::from_millis(70));
}

#[tokio::test]
async fn test_text_sent_while_disconnected_is_not_replayed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();
        drop(ws);

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.next().await.unwrap().unwrap()
    });

    let policy = ReconnectPolicy {
        initial_delay_ms: 300,
        max_delay_ms: 1_000,
        ..fast_policy(3)
    };
    let (mut transport, mut events) = WsTransport::connect(format!("ws://{addr}/chat/x"), policy);

    assert!(matches!(next_event(&mut events).await, TransportEvent::Open));
    assert!(matches!(next_event(&mut events).await, TransportEvent::Error(_)));
    // The supervisor is waiting out its backoff; nothing is connected.
    transport.send("typed into the old panel").unwrap();

    assert!(matches!(next_event(&mut events).await, TransportEvent::Open));
    transport.send("fresh question").unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not finish")
        .unwrap();
    assert_eq!(first, WsMessage::Text("fresh question".to_string()));
}
