//! End-to-end exchanges over real HTTP against a scripted local server.
//!
//! The server writes its response body in several deliveries, some of which
//! split a frame in half, the way a proxy or slow network would.

use std::time::Duration;

use fc_backend::{ExchangeError, HttpTransport, StreamSession, TransportError};
use fc_protocol::{ChatRequest, ReplyUpdate};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const STREAM_HEAD: &str =
    "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncache-control: no-cache\r\nconnection: close\r\n\r\n";

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Read one HTTP request (head plus content-length body).
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let n = socket.read(&mut chunk).await.expect("read request");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(head_end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + body_len {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

/// Serve a single connection: write `head`, then each delivery with a pause.
async fn serve_once(head: &'static str, deliveries: Vec<&'static str>) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let endpoint = format!("http://{}/api/chat/stream", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let request = read_request(&mut socket).await;

        socket.write_all(head.as_bytes()).await.expect("write head");
        for delivery in deliveries {
            socket.write_all(delivery.as_bytes()).await.expect("write body");
            socket.flush().await.expect("flush");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let _ = socket.shutdown().await;
        request
    });

    (endpoint, server)
}

#[tokio::test]
async fn streams_reply_split_across_deliveries() {
    let (endpoint, server) = serve_once(
        STREAM_HEAD,
        vec![
            "data: {\"type\":\"session_id\",\"session_id\":\"abc-123\"}\n\ndata: {\"type\":\"chu",
            "nk\",\"content\":\"Hel\"}\n\ndata: {\"type\":\"chunk\",\"content\":\"lo\"}",
            "\n\ndata: {\"type\":\"end\"}\n\n",
        ],
    )
    .await;

    let transport = HttpTransport::new(endpoint, Duration::from_secs(5)).unwrap();
    let mut session = StreamSession::new(transport);
    let mut updates = Vec::new();

    let outcome = session
        .run_streaming_exchange(&ChatRequest::new("say hello"), |update| {
            updates.push(update)
        })
        .await
        .unwrap();

    assert_eq!(
        updates,
        vec![
            ReplyUpdate::text("Hel", false),
            ReplyUpdate::text("lo", false),
            ReplyUpdate::complete(false),
        ]
    );
    assert_eq!(outcome.session_id, "abc-123");
    assert_eq!(outcome.assembled_text, "Hello");
    assert!(outcome.ended);

    let request = server.await.unwrap();
    let lower = request.to_lowercase();
    assert!(lower.starts_with("post /api/chat/stream"));
    assert!(lower.contains("accept: text/event-stream"));
    assert!(request.contains("\"message\":\"say hello\""));
    assert!(request.contains("\"createStream\":true"));
}

#[tokio::test]
async fn sends_prior_session_id() {
    let (endpoint, server) = serve_once(STREAM_HEAD, vec!["data: {\"type\":\"end\"}\n\n"]).await;

    let transport = HttpTransport::new(endpoint, Duration::from_secs(5)).unwrap();
    let mut session = StreamSession::new(transport);
    let request = ChatRequest::new("again").with_session_id(Some("prior-7".to_string()));

    let outcome = session
        .run_streaming_exchange(&request, |_| {})
        .await
        .unwrap();

    assert_eq!(outcome.session_id, "prior-7");
    assert!(server.await.unwrap().contains("\"sessionId\":\"prior-7\""));
}

#[tokio::test]
async fn close_without_end_is_success() {
    let (endpoint, _server) = serve_once(
        STREAM_HEAD,
        vec!["data: {\"type\":\"chunk\",\"content\":\"partial\"}\n\n"],
    )
    .await;

    let transport = HttpTransport::new(endpoint, Duration::from_secs(5)).unwrap();
    let mut session = StreamSession::new(transport);
    let mut updates = Vec::new();

    let outcome = session
        .run_streaming_exchange(&ChatRequest::new("hi"), |update| updates.push(update))
        .await
        .unwrap();

    assert_eq!(updates, vec![ReplyUpdate::text("partial", false)]);
    assert!(!outcome.ended);
    assert_eq!(outcome.session_id, "");
}

#[tokio::test]
async fn error_status_is_transport_failure() {
    let (endpoint, _server) = serve_once(
        "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 4\r\nconnection: close\r\n\r\nboom",
        vec![],
    )
    .await;

    let transport = HttpTransport::new(endpoint, Duration::from_secs(5)).unwrap();
    let mut session = StreamSession::new(transport);
    let mut calls = 0;

    let result = session
        .run_streaming_exchange(&ChatRequest::new("hi"), |_| calls += 1)
        .await;

    assert_eq!(calls, 0);
    match result {
        Err(ExchangeError::Transport(TransportError::Status { status, body })) => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
