//! Transports that open a chat stream and deliver its body as byte deltas.

use std::pin::Pin;
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use fc_protocol::ChatRequest;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{Client, Response};
use thiserror::Error;
use tracing::debug;

const EVENT_STREAM: &str = "text/event-stream";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("connection error: {0}")]
    Connection(String),
}

/// Response body of one exchange, as it arrives.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Something that can start a streaming chat exchange.
///
/// `open` never fails up front: connection and status errors surface as the
/// first item of the returned stream. The stream ends when the server closes
/// the response, and dropping it aborts the request.
pub trait Transport {
    fn open(&self, request: &ChatRequest) -> ByteStream;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn open(&self, request: &ChatRequest) -> ByteStream {
        (**self).open(request)
    }
}

/// Build an HTTP client for streaming exchanges.
///
/// Only the connect phase is bounded. A reply may legitimately stream for a
/// long time; callers that want an overall limit wrap the exchange instead.
pub fn build_http_client(connect_timeout: Duration) -> Result<Client, TransportError> {
    Ok(Client::builder()
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(2)
        .build()?)
}

/// POSTs the request as JSON and streams the event-stream response.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: String,
    http: Client,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, connect_timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self::with_client(endpoint, build_http_client(connect_timeout)?))
    }

    pub fn with_client(endpoint: impl Into<String>, http: Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    fn open(&self, request: &ChatRequest) -> ByteStream {
        let http = self.http.clone();
        let endpoint = self.endpoint.clone();
        let request = request.clone();

        Box::pin(stream! {
            match send_request(&http, &endpoint, &request).await {
                Ok(response) => {
                    let mut body = response_bytes(response);
                    while let Some(chunk) = body.next().await {
                        yield chunk;
                    }
                }
                Err(e) => {
                    yield Err(e);
                }
            }
        })
    }
}

async fn send_request(
    http: &Client,
    endpoint: &str,
    request: &ChatRequest,
) -> Result<Response, TransportError> {
    debug!(endpoint, session_id = ?request.session_id, "opening chat stream");

    let response = http
        .post(endpoint)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, EVENT_STREAM)
        .header(CACHE_CONTROL, "no-cache")
        .json(request)
        .send()
        .await?;

    check_status(response).await
}

/// Turn a non-success response into `TransportError::Status`.
async fn check_status(response: Response) -> Result<Response, TransportError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status { status, body })
}

fn response_bytes(response: Response) -> impl Stream<Item = Result<Bytes, TransportError>> {
    response
        .bytes_stream()
        .map(|chunk| chunk.map_err(TransportError::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &'static str) -> Response {
        Response::from(
            http::Response::builder()
                .status(status)
                .body(body)
                .unwrap(),
        )
    }

    #[test]
    fn build_http_client_does_not_panic() {
        let _client = build_http_client(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn new_transport_keeps_endpoint() {
        let transport =
            HttpTransport::new("http://127.0.0.1:5000/api/chat/stream", Duration::from_secs(1))
                .unwrap();
        assert_eq!(transport.endpoint(), "http://127.0.0.1:5000/api/chat/stream");
    }

    #[tokio::test]
    async fn success_status_passes_through() {
        let checked = check_status(response(200, "data: {}\n\n")).await;
        assert!(checked.is_ok());
    }

    #[tokio::test]
    async fn error_status_carries_body() {
        let err = check_status(response(503, "overloaded")).await.unwrap_err();
        match err {
            TransportError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn response_body_is_streamed_as_bytes() {
        let body = "data: {\"type\":\"end\"}\n\n";
        let chunks: Vec<_> = response_bytes(response(200, body)).collect().await;

        let received: Vec<u8> = chunks
            .into_iter()
            .flat_map(|chunk| chunk.unwrap().to_vec())
            .collect();
        assert_eq!(received, body.as_bytes());
    }

    #[tokio::test]
    async fn unreachable_server_surfaces_as_first_item() {
        // Port 9 (discard) on localhost is not expected to accept HTTP.
        let transport =
            HttpTransport::new("http://127.0.0.1:9/api/chat/stream", Duration::from_millis(500))
                .unwrap();
        let mut stream = transport.open(&ChatRequest::new("hi"));

        let first = stream.next().await.expect("stream yields an item");
        assert!(first.is_err());
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn error_messages_are_readable() {
        let err = TransportError::Status {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "server returned 500: boom");
        assert_eq!(
            TransportError::Connection("reset".to_string()).to_string(),
            "connection error: reset"
        );
    }
}
