//! Gateway error sinks.
//!
//! A failed forward has to be reported on whatever transport the client
//! is still attached to. For a normal request that is an HTTP response the
//! server will serialize; for an upgrade request the response object is
//! gone and only the raw socket remains. Both are [`GatewayResponder`]s, so
//! the error path never needs to know which one it holds.

use std::fmt;
use std::future::Future;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Response, StatusCode};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Literal response sent for unparsable requests.
pub const BAD_REQUEST_RESPONSE: &[u8] = b"HTTP/1.1 400 Bad Request\r\n\r\n";

/// Builds the diagnostic body for a backend failure.
pub fn gateway_message(target: &str, err: &dyn fmt::Display) -> String {
    format!("Proxy failed to reach Metro on {target}\n{err}")
}

/// Builds a complete `502 Bad Gateway` response as raw bytes.
pub fn raw_gateway_response(message: &str) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 502 Bad Gateway\r\n\
         Content-Type: text/plain\r\n\
         Connection: close\r\n\
         Content-Length: {}\r\n\
         \r\n",
        message.len()
    )
    .into_bytes();
    out.extend_from_slice(message.as_bytes());
    out
}

/// Something a gateway error can be written to.
pub trait GatewayResponder {
    /// What the caller gets back, e.g. a response to return from a service.
    type Output;

    /// Reports `message` to the client as a 502.
    fn send_gateway_error(self, message: String) -> impl Future<Output = Self::Output> + Send;
}

// ---------------------------------------------------------------------------
// BufferedResponder
// ---------------------------------------------------------------------------

/// Produces a 502 [`Response`] for the HTTP server to send.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferedResponder;

impl GatewayResponder for BufferedResponder {
    type Output = Response<Full<Bytes>>;

    async fn send_gateway_error(self, message: String) -> Self::Output {
        let mut resp = Response::new(Full::new(Bytes::from(message)));
        *resp.status_mut() = StatusCode::BAD_GATEWAY;
        resp.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        resp
    }
}

// ---------------------------------------------------------------------------
// RawSocketResponder
// ---------------------------------------------------------------------------

/// Writes a hand-built 502 directly onto a socket, then closes it.
#[derive(Debug)]
pub struct RawSocketResponder<S> {
    socket: S,
}

impl<S> RawSocketResponder<S> {
    /// Takes ownership of the socket; it is closed after the error is sent.
    pub fn new(socket: S) -> Self {
        Self { socket }
    }
}

impl<S> GatewayResponder for RawSocketResponder<S>
where
    S: AsyncWrite + Unpin + Send,
{
    type Output = ();

    async fn send_gateway_error(mut self, message: String) {
        let response = raw_gateway_response(&message);
        // The client may already be gone; nothing left to report to.
        if let Err(e) = self.socket.write_all(&response).await {
            tracing::debug!(error = %e, "failed to write raw 502");
        }
        if let Err(e) = self.socket.shutdown().await {
            tracing::debug!(error = %e, "failed to shut down socket after 502");
        }
    }
}

/// Writes [`BAD_REQUEST_RESPONSE`] and closes the write side.
pub async fn write_bad_request<S>(socket: &mut S)
where
    S: AsyncWrite + Unpin,
{
    if let Err(e) = socket.write_all(BAD_REQUEST_RESPONSE).await {
        tracing::debug!(error = %e, "failed to write 400");
    }
    if let Err(e) = socket.shutdown().await {
        tracing::debug!(error = %e, "failed to shut down socket after 400");
    }
}
