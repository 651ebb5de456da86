//! Transport layer for metro-proxy.
//!
//! Owns everything that touches the client socket before a request is
//! handed to the forwarding logic:
//!
//! - [`TcpTransport`] accepts connections and tags them with a [`ConnectionId`]
//! - [`read_request_head`] sniffs the first request head
//! - [`Rewind`] replays the sniffed bytes to whoever reads next
//! - [`GatewayResponder`] reports backend failures on either a buffered
//!   response or a raw socket

mod error;
mod head;
mod listener;
mod responder;
mod rewind;

pub use error::TransportError;
pub use head::{
    MAX_HEAD_BYTES, RequestHead, SniffedHead, read_request_head, read_request_head_within,
};
pub use listener::{InboundConnection, TcpTransport};
pub use responder::{
    BAD_REQUEST_RESPONSE, BufferedResponder, GatewayResponder, RawSocketResponder,
    gateway_message, raw_gateway_response, write_bad_request,
};
pub use rewind::Rewind;

use std::fmt;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
