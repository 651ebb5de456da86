/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the listening socket failed. Fatal at startup.
    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        /// Address we tried to bind.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// Accepting a connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The client sent bytes that are not a valid HTTP/1.x request head.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The request head did not fit in the sniffing buffer.
    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    /// The client started a request head but did not finish it in time.
    #[error("timed out waiting for request head")]
    HeadTimeout,

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Reading or writing the socket failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Returns `true` for errors caused by a misbehaving client, which
    /// are answered with a bare `400 Bad Request`.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedRequest(_)
                | Self::HeadTooLarge(_)
                | Self::HeadTimeout
                | Self::ConnectionClosed(_)
        )
    }
}
