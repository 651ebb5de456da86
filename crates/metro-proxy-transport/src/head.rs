//! Request-head sniffing.
//!
//! Every connection starts by reading just enough bytes to parse one HTTP/1.x
//! request head. That tells us which path the connection takes:
//!
//! - upgrade request (WebSocket) → raw byte tunnel to the backend
//! - anything else → buffered HTTP forwarding
//! - unparsable → bare `400 Bad Request`
//!
//! Bytes read past the head (an early request body or the first frames of
//! an upgraded stream) are kept in the returned buffer and must be replayed.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use crate::TransportError;

/// Largest request head accepted, in bytes.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

const MAX_HEADERS: usize = 100;

/// An owned, parsed HTTP/1.x request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// Request method, e.g. `GET`.
    pub method: String,
    /// Request target as sent, e.g. `/index.bundle?platform=ios`.
    pub path: String,
    /// Minor HTTP version: `0` for HTTP/1.0, `1` for HTTP/1.1.
    pub version: u8,
    /// Headers in wire order. Values are kept as raw bytes.
    pub headers: Vec<(String, Vec<u8>)>,
}

impl RequestHead {
    fn from_parsed(req: &httparse::Request<'_, '_>) -> Result<Self, TransportError> {
        let (Some(method), Some(path), Some(version)) = (req.method, req.path, req.version)
        else {
            return Err(TransportError::MalformedRequest(
                "incomplete request line".into(),
            ));
        };
        Ok(Self {
            method: method.to_string(),
            path: path.to_string(),
            version,
            headers: req
                .headers
                .iter()
                .map(|h| (h.name.to_string(), h.value.to_vec()))
                .collect(),
        })
    }

    /// Returns the first value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// Returns `true` if this request asks to switch protocols: an
    /// `Upgrade` header plus an `upgrade` token in `Connection`.
    pub fn is_upgrade(&self) -> bool {
        if self.header("upgrade").is_none() {
            return false;
        }
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("connection"))
            .flat_map(|(_, v)| v.split(|b| *b == b','))
            .any(|token| token.trim_ascii().eq_ignore_ascii_case(b"upgrade"))
    }

    /// Serializes the head for the backend with `Host` set to
    /// `authority`. Every other header is passed through unchanged.
    pub fn encode_for_backend(&self, authority: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(self.method.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.path.as_bytes());
        out.extend_from_slice(format!(" HTTP/1.{}\r\n", self.version).as_bytes());

        out.extend_from_slice(b"Host: ");
        out.extend_from_slice(authority.as_bytes());
        out.extend_from_slice(b"\r\n");

        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("host") {
                continue;
            }
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}

/// A request head together with every byte read to obtain it.
#[derive(Debug)]
pub struct SniffedHead {
    /// The parsed head.
    pub head: RequestHead,
    /// All bytes consumed from the socket, starting with the head.
    pub buf: BytesMut,
    /// Length of the head within `buf`.
    pub head_len: usize,
}

impl SniffedHead {
    /// Bytes that followed the head.
    pub fn trailing(&self) -> &[u8] {
        &self.buf[self.head_len..]
    }
}

/// Reads from `stream` until one complete request head is buffered.
///
/// Returns `Ok(None)` if the peer closed before sending anything.
pub async fn read_request_head<S>(
    stream: &mut S,
    max_len: usize,
) -> Result<Option<SniffedHead>, TransportError>
where
    S: AsyncRead + Unpin,
{
    read_head(stream, max_len, None).await
}

/// Like [`read_request_head`], but gives up after `timeout`.
///
/// A client that sent nothing by then yields `Ok(None)`; one that stalled
/// partway through its head yields [`TransportError::HeadTimeout`].
pub async fn read_request_head_within<S>(
    stream: &mut S,
    max_len: usize,
    timeout: Duration,
) -> Result<Option<SniffedHead>, TransportError>
where
    S: AsyncRead + Unpin,
{
    read_head(stream, max_len, Some(Instant::now() + timeout)).await
}

async fn read_head<S>(
    stream: &mut S,
    max_len: usize,
    deadline: Option<Instant>,
) -> Result<Option<SniffedHead>, TransportError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        let n = match deadline {
            Some(deadline) => {
                let read = tokio::time::timeout_at(deadline, stream.read_buf(&mut buf)).await;
                match read {
                    Ok(n) => n?,
                    Err(_) if buf.is_empty() => return Ok(None),
                    Err(_) => return Err(TransportError::HeadTimeout),
                }
            }
            None => stream.read_buf(&mut buf).await?,
        };
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(TransportError::ConnectionClosed(
                "eof inside request head".into(),
            ));
        }

        let parsed = {
            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut req = httparse::Request::new(&mut headers);
            match req.parse(&buf) {
                Ok(httparse::Status::Complete(len)) => Some((RequestHead::from_parsed(&req)?, len)),
                Ok(httparse::Status::Partial) => None,
                Err(e) => return Err(TransportError::MalformedRequest(e.to_string())),
            }
        };

        match parsed {
            Some((head, head_len)) => {
                return Ok(Some(SniffedHead {
                    head,
                    buf,
                    head_len,
                }));
            }
            None if buf.len() >= max_len => return Err(TransportError::HeadTooLarge(max_len)),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;

    async fn sniff(bytes: &[u8]) -> Result<Option<SniffedHead>, TransportError> {
        let mut reader = bytes;
        read_request_head(&mut reader, MAX_HEAD_BYTES).await
    }

    #[tokio::test]
    async fn test_parses_simple_get() {
        let s = sniff(b"GET /status HTTP/1.1\r\nHost: localhost:8082\r\n\r\n")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(s.head.method, "GET");
        assert_eq!(s.head.path, "/status");
        assert_eq!(s.head.version, 1);
        assert_eq!(s.head.header("HOST"), Some(&b"localhost:8082"[..]));
        assert!(!s.head.is_upgrade());
        assert!(s.trailing().is_empty());
    }

    #[tokio::test]
    async fn test_keeps_trailing_bytes() {
        let s = sniff(b"POST /x HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(s.trailing(), b"abc");
        assert_eq!(&s.buf[..4], b"POST");
    }

    #[tokio::test]
    async fn test_detects_websocket_upgrade() {
        let s = sniff(
            b"GET /hot HTTP/1.1\r\nHost: a\r\nConnection: keep-alive, Upgrade\r\nUpgrade: websocket\r\n\r\n",
        )
        .await
        .unwrap()
        .unwrap();
        assert!(s.head.is_upgrade());
    }

    #[tokio::test]
    async fn test_upgrade_header_without_connection_token_is_plain() {
        let s = sniff(b"GET / HTTP/1.1\r\nUpgrade: websocket\r\n\r\n")
            .await
            .unwrap()
            .unwrap();
        assert!(!s.head.is_upgrade());
    }

    #[tokio::test]
    async fn test_empty_stream_is_none() {
        assert!(sniff(b"").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_is_malformed() {
        let err = sniff(b"\x01\x02\x03 nope\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, TransportError::MalformedRequest(_)));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_truncated_head_is_client_error() {
        let err = sniff(b"GET / HTTP/1.1\r\nHost: a\r\n").await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed(_)));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_oversized_head_rejected() {
        let mut req = b"GET / HTTP/1.1\r\n".to_vec();
        while req.len() < 200 {
            req.extend_from_slice(b"X-Pad: aaaaaaaaaa\r\n");
        }
        let mut reader = req.as_slice();
        let err = read_request_head(&mut reader, 64).await.unwrap_err();
        assert!(matches!(err, TransportError::HeadTooLarge(64)));
    }

    #[tokio::test]
    async fn test_stalled_partial_head_times_out() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(b"GET / HT").await.unwrap();
        let err = read_request_head_within(&mut server, MAX_HEAD_BYTES, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::HeadTimeout));
        assert!(err.is_client_error());
        drop(client);
    }

    #[tokio::test]
    async fn test_idle_client_times_out_as_none() {
        let (client, mut server) = tokio::io::duplex(1024);
        let sniffed = read_request_head_within(&mut server, MAX_HEAD_BYTES, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(sniffed.is_none());
        drop(client);
    }

    #[tokio::test]
    async fn test_head_within_deadline_parses() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client
            .write_all(b"GET /status HTTP/1.1\r\nHost: a\r\n\r\n")
            .await
            .unwrap();
        let s = read_request_head_within(&mut server, MAX_HEAD_BYTES, Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(s.head.path, "/status");
    }

    #[test]
    fn test_encode_for_backend_rewrites_host() {
        let head = RequestHead {
            method: "GET".into(),
            path: "/hot?x=1".into(),
            version: 1,
            headers: vec![
                ("Host".into(), b"192.168.1.20:8082".to_vec()),
                ("Upgrade".into(), b"websocket".to_vec()),
            ],
        };
        let wire = String::from_utf8(head.encode_for_backend("127.0.0.1:8081")).unwrap();
        assert_eq!(
            wire,
            "GET /hot?x=1 HTTP/1.1\r\nHost: 127.0.0.1:8081\r\nUpgrade: websocket\r\n\r\n"
        );
    }
}
