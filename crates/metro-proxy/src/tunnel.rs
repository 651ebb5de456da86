//! Raw tunnel for upgrade (WebSocket) requests.
//!
//! The head is re-sent to the backend with `Host` rewritten, then bytes are
//! copied both ways untouched until either side closes. Until the backend
//! sends its first response bytes there is no HTTP response object to
//! write a failure to, so errors go out through a [`RawSocketResponder`].

use std::sync::Arc;

use metro_proxy_transport::{RawSocketResponder, SniffedHead};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::handler::report_gateway_error;
use crate::server::ProxyState;
use crate::{ProxyError, Target};

/// Runs the tunnel for one upgrade request.
pub(crate) async fn tunnel(
    mut client: TcpStream,
    sniffed: SniffedHead,
    state: Arc<ProxyState>,
) -> Result<(), ProxyError> {
    let target = &state.target;
    tracing::debug!(path = %sniffed.head.path, "tunneling upgrade request");

    let mut backend = match open_backend(&state, &sniffed).await {
        Ok(backend) => backend,
        Err(source) => {
            report_gateway_error(RawSocketResponder::new(client), target, source.to_string())
                .await;
            return Ok(());
        }
    };

    // Until the backend answers, the client has seen nothing and can still
    // be told why the upgrade failed.
    let first = match read_first_response(&mut backend).await {
        Ok(first) => first,
        Err(source) => {
            report_gateway_error(RawSocketResponder::new(client), target, source.to_string())
                .await;
            return Ok(());
        }
    };
    client
        .write_all(&first)
        .await
        .map_err(|source| relay_error(target, source))?;

    match tokio::io::copy_bidirectional(&mut client, &mut backend).await {
        Ok((to_backend, to_client)) => {
            tracing::debug!(to_backend, to_client = to_client + first.len() as u64, "tunnel closed");
            Ok(())
        }
        Err(source) => Err(relay_error(target, source)),
    }
}

fn relay_error(target: &Target, source: std::io::Error) -> ProxyError {
    ProxyError::Relay {
        target: target.to_string(),
        source,
    }
}

/// Waits for the first bytes of the backend's response. A backend that
/// closes or resets before answering is an error.
async fn read_first_response(backend: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; 4096];
    let n = backend.read(&mut buf).await?;
    if n == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "backend closed the connection before responding",
        ));
    }
    buf.truncate(n);
    Ok(buf)
}

/// Connects to the backend and writes the rewritten head plus any bytes the
/// client already sent after it.
async fn open_backend(state: &ProxyState, sniffed: &SniffedHead) -> std::io::Result<TcpStream> {
    let connect = TcpStream::connect(state.target.authority());
    let mut backend = match tokio::time::timeout(state.config.connect_timeout, connect).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect timed out after {:?}", state.config.connect_timeout),
            ));
        }
    };
    backend.set_nodelay(true)?;

    let mut prelude = sniffed.head.encode_for_backend(state.target.authority());
    prelude.extend_from_slice(sniffed.trailing());
    backend.write_all(&prelude).await?;
    Ok(backend)
}
