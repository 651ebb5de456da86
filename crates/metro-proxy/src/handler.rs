//! Per-connection handler: sniff, then dispatch.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Read one request head (bounded in size and time)
//!   2. Unparsable, oversized or stalled → bare `400 Bad Request`, close
//!   3. Upgrade request → raw tunnel ([`crate::tunnel`])
//!   4. Anything else → buffered forwarding ([`crate::forward`])

use std::sync::Arc;

use metro_proxy_transport::{
    GatewayResponder, InboundConnection, gateway_message, read_request_head_within,
    write_bad_request,
};

use crate::server::ProxyState;
use crate::{ProxyError, Target, forward, tunnel};

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: InboundConnection,
    state: Arc<ProxyState>,
) -> Result<(), ProxyError> {
    let InboundConnection { mut stream, .. } = conn;

    let sniffed = match read_request_head_within(
        &mut stream,
        state.config.max_head_bytes,
        state.config.head_timeout,
    )
    .await
    {
        Ok(Some(sniffed)) => sniffed,
        Ok(None) => {
            tracing::debug!("client sent no request");
            return Ok(());
        }
        Err(e) if e.is_client_error() => {
            tracing::debug!(error = %e, "[proxy] client error");
            write_bad_request(&mut stream).await;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if sniffed.head.is_upgrade() {
        tunnel::tunnel(stream, sniffed, state).await
    } else {
        forward::serve_http(stream, sniffed, state).await
    }
}

/// Logs a backend failure and reports it through `responder`.
pub(crate) async fn report_gateway_error<R: GatewayResponder>(
    responder: R,
    target: &Target,
    detail: String,
) -> R::Output {
    tracing::error!(target_url = %target, error = %detail, "[proxy] error");
    responder
        .send_gateway_error(gateway_message(target.url(), &detail))
        .await
}
