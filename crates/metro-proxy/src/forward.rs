//! Buffered HTTP forwarding.
//!
//! Non-upgrade requests are served by a hyper HTTP/1 connection reading
//! from the sniffed bytes plus the rest of the socket. Each request is
//! re-targeted at the backend, its `Host` rewritten, and sent with a pooled
//! client. The backend's response streams back unchanged apart from
//! hop-by-hop headers.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderMap, HeaderValue, HOST};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use metro_proxy_transport::{BufferedResponder, Rewind, SniffedHead};
use tokio::net::TcpStream;

use crate::error::error_chain;
use crate::handler::report_gateway_error;
use crate::server::ProxyState;
use crate::{ProxyConfig, ProxyError};

/// Response body type produced by the proxy service.
pub(crate) type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Client used to reach the backend.
pub(crate) type BackendClient = Client<HttpConnector, Incoming>;

/// Headers that describe a single hop and must not be forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Builds the pooled backend client.
pub(crate) fn backend_client(config: &ProxyConfig) -> BackendClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(config.connect_timeout));
    connector.set_nodelay(true);
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Serves the single HTTP exchange on `stream`.
pub(crate) async fn serve_http(
    stream: TcpStream,
    sniffed: SniffedHead,
    state: Arc<ProxyState>,
) -> Result<(), ProxyError> {
    let io = TokioIo::new(Rewind::new(sniffed.buf.freeze(), stream));
    let service = service_fn(move |req| forward(Arc::clone(&state), req));

    // One exchange per connection: the next request opens a new connection
    // and goes through sniffing again, so upgrades are always seen first.
    http1::Builder::new()
        .keep_alive(false)
        .serve_connection(io, service)
        .await?;
    Ok(())
}

/// Forwards one request and returns the backend's response or a 502.
async fn forward(
    state: Arc<ProxyState>,
    mut req: Request<Incoming>,
) -> Result<Response<ProxyBody>, Infallible> {
    let path = req
        .uri()
        .path_and_query()
        .map_or("/", |pq| pq.as_str())
        .to_string();
    tracing::debug!(method = %req.method(), %path, "forwarding request");

    let uri = match format!("{}{}", state.target.url(), path).parse::<Uri>() {
        Ok(uri) => uri,
        Err(e) => {
            let resp = report_gateway_error(BufferedResponder, &state.target, e.to_string()).await;
            return Ok(boxed(resp));
        }
    };
    *req.uri_mut() = uri;

    let headers = req.headers_mut();
    strip_hop_by_hop(headers);
    if let Ok(host) = HeaderValue::from_str(state.target.authority()) {
        headers.insert(HOST, host);
    }

    match state.client.request(req).await {
        Ok(resp) => {
            let (mut parts, body) = resp.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            Ok(Response::from_parts(parts, body.boxed()))
        }
        Err(e) => {
            let resp = report_gateway_error(BufferedResponder, &state.target, error_chain(&e)).await;
            Ok(boxed(resp))
        }
    }
}

fn boxed(resp: Response<Full<Bytes>>) -> Response<ProxyBody> {
    resp.map(|body| body.map_err(|never| match never {}).boxed())
}

/// Removes hop-by-hop headers, including any named in `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<String> = headers
        .get_all(hyper::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();
    for name in named {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}
