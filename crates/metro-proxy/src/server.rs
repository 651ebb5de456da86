//! `ProxyServer` builder and accept loop.
//!
//! This is the entry point for running the proxy. It ties together the
//! layers: port assignment → transport → per-connection handler.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metro_proxy_ports::PortAssignment;
use metro_proxy_transport::TcpTransport;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::forward::{BackendClient, backend_client};
use crate::handler::handle_connection;
use crate::shutdown::shutdown_signal;
use crate::{ProxyConfig, ProxyError, Target};

/// Shared state passed to each connection task.
///
/// Everything in here is fixed at startup; connections only read it.
pub(crate) struct ProxyState {
    pub(crate) target: Target,
    pub(crate) client: BackendClient,
    pub(crate) config: ProxyConfig,
}

/// Builder for configuring and starting a proxy.
///
/// # Example
///
/// ```rust,no_run
/// use metro_proxy::ProxyServer;
///
/// # async fn run() -> Result<(), metro_proxy::ProxyError> {
/// let server = ProxyServer::builder()
///     .bind("0.0.0.0:8082")
///     .target("http://127.0.0.1:8081")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ProxyServerBuilder {
    bind_addr: String,
    target: String,
    config: ProxyConfig,
}

impl ProxyServerBuilder {
    /// Creates a builder for Metro's stock port, exposed on 8082.
    pub fn new() -> Self {
        Self {
            bind_addr: "0.0.0.0:8082".to_string(),
            target: "http://127.0.0.1:8081".to_string(),
            config: ProxyConfig::default(),
        }
    }

    /// Creates a builder binding `0.0.0.0:{proxy_port}` and forwarding to
    /// the assignment's Metro port.
    pub fn from_ports(ports: &PortAssignment) -> Self {
        Self::new()
            .bind(&format!("0.0.0.0:{}", ports.proxy_port))
            .target(&ports.target_url())
    }

    /// Sets the address to listen on.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the backend URL (`http://host:port`).
    pub fn target(mut self, url: &str) -> Self {
        self.target = url.to_string();
        self
    }

    /// Replaces the whole tuning configuration.
    pub fn config(mut self, config: ProxyConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the backend connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets how long clients get to send a request head.
    pub fn head_timeout(mut self, timeout: Duration) -> Self {
        self.config.head_timeout = timeout;
        self
    }

    /// Sets how long open connections may run after shutdown starts.
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    /// Validates the target and binds the listener.
    pub async fn build(self) -> Result<ProxyServer, ProxyError> {
        let target = Target::parse(&self.target)?;
        let transport = TcpTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ProxyState {
            client: backend_client(&self.config),
            target,
            config: self.config,
        });

        Ok(ProxyServer { transport, state })
    }
}

impl Default for ProxyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound proxy, ready to accept connections.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start.
pub struct ProxyServer {
    transport: TcpTransport,
    state: Arc<ProxyState>,
}

impl ProxyServer {
    /// Creates a new builder.
    pub fn builder() -> ProxyServerBuilder {
        ProxyServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns the backend every connection is forwarded to.
    pub fn target(&self) -> &Target {
        &self.state.target
    }

    /// Runs until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<(), ProxyError> {
        self.run_until(async {
            let signal = shutdown_signal().await;
            tracing::info!(signal, "shutting down");
        })
        .await
    }

    /// Runs the accept loop until `shutdown` resolves.
    ///
    /// Each connection is handled in its own task. On shutdown the listener
    /// is closed first, so new connections are refused, then open
    /// connections get `shutdown_grace` to finish before being aborted.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ProxyError>
    where
        F: Future<Output = ()>,
    {
        let Self { transport, state } = self;
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        tracing::info!(target_url = %state.target, "proxy running");

        loop {
            tokio::select! {
                () = &mut shutdown => break,

                accepted = transport.accept() => match accepted {
                    Ok(conn) => {
                        let span = tracing::info_span!("conn", id = %conn.id, peer = %conn.peer);
                        let state = Arc::clone(&state);
                        tasks.spawn(
                            async move {
                                if let Err(e) = handle_connection(conn, state).await {
                                    tracing::debug!(error = %e, "connection ended with error");
                                }
                            }
                            .instrument(span),
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                        // Usually fd exhaustion; give in-flight connections
                        // a moment to release descriptors.
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_join(joined);
                }
            }
        }

        drop(transport);
        tracing::info!(open = tasks.len(), "listener closed");

        let grace = state.config.shutdown_grace;
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                log_join(joined);
            }
        })
        .await
        .is_ok();

        if !drained {
            tracing::warn!(open = tasks.len(), ?grace, "aborting connections after grace period");
            tasks.shutdown().await;
        }
        Ok(())
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(error = %e, "connection task panicked");
        }
    }
}
