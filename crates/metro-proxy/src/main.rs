use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use metro_proxy::prelude::*;

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = ProxyConfig::DEFAULT_CONNECT_TIMEOUT.as_millis() as u64;

#[derive(Parser, Debug)]
#[command(name = "metro-proxy")]
#[command(about = "Forward HTTP and WebSocket traffic to the Metro bundler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Project root holding `default.env` and `.env`
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// How the Metro port follows from RCT_METRO_PORT
    #[arg(long, global = true, default_value_t = PortDerivation::BelowProxy)]
    derivation: PortDerivation,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the proxy (default)
    Serve {
        /// Backend connect timeout in milliseconds
        #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_MS)]
        connect_timeout_ms: u64,
    },
    /// Print the resolved port assignment
    Ports {
        /// Also resolve WEB_PORT
        #[arg(long)]
        web: bool,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut registration = TracingRegistration::new();
    registration.ensure_registered();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "metro-proxy failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), ProxyError> {
    let resolver = PortResolver::new(cli.derivation);
    match cli.command.unwrap_or(Command::Serve {
        connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
    }) {
        Command::Serve { connect_timeout_ms } => {
            tracing::info!("starting Metro proxy");
            let ports = resolve_ports(&cli.root, resolver)?;
            let server = ProxyServerBuilder::from_ports(&ports)
                .connect_timeout(Duration::from_millis(connect_timeout_ms))
                .build()
                .await?;
            tracing::info!(
                "[proxy] forwarding http/ws {} -> {}",
                ports.proxy_port,
                ports.metro_port
            );
            server.run().await
        }
        Command::Ports { web, json } => {
            let ports = resolve_ports(&cli.root, resolver.require_web_port(web))?;
            if json {
                println!("{}", serde_json::to_string(&ports)?);
            } else {
                println!("proxy {}", ports.proxy_port);
                println!("metro {}", ports.metro_port);
                if let Some(web_port) = ports.web_port {
                    println!("web {web_port}");
                }
            }
            Ok(())
        }
    }
}
