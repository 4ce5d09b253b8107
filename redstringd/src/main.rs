use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use redstring_core::{Core, EngineConfig};
use redstring_providers::{Provider, ReqwestProvider};
use redstring_server::{serve, AppState};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "redstringd")]
#[command(about = "Redstring agentic orchestration core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs the HTTP server.
    Serve {
        #[arg(long, alias = "host", default_value = "127.0.0.1")]
        hostname: String,
        #[arg(long, env = "BRIDGE_PORT")]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(config.log_level.clone())
        .with_target(!config.node_env.is_production())
        .with_line_number(!config.node_env.is_production())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { hostname, port } => {
            let port = port.unwrap_or(config.bridge_port);
            let https_requested = config.https.requested;
            let https_usable = config.https.is_usable();

            let provider = build_provider();
            let core = Core::bootstrap(config, provider).await.context("failed to bootstrap core")?;
            let state = AppState::new(core);

            if https_requested && !https_usable {
                warn!("BRIDGE_USE_HTTPS set but key/cert material is missing; falling back to HTTP");
            } else if https_requested {
                warn!("BRIDGE_USE_HTTPS set but this build only serves plain HTTP; falling back despite usable key/cert material");
            }

            let addr: SocketAddr = format!("{hostname}:{port}").parse().context("invalid hostname or port")?;
            info!(%addr, "starting redstringd");
            serve(addr, state).await?;
        }
    }

    Ok(())
}

fn build_provider() -> Arc<dyn Provider> {
    let name = std::env::var("REDSTRING_PROVIDER_NAME").unwrap_or_else(|_| "anthropic".to_string());
    let base_url = std::env::var("REDSTRING_PROVIDER_URL").unwrap_or_else(|_| "https://api.anthropic.com/v1/messages".to_string());
    Arc::new(ReqwestProvider::new(name, base_url))
}
