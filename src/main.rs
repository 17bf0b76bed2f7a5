//! Scrawl - Real-time Collaborative Drawing Server
//!
//! CLI entry point for the Scrawl hub server.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;
mod websocket;

/// Real-time collaboration hub for shared drawing rooms
#[derive(Debug, Parser)]
#[command(name = "scrawl", version, about)]
struct Cli {
    /// Override the configured listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the configured listen port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scrawl=info,scrawl_hub=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    server::run(cli.host, cli.port).await
}
