//! TOOLGUARD Server
//!
//! HTTP validation service for proposed LLM tool calls.

#![warn(missing_docs)]
#![warn(clippy::all)]

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use toolguard_server::{ApiServer, AuthConfig, ServerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "toolguard-server")]
#[command(about = "TOOLGUARD tool-call validation service", long_about = None)]
struct Args {
    /// Bind address
    #[arg(short, long, env = "TOOLGUARD_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Engine configuration file
    #[arg(short, long, env = "TOOLGUARD_CONFIG", default_value = "config/toolguard.yaml")]
    config: PathBuf,

    /// API key required on /api routes
    #[arg(long, env = "TOOLGUARD_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Requests per client per minute, 0 for unlimited
    #[arg(long, env = "TOOLGUARD_RATE_LIMIT", default_value_t = 60)]
    rate_limit: u32,

    /// Largest accepted batch
    #[arg(long, default_value_t = 100)]
    max_batch_size: usize,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("toolguard=info,tower_http=info"));
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let auth = match args.api_key {
        Some(key) if !key.is_empty() => AuthConfig::with_api_key(key),
        _ => AuthConfig::default(),
    };
    let config = ServerConfig::new(&args.config)
        .with_bind(args.bind)
        .with_auth(auth)
        .with_rate_limit(args.rate_limit)
        .with_max_batch_size(args.max_batch_size);

    let server = ApiServer::new(config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    server.serve().await?;

    Ok(())
}
