//! TOOLGUARD CLI
//!
//! Offline validation, configuration checks and a remote client for the
//! validation service.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod client;
mod report;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use toolguard_core::{CoreError, VerdictStatus};
use toolguard_engine::{Snapshot, ValidationEngine, ValidationRequest};
use toolguard_tool::ToolHost;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "toolguard")]
#[command(about = "TOOLGUARD - validate LLM tool calls before they run", long_about = None)]
struct Cli {
    /// Log engine decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a batch offline
    Validate {
        /// Engine configuration file
        #[arg(short, long, env = "TOOLGUARD_CONFIG")]
        config: PathBuf,
        /// Batch file: {tool_calls, context}
        #[arg(short, long)]
        input: PathBuf,
        /// Print verdicts as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a batch against a running service
    Remote {
        /// Service base URL
        #[arg(short, long, default_value = "http://127.0.0.1:8080")]
        url: String,
        /// Batch file: {tool_calls, context}
        #[arg(short, long)]
        input: PathBuf,
        /// API key
        #[arg(long, env = "TOOLGUARD_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        /// Print verdicts as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load and compile a configuration
    Check {
        /// Engine configuration file
        #[arg(short, long, env = "TOOLGUARD_CONFIG")]
        config: PathBuf,
    },
    /// List registered tools
    Tools {
        /// Engine configuration file
        #[arg(short, long, env = "TOOLGUARD_CONFIG")]
        config: PathBuf,
    },
    /// Validate a batch, then run approved calls on the built-in stub tools
    Demo {
        /// Engine configuration file
        #[arg(short, long, env = "TOOLGUARD_CONFIG")]
        config: PathBuf,
        /// Batch file: {tool_calls, context}
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn read_batch(path: &Path) -> Result<ValidationRequest> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read {}", path.display()))?;
    let request: ValidationRequest = serde_json::from_str(&text)
        .map_err(CoreError::from)
        .wrap_err_with(|| format!("invalid batch file {}", path.display()))?;
    Ok(request)
}

fn load_engine(config: &Path) -> Result<ValidationEngine> {
    let snapshot = Snapshot::from_path(config)
        .map_err(CoreError::from)
        .wrap_err_with(|| format!("invalid configuration {}", config.display()))?;
    tracing::debug!(
        config = %config.display(),
        tools = snapshot.registry().len(),
        policies = snapshot.policy().len(),
        "configuration loaded"
    );
    Ok(ValidationEngine::new(Arc::new(snapshot)))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let level = if cli.verbose { "toolguard=debug" } else { "toolguard=error" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate {
            config,
            input,
            json,
        } => {
            let engine = load_engine(&config)?;
            let request = read_batch(&input)?;
            let _span = tracing::info_span!("validate", calls = request.tool_calls.len()).entered();
            let result = engine.validate(&request);
            tracing::info!(
                approved = result.count(VerdictStatus::Approved),
                total = result.len(),
                "batch validated"
            );
            print!("{}", report::render(&request.tool_calls, &result, json));
            Ok(())
        }
        Commands::Remote {
            url,
            input,
            api_key,
            json,
        } => {
            let request = read_batch(&input)?;
            let client = client::ValidationClient::new(url, api_key).map_err(CoreError::from)?;
            tracing::info!(url = %client.validate_url(), calls = request.tool_calls.len(), "submitting batch");
            let remote = client
                .validate(&request)
                .await
                .map_err(CoreError::from)
                .wrap_err("remote validation failed")?;
            tracing::debug!(request_id = %remote.request_id, ms = remote.processing_time_ms, "remote verdicts received");
            print!("{}", report::render(&request.tool_calls, &remote.results, json));
            if !json {
                println!(
                    "{}",
                    style(format!("{} in {} ms", remote.request_id, remote.processing_time_ms)).dim()
                );
            }
            Ok(())
        }
        Commands::Check { config } => {
            let engine = load_engine(&config)?;
            let snapshot = engine.snapshot();
            println!(
                "{} {}: {} tools, {} policies",
                style("OK").green().bold(),
                config.display(),
                snapshot.registry().len(),
                snapshot.policy().len()
            );
            Ok(())
        }
        Commands::Tools { config } => {
            let engine = load_engine(&config)?;
            for schema in engine.snapshot().registry().iter() {
                let required: Vec<_> = schema.required_fields().collect();
                println!(
                    "{} ({})",
                    style(&schema.name).bold(),
                    if required.is_empty() {
                        "no required parameters".to_string()
                    } else {
                        format!("requires {}", required.join(", "))
                    }
                );
                if let Some(description) = &schema.description {
                    println!("    {}", description);
                }
            }
            Ok(())
        }
        Commands::Demo { config, input } => {
            let engine = load_engine(&config)?;
            let request = read_batch(&input)?;
            if request.tool_calls.is_empty() {
                return Err(eyre!("batch has no tool calls"));
            }
            let result = engine.validate(&request);
            print!("{}", report::render(&request.tool_calls, &result, false));

            let host = ToolHost::with_builtins();
            for (call, verdict) in request.tool_calls.iter().zip(result.iter()) {
                if verdict.status != VerdictStatus::Approved {
                    tracing::debug!(call = %call.id, "not executed");
                    continue;
                }
                match host.execute_approved(call, verdict).await {
                    Ok(output) => println!("{} {}", style("->").green(), output),
                    Err(err) => println!("{} {}: {}", style("!!").red(), call.id, err),
                }
            }
            Ok(())
        }
    }
}
