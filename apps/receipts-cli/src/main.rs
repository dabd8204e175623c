mod config;
mod connectivity;
mod http_ack;
mod http_client;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use receipts_core::tasks::TaskSet;
use receipts_core::{config_schema_json, NetworkGate, Pipeline};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::connectivity::ConnectivityProbe;
use crate::http_ack::HttpAcknowledger;

#[derive(Parser)]
#[command(name = "receipts-cli", version, about = "Read-receipt delivery agent")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read message ids from stdin (one per line) and deliver read receipts
    Run {
        /// Agent config (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the acknowledgement endpoint
        #[arg(long)]
        endpoint: Option<String>,
        /// How long to wait for in-flight batches after stdin closes
        #[arg(long, default_value_t = 30_000)]
        linger_ms: u64,
    },
    /// Print the JSON schema of the agent config
    Schema,
    /// Print the effective config (file + env overrides) as JSON
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    receipts_otel::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            endpoint,
            linger_ms,
        } => {
            let mut cfg = AgentConfig::load(config.as_deref())?;
            if endpoint.is_some() {
                cfg.endpoint = endpoint;
            }
            cmd_run(cfg, Duration::from_millis(linger_ms)).await
        }
        Commands::Schema => {
            let schema = config_schema_json::<AgentConfig>();
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
        Commands::Config { config } => {
            let cfg = AgentConfig::load(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&cfg)?);
            Ok(())
        }
    }
}

async fn cmd_run(cfg: AgentConfig, linger: Duration) -> Result<()> {
    let Some(endpoint) = cfg.endpoint.clone() else {
        bail!("no endpoint configured; pass --endpoint or set RECEIPTS_ENDPOINT");
    };
    let timeout = Duration::from_millis(cfg.request_timeout_ms);
    let ack = HttpAcknowledger::new(endpoint, timeout)?;
    info!(endpoint = ack.endpoint(), "acknowledging batches over http");

    let mut tasks = TaskSet::default();
    let gate = match cfg.probe_url.as_deref() {
        Some(url) => {
            let probe =
                ConnectivityProbe::new(url, Duration::from_millis(cfg.probe_interval_ms), timeout)?;
            let initial = probe.check().await;
            let gate = NetworkGate::new(initial);
            let follower = gate.clone();
            tasks.spawn("receipts.probe", async move {
                follower.follow(probe.transitions(initial)).await;
            });
            gate
        }
        None => NetworkGate::new(cfg.pipeline.start_online),
    };

    let pipeline = Pipeline::builder(cfg.pipeline.clone())
        .acknowledger(Arc::new(ack))
        .gate(gate)
        .start()
        .context("starting pipeline")?;
    info!("reading message ids from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut interrupted = false;
    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("reading stdin")? {
                Some(line) => {
                    let id = line.trim();
                    if !id.is_empty() {
                        pipeline.admit(id);
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted; pending window is dropped");
                interrupted = true;
                break;
            }
        }
    }

    if !interrupted {
        let settled = tokio::time::timeout(linger, async {
            while !pipeline.stats().is_settled() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        if settled.is_err() {
            warn!(linger_ms = linger.as_millis() as u64, "stopping with batches still in flight");
        }
    }

    let stats = pipeline.stats();
    pipeline.shutdown().await;
    tasks.shutdown().await;
    println!("{}", serde_json::to_string(&stats)?);
    Ok(())
}
