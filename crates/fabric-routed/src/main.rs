//! fabric-routed - fat-tree fabric routing controller
//!
//! Reads switch events as JSON lines on stdin and writes flow commands as
//! JSON lines on stdout. Logs go to stderr.

use anyhow::{anyhow, Context};
use clap::Parser;
use fabric_routed::config::DEFAULT_CONFIG_PATH;
use fabric_routed::{read_events, FabricConfig, FabricDaemon, JsonLinesTransport, RoutingController};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Fat-tree fabric routing controller
#[derive(Parser, Debug)]
#[command(name = "fabric-routed")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Fat-tree fan-out, overrides topology.k
    #[arg(short = 'k', long)]
    fanout: Option<u8>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("fabric-routed: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("--- Starting fabric-routed ---");
    match run(args).await {
        Ok(()) => {
            info!("fabric-routed: exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("fabric-routed: exiting with error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("bad log level {:?}", level))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .try_init()
        .map_err(|e| anyhow!("failed to set logger: {}", e))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = FabricConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(k) = args.fanout {
        config.topology.k = k;
    }
    config.validate().context("invalid configuration")?;

    let params = config.topology_parameters()?;
    info!(
        k = params.k(),
        hosts = params.total_hosts(),
        steering = config.steering.len(),
        pruned = config.pruned_uplinks.len(),
        "fabric-routed: topology loaded"
    );

    let transport = Arc::new(JsonLinesTransport::new(tokio::io::stdout()));
    let controller = Arc::new(RoutingController::new(
        params,
        config.routing_policy(),
        transport,
    ));

    let (tx, rx) = mpsc::channel(config.daemon.event_queue_depth);
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received SIGINT, shutting down gracefully...");
                signal_token.cancel();
            }
            Err(err) => error!(error = %err, "failed to listen for ctrl-c"),
        }
    });

    let reader = tokio::spawn(read_events(BufReader::new(tokio::io::stdin()), tx));

    let stats = FabricDaemon::new(controller)
        .with_worker_queue_depth(config.daemon.event_queue_depth)
        .run(rx, shutdown)
        .await;
    info!(
        events = stats.events,
        switches = stats.switches,
        restarted = stats.restarted_workers,
        "fabric-routed: dispatch finished"
    );

    // Still blocked on stdin after a signal
    reader.abort();
    match reader.await {
        Ok(result) => {
            let forwarded = result.context("reading events")?;
            info!(forwarded, "fabric-routed: input closed");
        }
        Err(e) if e.is_cancelled() => {}
        Err(e) => return Err(e).context("event reader failed"),
    }
    Ok(())
}
