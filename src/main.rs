//! Heat pump communication service (heatsrv)
//!
//! Polls a Luxtronik-style heat pump controller over its binary TCP socket
//! protocol and emits field updates as JSON lines on stdout.

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use heatsrv::{FieldUpdate, HeatSrvConfig, PollService};

#[derive(Debug, Parser)]
#[command(name = "heatsrv", about = "Heat pump controller poller", version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config/heatsrv.toml")]
    config: String,

    /// Validate the configuration and exit
    #[arg(long)]
    validate: bool,

    /// Log filter override (e.g. "debug", "heatsrv=trace")
    #[arg(short, long)]
    log_level: Option<String>,
}

fn init_logging(args: &Args, config: &HeatSrvConfig) {
    let directive = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.log.level.clone());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = HeatSrvConfig::load(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config))?;

    init_logging(&args, &config);

    if args.validate {
        info!("configuration valid: {}", args.config);
        return Ok(());
    }

    info!(
        host = %config.controller.host,
        port = config.controller.port,
        "starting heatsrv"
    );

    let (tx, mut rx) = mpsc::channel::<FieldUpdate>(256);
    let service = PollService::new(config, tx);
    let shutdown = CancellationToken::new();

    // Output boundary: one JSON line per forwarded update.
    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            match serde_json::to_string(&update) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "failed to serialize update"),
            }
        }
    });

    let service_task = tokio::spawn(service.run(shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    shutdown.cancel();

    match service_task.await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => error!(error = %e, "poll service terminated with error"),
        Err(e) => error!(error = %e, "poll service task panicked"),
    }
    printer.abort();

    info!("heatsrv stopped");
    Ok(())
}
