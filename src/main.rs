mod accumulator;
mod config;
mod metric;
mod pf;
#[cfg(feature = "serve")]
mod serve;
#[cfg(feature = "serve")]
mod webhooks;

use accumulator::{Accumulator, LineProtocolWriter};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Collects pf state-table counters and Kong webhook events as metrics,
/// printed to stdout in InfluxDB line protocol.
#[derive(Parser, Debug)]
#[command(name = "gatherd", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "gatherd.toml")]
    config: PathBuf,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect pf counters once, or repeatedly with --interval
    Gather {
        /// Repeat every `pf.interval_secs` until interrupted
        #[arg(long)]
        interval: bool,
    },
    /// Receive webhook events over HTTP
    #[cfg(feature = "serve")]
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "gatherd=debug,tower_http=debug"
    } else {
        "gatherd=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    let config = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let acc: Arc<dyn Accumulator> = Arc::new(LineProtocolWriter::new(std::io::stdout()));

    match cli.command {
        Command::Gather { interval: false } => gather_once(&config.pf, acc.as_ref()),
        Command::Gather { interval: true } => gather_loop(&config.pf, acc).await,
        #[cfg(feature = "serve")]
        Command::Serve => match serve::run(&config.webhooks, acc, shutdown_signal()).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!("webhook server failed: {e}");
                ExitCode::FAILURE
            }
        },
    }
}

fn gather_once(config: &config::PfConfig, acc: &dyn Accumulator) -> ExitCode {
    let mut collector = pf::PfCollector::new(config);
    if collector.gather(acc) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// One cycle per tick. Cycles run on this task one after another, so a
/// collector never sees two concurrent cycles.
async fn gather_loop(config: &config::PfConfig, acc: Arc<dyn Accumulator>) -> ExitCode {
    let mut collector = pf::PfCollector::new(config);
    let period = Duration::from_secs(config.interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::info!(interval_secs = period.as_secs(), "gathering pf counters");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => return ExitCode::SUCCESS,
            _ = ticker.tick() => {
                tokio::task::block_in_place(|| collector.gather(acc.as_ref()));
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
