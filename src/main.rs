use clap::Parser;
use conductor::logging::{self, LogLevel};
use conductor::{BoxError, Coordinator, Releasable, TokioSignals, config};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// `conductor` — runs a few tracked workers and shuts down cleanly on a signal
#[derive(Parser, Debug)]
#[command(name = "conductor", version, about = "Graceful shutdown demo host")]
pub struct Cli {
    /// Path to a TOML file listing the shutdown signals
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(long, default_value = "info")]
    pub log_level: LogLevel,

    /// Number of background workers to spawn
    #[arg(long, default_value_t = 3)]
    pub workers: usize,

    /// How many one-second ticks each worker runs before exiting
    #[arg(long, default_value_t = 5)]
    pub ticks: u64,
}

/// Resource that reports how long the process was up when released.
struct Uptime {
    started: std::time::Instant,
}

#[async_trait::async_trait]
impl Releasable for Uptime {
    fn name(&self) -> &str {
        "uptime"
    }

    async fn release(&mut self) -> Result<(), BoxError> {
        info!(elapsed = ?self.started.elapsed(), "uptime");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level);

    let cfg = match &cli.config {
        Some(path) => config::load(path).await?,
        None => config::ShutdownConfig::default(),
    };

    let coordinator = Coordinator::logging();
    coordinator.register(Uptime {
        started: std::time::Instant::now(),
    })?;

    for id in 0..cli.workers {
        let ticks = cli.ticks;
        coordinator.spawn(async move {
            for tick in 1..=ticks {
                tokio::time::sleep(Duration::from_secs(1)).await;
                info!(worker = id, tick, "working");
            }
            info!(worker = id, "worker done");
        })?;
    }

    let mut signals = TokioSignals::new();
    coordinator
        .shutdown_on_signals(&mut signals, &cfg.signals)
        .await?;
    info!("\u{1F44B}  shutdown complete");
    Ok(())
}
