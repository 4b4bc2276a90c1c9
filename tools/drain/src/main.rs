//! Drain - run sample subsystems under the shutdown coordinator
//!
//! Starts a few tick workers and a simulated server, registers them with the
//! process-wide coordinator, and exits only after SIGINT/SIGTERM (or
//! `--close-after-ms`) has driven every one of them through its cleanup.

mod participants;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use common::LogConfig;
use lifecycle::{global, LifecycleConfig, ShutdownParticipant};
use tracing::{info, Level};

use participants::{SimulatedServer, TickWorker};

#[derive(Parser, Debug)]
#[command(
    name = "drain",
    version,
    about = "Run sample subsystems until SIGINT/SIGTERM, then drain them"
)]
struct Args {
    /// Lifecycle YAML config file
    #[arg(short, long, env = "DRAIN_CONFIG")]
    config: Option<PathBuf>,

    /// Console log level (RUST_LOG overrides)
    #[arg(long, env = "DRAIN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write a daily rolling log file here
    #[arg(long, env = "DRAIN_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Number of tick workers
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Tick interval in milliseconds
    #[arg(long, default_value_t = 500, value_parser = clap::value_parser!(u64).range(1..))]
    tick_ms: u64,

    /// Time each simulated request takes, in milliseconds
    #[arg(long, default_value_t = 250)]
    request_ms: u64,

    /// Trigger shutdown by itself after this many milliseconds
    #[arg(long)]
    close_after_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    common::logging::init_with_config(LogConfig {
        service_name: "drain".to_string(),
        log_dir: args.log_dir.clone(),
        console_level: args.log_level.parse().unwrap_or(Level::INFO),
        enable_json: false,
    })
    .context("Failed to initialize logging")?;

    let config = LifecycleConfig::load(args.config.as_deref())
        .context("Failed to load lifecycle configuration")?;
    if let Some(timeout) = config.participant_timeout() {
        info!("Participant timeout: {:?}", timeout);
    }
    let coordinator = global::init(config).context("Failed to start shutdown listener")?;

    for i in 0..args.workers {
        let worker = TickWorker::new(format!("worker-{}", i), Duration::from_millis(args.tick_ms));
        let token = global::register_close(Arc::clone(&worker) as Arc<dyn ShutdownParticipant>)?;
        worker.start(token);
    }

    let server = SimulatedServer::new("server", Duration::from_millis(args.request_ms));
    let early = global::register_close(Arc::clone(&server) as Arc<dyn ShutdownParticipant>)?;
    let accept = server.serve(early, Duration::from_millis(args.request_ms / 2 + 1));

    if let Some(ms) = args.close_after_ms {
        info!("Self-trigger in {}ms", ms);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            coordinator.close();
        });
    }

    info!(
        "Running {} worker(s) and 1 server, waiting for SIGINT/SIGTERM",
        args.workers
    );
    global::wait_close_pending().await?;
    accept.await.context("Accept loop failed")?;

    if let Some(report) = coordinator.report() {
        info!(
            "Exit after {}: {}/{} closed, {} recovered",
            report.termination,
            report.closed,
            report.launched,
            report.failures.len()
        );
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["drain"]).unwrap();
        assert_eq!(args.workers, 2);
        assert_eq!(args.tick_ms, 500);
        assert!(args.close_after_ms.is_none());
    }

    #[test]
    fn test_close_after_flag() {
        let args =
            Args::try_parse_from(["drain", "--workers", "4", "--close-after-ms", "1000"]).unwrap();
        assert_eq!(args.workers, 4);
        assert_eq!(args.close_after_ms, Some(1000));
    }

    #[test]
    fn test_zero_tick_interval_rejected() {
        let err = Args::try_parse_from(["drain", "--tick-ms", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);

        let args = Args::try_parse_from(["drain", "--tick-ms", "1"]).unwrap();
        assert_eq!(args.tick_ms, 1);
    }
}
