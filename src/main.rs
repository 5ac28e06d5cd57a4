use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::Parser;
use tokio::net::UdpSocket;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sensor_ingest::config::{Args, Config};
use sensor_ingest::error::Result;
use sensor_ingest::ingest::{self, IngestContext};
use sensor_ingest::store::{InfluxStore, SensorStore};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::resolve(args)?;

    info!(
        "starting test run {} with {} registered sensors",
        config.run.test_id,
        config.registry.len()
    );

    let store = Arc::new(InfluxStore::new(&config.influx_url));
    store.ensure_database(&config.database).await?;

    let socket = UdpSocket::bind(("0.0.0.0", config.listen_port)).await?;

    let ctx = IngestContext::new(store, config.run, config.registry, config.database);
    ingest::listen(Arc::clone(&ctx), socket).await?;

    let stats = &ctx.stats;
    info!(
        "run {} complete - received: {}, accepted: {}, filtered: {}, written: {}, failed: {}",
        ctx.run.test_id,
        stats.received.load(Ordering::Relaxed),
        stats.accepted.load(Ordering::Relaxed),
        stats.filtered.load(Ordering::Relaxed),
        stats.written.load(Ordering::Relaxed),
        stats.write_failures.load(Ordering::Relaxed),
    );

    Ok(())
}
