//! WeatherLink Live daemon
//!
//! This binary coordinates:
//! - The acquisition engine (HTTP poll + UDP broadcast)
//! - Archive-period signalling for the gust maximum
//! - Handing every record to a sink
//!
//! A failed session is torn down and rebuilt after a pause; a failed start
//! ends the process.

mod config;

use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use tracing::{error, info, warn};
use wll_archive::ArchivePeriod;
use wll_config::AppConfig;
use wll_core::{Record, RecordSink};
use wll_ingest::{Driver, DriverError};
use wll_sinks::{FsSink, LogSink};

const RESTART_DELAY: Duration = Duration::from_secs(30);
const LOG_JSON_ENV: &str = "WLL_LOG_JSON";

#[tokio::main]
async fn main() -> Result<()> {
    wll_obs::init("wlld", std::env::var_os(LOG_JSON_ENV).is_some());
    info!("Starting WeatherLink Live daemon");

    let cfg = AppConfig::load().context("Failed to load configuration")?;
    info!("Loaded configuration for {}", cfg.driver.host);

    let chain = config::mapper_chain(&cfg)?;
    chain.log_summary();
    let settings = config::driver_settings(&cfg)?;
    let period = ArchivePeriod::new(cfg.archive.interval)?;

    let mut sink: Box<dyn RecordSink> = match &cfg.sink.dir {
        Some(dir) => {
            info!("Writing records to {}", dir.display());
            Box::new(FsSink::new(dir).context("Failed to open record sink")?)
        }
        None => Box::new(LogSink),
    };

    let mut driver = Driver::new(settings, chain).with_archive_period(period);
    info!("Daemon running - press Ctrl+C to stop");

    let result = run(&mut driver, sink.as_mut()).await;
    driver.close().await;

    if let Err(e) = &result {
        error!("Daemon failed: {:#}", e);
    }
    info!("WeatherLink Live daemon stopped");
    result
}

async fn run(driver: &mut Driver, sink: &mut dyn RecordSink) -> Result<()> {
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let outcome = tokio::select! {
            _ = &mut shutdown => None,
            result = driver.next_records() => Some(result),
        };
        let Some(result) = outcome else {
            info!("Shutdown signal received");
            return Ok(());
        };

        match result {
            Ok(records) => emit_all(sink, &records).await?,
            Err(DriverError::Initialization(e)) => {
                return Err(anyhow!("Driver failed to start: {e}"));
            }
            Err(DriverError::Io(e)) => {
                warn!("Acquisition failed: {}. Restarting in {:?}", e, RESTART_DELAY);
                driver.close().await;
                tokio::select! {
                    _ = &mut shutdown => {
                        info!("Shutdown signal received");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(RESTART_DELAY) => {}
                }
            }
        }
    }
}

async fn emit_all(sink: &mut dyn RecordSink, records: &[Record]) -> Result<()> {
    for record in records {
        sink.emit(record)
            .await
            .with_context(|| format!("Failed to emit record {}", record.date_time))?;
    }
    Ok(())
}
