//! Turns the validated configuration file into engine settings

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;
use wll_config::AppConfig;
use wll_ingest::{DecodeFailurePolicy, DriverSettings};
use wll_mapping::{LogFlags, MapperChain, MappingDefinition, SensorSet};

pub fn log_flags(cfg: &AppConfig) -> LogFlags {
    LogFlags {
        success: cfg.driver.log_success,
        failure: cfg.driver.log_failure,
    }
}

pub fn driver_settings(cfg: &AppConfig) -> Result<DriverSettings> {
    let driver = &cfg.driver;
    let mut settings = DriverSettings::new(driver.host.clone());
    settings.polling_interval = Duration::from_secs(driver.polling_interval);
    settings.polling_enabled = driver.polling_enabled;
    settings.socket_timeout = Duration::from_secs(driver.socket_timeout);
    settings.max_no_data_iterations = driver.max_no_data_iterations;
    settings.receiver.decode_failure = driver
        .decode_failure
        .parse::<DecodeFailurePolicy>()
        .context("Invalid driver.decode_failure")?;
    settings.log_success = driver.log_success;
    settings.log_failure = driver.log_failure;
    Ok(settings)
}

/// Explicit mapping definitions win over the declarative sensor set
pub fn mapper_chain(cfg: &AppConfig) -> Result<MapperChain> {
    let log = log_flags(cfg);

    if let Some(mapping) = &cfg.driver.mapping {
        if !cfg.sensors.is_empty() {
            info!("Both driver.mapping and [sensors] configured, using driver.mapping");
        }
        let definitions = mapping
            .iter()
            .map(|raw| raw.parse::<MappingDefinition>())
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid mapping definition")?;
        return MapperChain::from_definitions(&definitions, log)
            .context("Could not build mappers from driver.mapping");
    }

    let sensors = SensorSet::from_keys(cfg.sensor_keys()?).context("Invalid [sensors] table")?;
    MapperChain::from_sensors(&sensors, log).context("Could not build mappers from [sensors]")
}
