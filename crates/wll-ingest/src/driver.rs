//! Consumer side of the engine
//!
//! [`Driver::next_records`] waits on the shared data event, drains the poll
//! queue and then the broadcast queue, and fails the session when any feed
//! or the scheduler has failed or when no data arrived for too long.

use crate::{
    BroadcastHost, DataHost, DecodeFailurePolicy, DeviceClient, DriverError, ErrorSlot,
    IngestError, IngestResult, PollHost, PollTarget, ReceiverOptions, RetryPolicy, Scheduler,
    SharedChain, WAIT_TIMEOUT,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use wll_archive::{ArchivePeriod, WindGustAggregator};
use wll_core::{format_timestamp, Record, Timestamp};
use wll_mapping::MapperChain;

/// Bounded wait for new data per cycle; three HTTP retry delays
pub const DATA_WAIT_TIMEOUT: Duration = Duration::from_millis(7500);

#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Hostname or IP of the WLL, optionally with `:port`
    pub host: String,
    pub polling_interval: Duration,
    /// Without polling only the broadcast feed runs
    pub polling_enabled: bool,
    /// HTTP request timeout
    pub socket_timeout: Duration,
    /// Consecutive empty cycles tolerated before the session fails
    pub max_no_data_iterations: u32,
    pub data_wait_timeout: Duration,
    pub retry: RetryPolicy,
    pub receiver: ReceiverOptions,
    /// Address the broadcast socket binds to
    pub bind_ip: IpAddr,
    pub log_success: bool,
    pub log_failure: bool,
}

impl DriverSettings {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            polling_interval: Duration::from_secs(10),
            polling_enabled: true,
            socket_timeout: Duration::from_secs(20),
            max_no_data_iterations: 5,
            data_wait_timeout: DATA_WAIT_TIMEOUT,
            retry: RetryPolicy::default(),
            receiver: ReceiverOptions {
                wait_timeout: WAIT_TIMEOUT,
                decode_failure: DecodeFailurePolicy::Terminate,
            },
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            log_success: false,
            log_failure: true,
        }
    }
}

struct Session {
    data_event: Arc<Notify>,
    poll: Arc<PollHost>,
    broadcast: Arc<BroadcastHost>,
    scheduler: Scheduler,
}

pub struct Driver {
    settings: DriverSettings,
    chain: SharedChain,
    gust: WindGustAggregator,
    archive: Option<ArchivePeriod>,
    session: Option<Session>,
    no_data_count: u32,
}

impl Driver {
    pub fn new(settings: DriverSettings, chain: MapperChain) -> Self {
        let gust = WindGustAggregator::new(
            chain.wind_targets(),
            settings.log_success,
            settings.log_failure,
        );
        Self {
            settings,
            chain: Arc::new(Mutex::new(chain)),
            gust,
            archive: None,
            session: None,
            no_data_count: 0,
        }
    }

    /// Reset the gust maximum by itself whenever record timestamps cross
    /// into the next archive period
    pub fn with_archive_period(mut self, period: ArchivePeriod) -> Self {
        self.archive = Some(period);
        self
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Start both feeds and the scheduler
    ///
    /// The first scheduler tick polls and requests the broadcast lease
    /// right away.
    pub async fn start(&mut self) -> Result<(), DriverError> {
        if self.session.is_some() {
            return Ok(());
        }
        let session = self
            .open_session()
            .map_err(|e| DriverError::Initialization(e.to_string()))?;
        self.session = Some(session);
        info!(
            "Started WeatherLink Live driver for {} (polling {})",
            self.settings.host,
            if self.settings.polling_enabled {
                "enabled"
            } else {
                "disabled"
            }
        );
        Ok(())
    }

    fn open_session(&self) -> IngestResult<Session> {
        if self.settings.max_no_data_iterations < 1 {
            return Err(IngestError::ConfigurationError(
                "max_no_data_iterations must be at least 1".into(),
            ));
        }

        let data_event = Arc::new(Notify::new());
        let client = DeviceClient::new(&self.settings.host, self.settings.socket_timeout)?
            .with_retry(self.settings.retry);

        let poll = Arc::new(PollHost::new(
            DataHost::new("poll", self.chain.clone(), data_event.clone()),
            client.clone(),
        ));
        let broadcast = Arc::new(BroadcastHost::new(
            Arc::new(DataHost::new(
                "broadcast",
                self.chain.clone(),
                data_event.clone(),
            )),
            client,
            self.settings.bind_ip,
            self.settings.receiver,
        ));

        let poll_target: Option<Arc<dyn PollTarget>> = if self.settings.polling_enabled {
            Some(poll.clone() as Arc<dyn PollTarget>)
        } else {
            None
        };
        let scheduler = Scheduler::start(
            self.settings.polling_interval,
            poll_target,
            broadcast.clone(),
            data_event.clone(),
        )?;

        Ok(Session {
            data_event,
            poll,
            broadcast,
            scheduler,
        })
    }

    /// Wait for the next batch of records, starting the engine if needed
    ///
    /// Every returned record already carries the running gust maximum.
    pub async fn next_records(&mut self) -> Result<Vec<Record>, DriverError> {
        self.start().await?;
        let Some(handles) = self.handles() else {
            return Err(DriverError::Initialization("driver session missing".into()));
        };
        self.no_data_count = 0;

        loop {
            self.check_no_data_count()?;
            handles.raise_errors().map_err(|e| {
                DriverError::Io(format!("Error while receiving or processing packets: {e}"))
            })?;

            // Timing out just means another watchdog cycle
            let _ = timeout(self.settings.data_wait_timeout, handles.data_event.notified()).await;

            let mut records = handles.poll.data().drain();
            records.extend(handles.broadcast.data().drain());

            if records.is_empty() {
                self.no_data_count += 1;
                warn!("No data since {} iterations", self.no_data_count);
                continue;
            }

            self.no_data_count = 0;
            for record in &mut records {
                self.observe_archive_period(record.date_time);
                self.gust.new_loop_record(record);
            }
            debug!("Emitting {} records", records.len());
            return Ok(records);
        }
    }

    /// Reset running archive-period statistics
    pub fn end_archive_period(&mut self) {
        self.gust.end_archive_period();
    }

    /// Stop the scheduler and both feeds; safe to call more than once
    pub async fn close(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.scheduler.cancel().await;
        session.broadcast.close().await;
        info!("Closed WeatherLink Live driver");
    }

    fn observe_archive_period(&mut self, timestamp: Timestamp) {
        let Some(period) = self.archive.as_mut() else {
            return;
        };
        if let Some(end) = period.observe(timestamp) {
            debug!("Archive period ending {} complete", format_timestamp(end));
            self.gust.end_archive_period();
        }
    }

    fn check_no_data_count(&self) -> Result<(), DriverError> {
        if self.no_data_count >= self.settings.max_no_data_iterations {
            return Err(DriverError::Io(format!(
                "Received no data for {} iterations",
                self.no_data_count
            )));
        }
        Ok(())
    }

    fn handles(&self) -> Option<Handles> {
        self.session.as_ref().map(|s| Handles {
            data_event: s.data_event.clone(),
            poll: s.poll.clone(),
            broadcast: s.broadcast.clone(),
            scheduler_error: s.scheduler.error_slot(),
        })
    }
}

struct Handles {
    data_event: Arc<Notify>,
    poll: Arc<PollHost>,
    broadcast: Arc<BroadcastHost>,
    scheduler_error: ErrorSlot,
}

impl Handles {
    fn raise_errors(&self) -> IngestResult<()> {
        self.scheduler_error.raise()?;
        self.poll.data().raise_error()?;
        self.broadcast.data().raise_error()
    }
}
